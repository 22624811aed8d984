// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! How a pipeline's model is attached to the device.
//!
//! ```text
//! ModelBinding
//!  ├── Raw(PretrainedModel)          not bound; cannot run
//!  ├── Bound(InferenceExecutor)      one slot: "executable"
//!  └── Generative(GenerativeModel)   slots: "decoder", "encoder" (seq2seq only)
//! ```
//!
//! The recompilation controller, the precision adapter and the lifecycle
//! manager each match exhaustively over this enum.

mod compiler;
mod executor;
mod generative;
mod slot;

use std::sync::Arc;

use device_runtime::{DeviceRuntime, Precision};
use model_hub::PretrainedModel;
use tensor_core::{ModelInputs, ModelOutputs};

pub use compiler::DeviceBinder;
pub use executor::InferenceExecutor;
pub use generative::{GenerationParams, GenerativeModel, SubExecutable};
pub use slot::{ExecutableSlot, SlotState};

use crate::PipelineError;

/// A model in one of its three device states.
#[derive(Debug)]
pub enum ModelBinding {
    Raw(PretrainedModel),
    Bound(InferenceExecutor),
    Generative(GenerativeModel),
}

impl ModelBinding {
    /// `"raw"`, `"bound"` or `"generative"`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ModelBinding::Raw(_) => "raw",
            ModelBinding::Bound(_) => "bound",
            ModelBinding::Generative(_) => "generative",
        }
    }

    pub fn model(&self) -> &PretrainedModel {
        match self {
            ModelBinding::Raw(m) => m,
            ModelBinding::Bound(e) => e.model(),
            ModelBinding::Generative(g) => g.model(),
        }
    }

    pub fn model_mut(&mut self) -> &mut PretrainedModel {
        match self {
            ModelBinding::Raw(m) => m,
            ModelBinding::Bound(e) => e.model_mut(),
            ModelBinding::Generative(g) => g.model_mut(),
        }
    }

    /// `true` for bindings that run on the device.
    pub fn is_device_bound(&self) -> bool {
        match self {
            ModelBinding::Raw(_) => false,
            ModelBinding::Bound(_) | ModelBinding::Generative(_) => true,
        }
    }

    /// The runtime of a device-bound model.
    pub fn runtime(&self) -> Option<&Arc<dyn DeviceRuntime>> {
        match self {
            ModelBinding::Raw(_) => None,
            ModelBinding::Bound(e) => Some(e.runtime()),
            ModelBinding::Generative(g) => Some(g.runtime()),
        }
    }

    /// Precision executables are compiled for.
    pub fn precision(&self) -> Option<Precision> {
        match self {
            ModelBinding::Raw(_) => None,
            ModelBinding::Bound(e) => Some(e.precision()),
            ModelBinding::Generative(g) => Some(g.precision()),
        }
    }

    /// All slots, with their names.
    pub fn slots(&self) -> Vec<&ExecutableSlot> {
        match self {
            ModelBinding::Raw(_) => Vec::new(),
            ModelBinding::Bound(e) => vec![e.slot()],
            ModelBinding::Generative(g) => SubExecutable::ALL
                .iter()
                .filter_map(|&which| g.slot(which))
                .collect(),
        }
    }

    /// Compilations across all slots.
    pub fn compile_count(&self) -> u64 {
        self.slots().iter().map(|s| s.compiles()).sum()
    }

    /// Evictions across all slots.
    pub fn eviction_count(&self) -> u64 {
        self.slots().iter().map(|s| s.evictions()).sum()
    }

    /// Runs the model with default generation parameters.
    pub fn forward(&mut self, inputs: ModelInputs) -> Result<ModelOutputs, PipelineError> {
        match self {
            ModelBinding::Raw(_) => Err(PipelineError::NotBound),
            ModelBinding::Bound(e) => e.call(&inputs),
            ModelBinding::Generative(g) => {
                let params = GenerationParams::from_config(g.model().config());
                g.generate(&inputs, &params)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small models and a bound executor on a simulated device.

    use super::*;
    use device_runtime::{MemoryBudget, SimulatedDevice};
    use model_hub::ModelConfig;
    use tensor_core::{Shape, Tensor};

    use crate::{DeviceConfig, TaskRegistry};

    pub fn classifier() -> PretrainedModel {
        let config = ModelConfig::from_json(
            r#"{"model_type": "distilbert",
                "architectures": ["DistilBertForSequenceClassification"],
                "num_hidden_layers": 2, "hidden_size": 8, "vocab_size": 300,
                "max_position_embeddings": 16,
                "id2label": {"0": "NEGATIVE", "1": "POSITIVE"}}"#,
        )
        .unwrap();
        PretrainedModel::from_config("tiny-classifier", None, config).unwrap()
    }

    pub fn t5() -> PretrainedModel {
        let config = ModelConfig::from_json(
            r#"{"model_type": "t5", "architectures": ["T5ForConditionalGeneration"],
                "is_encoder_decoder": true, "num_hidden_layers": 2, "hidden_size": 8,
                "vocab_size": 300, "max_position_embeddings": 16,
                "pad_token_id": 0, "eos_token_id": 1}"#,
        )
        .unwrap();
        PretrainedModel::from_config("tiny-t5", None, config).unwrap()
    }

    pub fn device() -> Arc<SimulatedDevice> {
        Arc::new(SimulatedDevice::new(2, MemoryBudget::from_mb(64)).with_input_recording())
    }

    pub fn bind(
        device: &Arc<SimulatedDevice>,
        model: PretrainedModel,
        task: &str,
        precision: Precision,
    ) -> ModelBinding {
        let registry = TaskRegistry::builtin();
        let descriptor = registry.descriptor_for(task).unwrap();
        let runtime: Arc<dyn DeviceRuntime> = device.clone();
        DeviceBinder::new(runtime)
            .bind(model, &DeviceConfig::default(), "default", descriptor, precision)
            .unwrap()
    }

    pub fn ids(batch: usize, len: usize) -> ModelInputs {
        let values: Vec<i64> = (0..(batch * len) as i64).map(|i| 4 + i % 50).collect();
        ModelInputs::new().with(
            "input_ids",
            Tensor::from_i64(Shape::matrix(batch, len), &values).unwrap(),
        )
    }
}
