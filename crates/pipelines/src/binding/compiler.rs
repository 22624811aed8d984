// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The device binding compiler.
//!
//! # Binding Steps
//!
//! 1. Force inference-safe config values.
//! 2. Validate the layer layout and shard it across the replica's devices.
//! 3. Wrap any failure of step 2 in `IncompatibleConfig`, naming the config.
//! 4. Cast weights to half precision when requested.
//! 5. Lower the model to program specs and wrap it: an
//!    [`InferenceExecutor`] for ordinary tasks, a [`GenerativeModel`] for
//!    generation tasks.
//!
//! Nothing is compiled here; executables are built lazily on first call.

use std::error::Error;
use std::sync::Arc;

use device_runtime::{DeviceError, DeviceRuntime, OutputSpec, Precision, ProgramSpec};
use model_hub::{Component, PretrainedModel};
use shard_planner::ShardPlan;
use tracing::info;

use super::{GenerativeModel, InferenceExecutor, ModelBinding};
use crate::{DeviceConfig, PipelineError, TaskDescriptor};

/// Binds models to one accelerator runtime.
#[derive(Debug, Clone)]
pub struct DeviceBinder {
    runtime: Arc<dyn DeviceRuntime>,
}

impl DeviceBinder {
    pub fn new(runtime: Arc<dyn DeviceRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<dyn DeviceRuntime> {
        &self.runtime
    }

    /// Binds `model` for `task`.
    ///
    /// `config_label` names the configuration in errors.
    pub fn bind(
        &self,
        mut model: PretrainedModel,
        config: &DeviceConfig,
        config_label: &str,
        task: &TaskDescriptor,
        precision: Precision,
    ) -> Result<ModelBinding, PipelineError> {
        let mut config = config.clone();
        config.prepare_for_inference(precision);

        let plan = self
            .shard(&model, &config, task.is_generation())
            .map_err(|source| PipelineError::IncompatibleConfig {
                config: config_label.to_string(),
                source,
            })?;
        let activation_bytes = model.activation_bytes_per_sample();

        if precision.is_half() {
            model.half();
        }
        info!(
            model = model.id(),
            task = %task.name,
            config = config_label,
            %precision,
            plan = %plan.summary(),
            "bound model"
        );

        let options = config.execution_options();
        let runtime = Arc::clone(&self.runtime);
        if !task.is_generation() {
            let program = ProgramSpec {
                name: model.id().to_string(),
                stage_weight_bytes: plan.device_weight_bytes(None),
                activation_bytes_per_sample: activation_bytes,
                outputs: vec![OutputSpec {
                    name: "logits".into(),
                    width: model.output_width(),
                    per_token: model.per_token_output(),
                }],
            };
            return Ok(ModelBinding::Bound(InferenceExecutor::new(
                runtime, model, program, precision, options,
            )));
        }

        let vocab = model.config().vocab_size;
        let (encoder, decoder) = if model.is_encoder_decoder() {
            let encoder = ProgramSpec {
                name: format!("{}/encoder", model.id()),
                stage_weight_bytes: plan.device_weight_bytes(Some(Component::Encoder)),
                activation_bytes_per_sample: activation_bytes,
                outputs: vec![OutputSpec {
                    name: "last_hidden_state".into(),
                    width: model.config().hidden_size,
                    per_token: true,
                }],
            };
            let decoder = ProgramSpec {
                name: format!("{}/decoder", model.id()),
                stage_weight_bytes: plan.device_weight_bytes(Some(Component::Decoder)),
                activation_bytes_per_sample: activation_bytes,
                outputs: vec![logits(vocab)],
            };
            (Some(encoder), decoder)
        } else {
            let decoder = ProgramSpec {
                name: format!("{}/decoder", model.id()),
                stage_weight_bytes: plan.device_weight_bytes(None),
                activation_bytes_per_sample: activation_bytes,
                outputs: vec![logits(vocab)],
            };
            (None, decoder)
        };
        Ok(ModelBinding::Generative(GenerativeModel::new(
            runtime, model, encoder, decoder, precision, options,
        )))
    }

    /// Validates the layout and shards it; every failure is reported as is.
    fn shard(
        &self,
        model: &PretrainedModel,
        config: &DeviceConfig,
        for_generation: bool,
    ) -> Result<ShardPlan, Box<dyn Error + Send + Sync>> {
        model.validate()?;
        let available = self.runtime.num_devices();
        if config.devices_per_replica > available {
            return Err(Box::new(DeviceError::TooFewDevices {
                requested: config.devices_per_replica,
                available,
            }));
        }
        let plan = shard_planner::plan_for(
            model,
            config.devices_per_replica,
            &config.layers_per_device,
            for_generation,
            self.runtime.memory_per_device(),
        )?;
        Ok(plan)
    }
}

fn logits(width: usize) -> OutputSpec {
    OutputSpec {
        name: "logits".into(),
        width,
        per_token: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::SubExecutable;
    use crate::{DeviceConfigArg, TaskRegistry};
    use device_runtime::{MemoryBudget, SimulatedDevice};
    use model_hub::ModelConfig;

    fn model(json: &str) -> PretrainedModel {
        PretrainedModel::from_config("m", None, ModelConfig::from_json(json).unwrap()).unwrap()
    }

    fn classifier() -> PretrainedModel {
        model(
            r#"{"model_type": "bert", "architectures": ["BertForSequenceClassification"],
                "num_hidden_layers": 4, "hidden_size": 8, "vocab_size": 64,
                "max_position_embeddings": 16}"#,
        )
    }

    fn t5() -> PretrainedModel {
        model(
            r#"{"model_type": "t5", "architectures": ["T5ForConditionalGeneration"],
                "is_encoder_decoder": true, "num_hidden_layers": 2, "hidden_size": 8,
                "vocab_size": 64, "max_position_embeddings": 16, "eos_token_id": 1}"#,
        )
    }

    fn binder(devices: usize) -> DeviceBinder {
        DeviceBinder::new(Arc::new(SimulatedDevice::new(devices, MemoryBudget::from_mb(64))))
    }

    #[test]
    fn test_bind_classifier() {
        let reg = TaskRegistry::builtin();
        let task = reg.descriptor_for("text-classification").unwrap();
        let binding = binder(2)
            .bind(classifier(), &DeviceConfig::with_devices(2), "two", task, Precision::Half)
            .unwrap();
        match binding {
            ModelBinding::Bound(exe) => {
                assert!(!exe.is_compiled());
                assert!(exe.model().is_half());
                assert_eq!(exe.program().num_devices(), 2);
                assert!(exe.options().enable_half_partials);
                assert_eq!(exe.options().device_iterations, 1);
            }
            other => panic!("expected a bound executor, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_full_precision_keeps_f32_and_disables_half_partials() {
        let reg = TaskRegistry::builtin();
        let task = reg.descriptor_for("text-classification").unwrap();
        let binding = binder(1)
            .bind(classifier(), &DeviceConfig::default(), "default", task, Precision::Full)
            .unwrap();
        let ModelBinding::Bound(exe) = binding else {
            panic!("expected a bound executor");
        };
        assert!(!exe.model().is_half());
        assert!(!exe.options().enable_half_partials);
    }

    #[test]
    fn test_bind_seq2seq_generation() {
        let reg = TaskRegistry::builtin();
        let task = reg.descriptor_for("summarization").unwrap();
        let binding = binder(2)
            .bind(t5(), &DeviceConfig::with_devices(2), "two", task, Precision::Half)
            .unwrap();
        let ModelBinding::Generative(gen) = binding else {
            panic!("expected a generative model");
        };
        assert!(gen.is_seq2seq());
        let enc = gen.program(SubExecutable::Encoder).unwrap();
        let dec = gen.program(SubExecutable::Decoder).unwrap();
        assert!(enc.stage_weight_bytes[0] > 0);
        assert_eq!(enc.stage_weight_bytes[1], 0);
        assert_eq!(dec.stage_weight_bytes[0], 0);
        assert!(dec.stage_weight_bytes[1] > 0);
        assert!(gen.slot(SubExecutable::Encoder).is_some_and(|s| !s.is_compiled()));
    }

    #[test]
    fn test_too_few_devices_is_incompatible() {
        let reg = TaskRegistry::builtin();
        let task = reg.descriptor_for("text-classification").unwrap();
        let arg = DeviceConfigArg::Config(DeviceConfig::with_devices(4));
        let err = binder(2)
            .bind(classifier(), &DeviceConfig::with_devices(4), &arg.label(), task, Precision::Half)
            .unwrap_err();
        match err {
            PipelineError::IncompatibleConfig { config, source } => {
                assert!(config.starts_with("explicit"));
                assert!(source.to_string().contains("4 devices"));
            }
            other => panic!("expected IncompatibleConfig, got {other}"),
        }
    }

    #[test]
    fn test_bad_layer_counts_are_incompatible() {
        let reg = TaskRegistry::builtin();
        let task = reg.descriptor_for("text-classification").unwrap();
        let config = DeviceConfig {
            layers_per_device: vec![3, 3],
            ..DeviceConfig::with_devices(2)
        };
        let err = binder(2)
            .bind(classifier(), &config, "custom", task, Precision::Half)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IncompatibleConfig { ref config, .. } if config == "custom"
        ));
    }

    #[test]
    fn test_budget_too_small_is_incompatible() {
        let reg = TaskRegistry::builtin();
        let task = reg.descriptor_for("text-classification").unwrap();
        let binder = DeviceBinder::new(Arc::new(SimulatedDevice::new(
            1,
            MemoryBudget::from_bytes(64),
        )));
        let err = binder
            .bind(classifier(), &DeviceConfig::default(), "tiny", task, Precision::Full)
            .unwrap_err();
        assert!(matches!(err, PipelineError::IncompatibleConfig { .. }));
    }
}
