// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Releasing device executables.
//!
//! # Release Order
//!
//! ```text
//! Raw         nothing to release
//! Bound       executable
//! Generative  decoder, then encoder (absent ones are skipped)
//! ```
//!
//! Release continues past a failing destroy; the first error is returned
//! once every slot has been visited. Released slots return to
//! `Uncompiled`, so disposing twice destroys nothing the second time.

use tracing::{info, warn};

use crate::binding::{ModelBinding, SubExecutable};
use crate::PipelineError;

/// What one disposal released.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DisposalReport {
    /// Slots whose live executable was destroyed.
    pub destroyed: Vec<String>,
    /// Sub-executables the model does not have.
    pub absent: Vec<String>,
}

impl DisposalReport {
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.len()
    }
}

/// Releases every executable a binding owns.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleManager;

impl LifecycleManager {
    pub fn new() -> Self {
        Self
    }

    pub fn dispose(&self, binding: &mut ModelBinding) -> Result<DisposalReport, PipelineError> {
        let mut report = DisposalReport::default();
        let mut first_error: Option<PipelineError> = None;

        match binding {
            ModelBinding::Raw(_) => {}
            ModelBinding::Bound(executor) => {
                let name = executor.slot().name();
                match executor.destroy() {
                    Ok(true) => report.destroyed.push(name.to_string()),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(slot = name, error = %e, "failed to release executable");
                        first_error = Some(e.into());
                    }
                }
            }
            ModelBinding::Generative(model) => {
                for which in SubExecutable::ALL {
                    let Some(slot) = model.slot_mut(which) else {
                        report.absent.push(which.to_string());
                        continue;
                    };
                    match slot.release() {
                        Ok(true) => report.destroyed.push(which.to_string()),
                        Ok(false) => {}
                        Err(e) => {
                            warn!(sub = %which, error = %e, "failed to release sub-executable");
                            first_error.get_or_insert(e.into());
                        }
                    }
                }
            }
        }

        if !report.destroyed.is_empty() {
            info!(
                model = binding.model().id(),
                destroyed = ?report.destroyed,
                "released device executables"
            );
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::fixtures::*;
    use crate::binding::GenerationParams;
    use device_runtime::Precision;
    use model_hub::{ModelConfig, PretrainedModel};
    use tensor_core::{ModelInputs, Shape, Tensor};

    #[test]
    fn test_dispose_bound_twice() {
        let device = device();
        let mut binding = bind(&device, classifier(), "text-classification", Precision::Full);
        binding.forward(ids(1, 4)).unwrap();

        let report = LifecycleManager::new().dispose(&mut binding).unwrap();
        assert_eq!(report.destroyed, vec!["executable"]);
        let again = LifecycleManager::new().dispose(&mut binding).unwrap();
        assert_eq!(again.destroyed_count(), 0);
        assert_eq!(device.stats().destroys, 1);
    }

    #[test]
    fn test_dispose_never_called() {
        let device = device();
        let mut binding = bind(&device, classifier(), "text-classification", Precision::Full);
        let report = LifecycleManager::new().dispose(&mut binding).unwrap();
        assert_eq!(report, DisposalReport::default());
        assert_eq!(device.stats().destroys, 0);
    }

    #[test]
    fn test_dispose_seq2seq_releases_both() {
        let device = device();
        let mut binding = bind(&device, t5(), "summarization", Precision::Full);
        binding.forward(ids(2, 5)).unwrap();
        assert_eq!(device.stats().live_executables, 2);

        let report = LifecycleManager::new().dispose(&mut binding).unwrap();
        assert_eq!(report.destroyed, vec!["decoder", "encoder"]);
        assert_eq!(device.stats().live_executables, 0);
        assert_eq!(device.stats().destroys, 2);
    }

    #[test]
    fn test_dispose_decoder_only_model_reports_absent_encoder() {
        let device = device();
        let gpt2 = PretrainedModel::from_config(
            "gpt2",
            None,
            ModelConfig::from_json(
                r#"{"model_type": "gpt2", "architectures": ["GPT2LMHeadModel"],
                    "n_layer": 2, "n_embd": 8, "vocab_size": 300, "n_positions": 16,
                    "eos_token_id": 1}"#,
            )
            .unwrap(),
        )
        .unwrap();
        let mut binding = bind(&device, gpt2, "text-generation", Precision::Full);
        let ModelBinding::Generative(model) = &mut binding else {
            panic!("expected a generative binding");
        };
        let prompt = ModelInputs::new().with(
            "input_ids",
            Tensor::from_i64(Shape::matrix(1, 2), &[10, 11]).unwrap(),
        );
        let params = GenerationParams::from_config(model.model().config()).with_max_length(4);
        model.generate(&prompt, &params).unwrap();

        let report = LifecycleManager::new().dispose(&mut binding).unwrap();
        assert_eq!(report.destroyed, vec!["decoder"]);
        assert_eq!(report.absent, vec!["encoder"]);
        assert_eq!(device.stats().live_executables, 0);
    }

    #[test]
    fn test_dispose_raw_is_noop() {
        let mut binding = ModelBinding::Raw(classifier());
        assert_eq!(
            LifecycleManager::new().dispose(&mut binding).unwrap(),
            DisposalReport::default()
        );
    }
}
