// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for pipeline construction and execution.

use device_runtime::DeviceError;
use model_hub::ModelError;
use tensor_core::TensorError;

/// Errors that can occur while building or calling a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The device configuration argument is not a known preset, a valid
    /// mapping or a readable config file.
    #[error("cannot resolve device config: {0}")]
    ConfigResolution(String),

    /// The model could not be adapted to or sharded for the device config.
    #[error(
        "the model and device config '{config}' seem to be incompatible, \
         try a different device config or customise it for the model: {source}"
    )]
    IncompatibleConfig {
        config: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A tokenizer or feature extractor must accompany a model object.
    #[error("a {collaborator} must be supplied when the model is passed as a {model_kind}")]
    MissingCollaborator {
        collaborator: &'static str,
        model_kind: &'static str,
    },

    /// The task is not in the registry, even after alias resolution.
    #[error(
        "task '{task}' is not supported; supported tasks are [{}] (aliases: {})",
        .supported.join(", "),
        format_aliases(.aliases)
    )]
    UnsupportedTask {
        task: String,
        supported: Vec<String>,
        aliases: Vec<(String, String)>,
    },

    /// Neither a task nor a model was given to the factory.
    #[error("cannot build a pipeline without either a task or a model")]
    MissingTaskAndModel,

    /// The task could not be inferred from the model.
    #[error("cannot infer the task: {0}")]
    TaskInference(String),

    /// The model's head is not among the classes the task supports.
    #[error(
        "model '{model}' ({class}) is not supported for {task}; supported classes are [{}]",
        .supported.join(", ")
    )]
    ModelTypeMismatch {
        task: String,
        model: String,
        class: String,
        supported: Vec<String>,
    },

    /// The call input cannot be turned into model inputs.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The model has not been bound to a device.
    #[error("model is not bound to a device")]
    NotBound,

    /// The pipeline was disposed and can no longer run.
    #[error("pipeline has been disposed")]
    Disposed,

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

fn format_aliases(aliases: &[(String, String)]) -> String {
    aliases
        .iter()
        .map(|(alias, task)| format!("{alias} -> {task}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_task_lists_aliases() {
        let err = PipelineError::UnsupportedTask {
            task: "foo-bar".into(),
            supported: vec!["fill-mask".into(), "token-classification".into()],
            aliases: vec![("ner".into(), "token-classification".into())],
        };
        let msg = err.to_string();
        assert!(msg.contains("foo-bar"));
        assert!(msg.contains("fill-mask, token-classification"));
        assert!(msg.contains("ner -> token-classification"));
    }

    #[test]
    fn test_incompatible_config_keeps_source() {
        use std::error::Error;

        let err = PipelineError::IncompatibleConfig {
            config: "bert-large".into(),
            source: Box::new(DeviceError::TooFewDevices {
                requested: 4,
                available: 1,
            }),
        };
        assert!(err.to_string().contains("'bert-large'"));
        let source = err.source().unwrap();
        assert!(source.to_string().contains("4 devices"));
    }
}
