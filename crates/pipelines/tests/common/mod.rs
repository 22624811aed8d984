// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shared fixtures: a small model catalogue and a simulated device.

#![allow(dead_code)]

use std::sync::Arc;

use device_runtime::{MemoryBudget, SimulatedDevice};
use model_hub::{BuiltinPreprocessors, InMemoryModelSource, ModelConfig, PretrainedModel};
use pipelines::{Collaborators, PipelineBuilder, TaskRegistry};

pub const SST2: &str = "distilbert-base-uncased-finetuned-sst-2-english";
pub const HUBERT: &str = "superb/hubert-base-superb-ks";
pub const T5: &str = "t5-small";
pub const GPT2: &str = "gpt2";

pub fn config(json: &str) -> ModelConfig {
    ModelConfig::from_json(json).unwrap()
}

pub fn classifier_config() -> ModelConfig {
    config(
        r#"{"model_type": "distilbert",
            "architectures": ["DistilBertForSequenceClassification"],
            "num_hidden_layers": 2, "hidden_size": 8, "vocab_size": 300,
            "max_position_embeddings": 128,
            "id2label": {"0": "NEGATIVE", "1": "POSITIVE"},
            "pipeline_tag": "text-classification"}"#,
    )
}

pub fn audio_config() -> ModelConfig {
    config(
        r#"{"model_type": "hubert", "model_class": "audio_classification",
            "num_hidden_layers": 2, "hidden_size": 8, "vocab_size": 32,
            "max_position_embeddings": 64,
            "id2label": {"0": "yes", "1": "no", "2": "up"}}"#,
    )
}

pub fn t5_config() -> ModelConfig {
    config(
        r#"{"model_type": "t5", "architectures": ["T5ForConditionalGeneration"],
            "is_encoder_decoder": true, "num_hidden_layers": 2, "hidden_size": 8,
            "vocab_size": 300, "max_position_embeddings": 64,
            "pad_token_id": 0, "eos_token_id": 1}"#,
    )
}

pub fn gpt2_config() -> ModelConfig {
    config(
        r#"{"model_type": "gpt2", "architectures": ["GPT2LMHeadModel"],
            "n_layer": 2, "n_embd": 8, "vocab_size": 300, "n_positions": 64,
            "eos_token_id": 1}"#,
    )
}

pub fn catalogue() -> InMemoryModelSource {
    InMemoryModelSource::new()
        .with_model(SST2, classifier_config())
        .with_model(HUBERT, audio_config())
        .with_model(T5, t5_config())
        .with_model("ainize/bart-base-cnn", t5_config())
        .with_model(GPT2, gpt2_config())
}

pub fn model(id: &str, config: ModelConfig) -> PretrainedModel {
    PretrainedModel::from_config(id, None, config).unwrap()
}

pub fn device() -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::new(4, MemoryBudget::from_mb(256)).with_input_recording())
}

pub fn collaborators(
    source: Arc<InMemoryModelSource>,
    device: &Arc<SimulatedDevice>,
) -> Collaborators {
    Collaborators::new(source, Arc::new(BuiltinPreprocessors::new()), device.clone())
}

/// A builder over the standard catalogue; returns the source for request checks.
pub fn builder<'r>(
    registry: &'r TaskRegistry,
    device: &Arc<SimulatedDevice>,
) -> (PipelineBuilder<'r>, Arc<InMemoryModelSource>) {
    let source = Arc::new(catalogue());
    let builder = PipelineBuilder::new(registry, collaborators(source.clone(), device));
    (builder, source)
}
