// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A tiny in-memory model per builtin task, registered under the task's
//! default model id.

use anyhow::Context;
use model_hub::{InMemoryModelSource, ModelClass, ModelConfig};
use pipelines::{GenerationKind, PipelineKind, TaskDescriptor, TaskRegistry};
use serde_json::json;

const LAYERS: usize = 4;
const HIDDEN: usize = 16;
const VOCAB: usize = 300;
const POSITIONS: usize = 512;

/// Every default model of `registry`, small enough to run instantly.
pub fn catalogue(registry: &TaskRegistry) -> anyhow::Result<InMemoryModelSource> {
    let mut source = InMemoryModelSource::new();
    for descriptor in registry.descriptors() {
        let config = demo_config(descriptor)
            .with_context(|| format!("demo model for {}", descriptor.name))?;
        source = source.with_model(descriptor.default_model.clone(), config);
    }
    Ok(source)
}

fn demo_config(descriptor: &TaskDescriptor) -> anyhow::Result<ModelConfig> {
    let class = descriptor
        .model_classes
        .first()
        .copied()
        .context("task lists no model class")?;
    let model_type = match descriptor.generation {
        GenerationKind::DecoderOnly => "gpt2",
        GenerationKind::Seq2Seq => "t5",
        GenerationKind::None => match class {
            ModelClass::AudioClassification | ModelClass::Ctc => "wav2vec2",
            ModelClass::ImageClassification => "vit",
            _ => "bert",
        },
    };
    let labels: &[&str] = match descriptor.kind {
        PipelineKind::ZeroShotClassification => &["contradiction", "neutral", "entailment"],
        PipelineKind::TokenClassification => &["O", "B-PER", "I-PER", "B-LOC", "I-LOC"],
        PipelineKind::AudioClassification => &["yes", "no", "up", "down"],
        PipelineKind::ImageClassification => &["cat", "dog", "bird"],
        _ => &["NEGATIVE", "POSITIVE"],
    };
    let id2label: serde_json::Map<String, serde_json::Value> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (i.to_string(), json!(label)))
        .collect();

    let config = json!({
        "model_type": model_type,
        "model_class": class,
        "is_encoder_decoder": descriptor.is_seq2seq_generation(),
        "num_hidden_layers": LAYERS,
        "hidden_size": HIDDEN,
        "vocab_size": VOCAB,
        "max_position_embeddings": POSITIONS,
        "id2label": id2label,
        "pad_token_id": 0,
        "eos_token_id": 1,
        "pipeline_tag": descriptor.name,
    });
    Ok(serde_json::from_value(config)?)
}
