// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A trained model as seen by the host: configuration plus layer layout.
//!
//! # Layout
//!
//! ```text
//! encoder-only   [embedding] [block 0] .. [block n-1] [head]
//! decoder-only   [embedding] [block 0] .. [block n-1] [head]          (all decoder)
//! encoder-decoder [embedding] [enc 0] .. [enc n-1] [dec 0] .. [dec m-1] [head]
//! ```
//!
//! Layers are derived from the configuration, so a model can be planned
//! and compiled before any weight is read.

use std::fmt;

use tensor_core::{DType, Shape};

use crate::{Component, LayerDef, LayerType, ModelClass, ModelConfig, ModelError};

/// A pretrained model ready to be bound to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainedModel {
    id: String,
    revision: Option<String>,
    config: ModelConfig,
    class: ModelClass,
    layers: Vec<LayerDef>,
    dtype: DType,
}

impl PretrainedModel {
    /// Builds a model and its layer layout from a configuration.
    pub fn from_config(
        id: impl Into<String>,
        revision: Option<String>,
        config: ModelConfig,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        config.validate(&id)?;
        let class = config.class().ok_or_else(|| ModelError::InvalidConfig {
            model: id.clone(),
            detail: "missing model class".into(),
        })?;
        let layers = build_layers(&config, class);
        Ok(Self {
            id,
            revision,
            config,
            class,
            layers,
            dtype: DType::F32,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    pub fn model_type(&self) -> &str {
        &self.config.model_type
    }

    pub fn class(&self) -> ModelClass {
        self.class
    }

    pub fn is_encoder_decoder(&self) -> bool {
        self.config.is_encoder_decoder
    }

    /// Element type of the weights.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn layers(&self) -> &[LayerDef] {
        &self.layers
    }

    /// Number of transformer blocks across all components.
    pub fn num_blocks(&self) -> usize {
        self.layers.iter().filter(|l| l.layer_type.is_block()).count()
    }

    /// Checks the layer list before it is sharded.
    ///
    /// # Checks
    /// - The layout is non-empty and contains at least one block.
    /// - Layer indices are consecutive starting from 0.
    /// - No weight tensor has zero elements.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.num_blocks() == 0 {
            return Err(ModelError::InvalidConfig {
                model: self.id.clone(),
                detail: "layout contains no transformer blocks".into(),
            });
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.index != i {
                return Err(ModelError::InvalidLayer {
                    layer: layer.name.clone(),
                    detail: format!("expected index {i}, got {}", layer.index),
                });
            }
            if layer.weight_shapes.iter().any(|s| s.num_elements() == 0) {
                return Err(ModelError::InvalidLayer {
                    layer: layer.name.clone(),
                    detail: "weight shape has zero elements".into(),
                });
            }
        }
        Ok(())
    }

    /// Casts all weights to half precision.
    pub fn half(&mut self) {
        self.dtype = DType::F16;
        for layer in &mut self.layers {
            layer.dtype = DType::F16;
        }
    }

    pub fn is_half(&self) -> bool {
        self.dtype == DType::F16
    }

    /// Total weight memory in bytes.
    pub fn weight_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.estimated_weight_bytes()).sum()
    }

    /// Activation memory needed per sample at the maximum sequence length.
    pub fn activation_bytes_per_sample(&self) -> usize {
        self.config.hidden_size * self.config.max_position_embeddings * self.dtype.size_bytes()
    }

    /// Width of the last dimension of the model's `logits` output.
    pub fn output_width(&self) -> usize {
        match self.class {
            ModelClass::SequenceClassification
            | ModelClass::TokenClassification
            | ModelClass::AudioClassification
            | ModelClass::ImageClassification => self.config.num_labels(),
            ModelClass::QuestionAnswering => 2,
            ModelClass::MaskedLm
            | ModelClass::CausalLm
            | ModelClass::Seq2SeqLm
            | ModelClass::Ctc => self.config.vocab_size,
        }
    }

    /// `true` when `logits` has a row per input position.
    pub fn per_token_output(&self) -> bool {
        self.class.is_per_token()
    }

    /// Returns a summary string describing the model.
    pub fn summary(&self) -> String {
        let weight_mb = self.weight_bytes() as f64 / (1024.0 * 1024.0);
        format!(
            "Model '{}'{} ({}, {}): {} layers, {} blocks, {:.1} MB weights ({})",
            self.id,
            self.revision
                .as_deref()
                .map(|r| format!("@{r}"))
                .unwrap_or_default(),
            self.config.model_type,
            self.class,
            self.layers.len(),
            self.num_blocks(),
            weight_mb,
            self.dtype,
        )
    }
}

impl fmt::Display for PretrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for layer in &self.layers {
            writeln!(f, "  {}", layer.summary())?;
        }
        Ok(())
    }
}

fn build_layers(config: &ModelConfig, class: ModelClass) -> Vec<LayerDef> {
    let h = config.hidden_size;
    let first = if class == ModelClass::CausalLm {
        Component::Decoder
    } else {
        Component::Encoder
    };

    let mut layers = Vec::new();
    let mut push = |name: String, layer_type, component, weight_shapes: Vec<Shape>| {
        let index = layers.len();
        layers.push(LayerDef {
            name,
            layer_type,
            index,
            component,
            weight_shapes,
            dtype: DType::F32,
        });
    };

    push(
        "embeddings".into(),
        LayerType::Embedding,
        first,
        vec![
            Shape::matrix(config.vocab_size, h),
            Shape::matrix(config.max_position_embeddings, h),
        ],
    );
    for i in 0..config.num_hidden_layers {
        push(
            format!("{first}.layer.{i}"),
            LayerType::TransformerBlock,
            first,
            block_weights(h, false),
        );
    }
    for i in 0..config.decoder_layers() {
        push(
            format!("decoder.layer.{i}"),
            LayerType::CrossAttentionBlock,
            Component::Decoder,
            block_weights(h, true),
        );
    }
    let head_component = if config.is_encoder_decoder {
        Component::Decoder
    } else {
        first
    };
    let head_width = match class {
        ModelClass::QuestionAnswering => 2,
        ModelClass::MaskedLm | ModelClass::CausalLm | ModelClass::Seq2SeqLm | ModelClass::Ctc => {
            config.vocab_size
        }
        _ => config.num_labels(),
    };
    push(
        "head".into(),
        LayerType::Head,
        head_component,
        vec![Shape::matrix(h, head_width), Shape::vector(head_width)],
    );
    layers
}

fn block_weights(h: usize, cross_attention: bool) -> Vec<Shape> {
    let mut shapes = vec![
        Shape::matrix(h, 3 * h),
        Shape::matrix(h, h),
        Shape::matrix(h, 4 * h),
        Shape::matrix(4 * h, h),
        Shape::vector(2 * h),
    ];
    if cross_attention {
        shapes.push(Shape::matrix(h, 3 * h));
        shapes.push(Shape::matrix(h, h));
    }
    shapes
}
