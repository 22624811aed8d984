// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer definitions for model layouts.
//!
//! Each [`LayerDef`] describes one shardable unit of a model: an
//! embedding table, a transformer block, or an output head. Weight data
//! is never held here; only weight shapes, so memory can be planned
//! before anything is placed on a device.

use tensor_core::{DType, Shape};

/// The kind of computation a layer performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    /// Token and position embedding tables.
    Embedding,
    /// Self-attention plus feed-forward.
    TransformerBlock,
    /// Self-attention, cross-attention plus feed-forward.
    CrossAttentionBlock,
    /// Output projection (classifier, LM head, span head).
    Head,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::TransformerBlock => "transformer_block",
            Self::CrossAttentionBlock => "cross_attention_block",
            Self::Head => "head",
        }
    }

    /// Blocks are the units `layers_per_device` counts.
    pub fn is_block(&self) -> bool {
        matches!(self, Self::TransformerBlock | Self::CrossAttentionBlock)
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a model a layer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Encoder,
    Decoder,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encoder => "encoder",
            Self::Decoder => "decoder",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata describing a single layer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerDef {
    /// Unique identifier (e.g. `"encoder.layer.3"`).
    pub name: String,
    pub layer_type: LayerType,
    /// Position in execution order (0-based).
    pub index: usize,
    pub component: Component,
    /// Shapes of the weight tensors this layer owns.
    pub weight_shapes: Vec<Shape>,
    /// Element type of the weights.
    pub dtype: DType,
}

impl LayerDef {
    /// Memory required for this layer's weights in bytes.
    pub fn estimated_weight_bytes(&self) -> usize {
        self.weight_shapes
            .iter()
            .map(|s| s.size_bytes(self.dtype))
            .sum()
    }

    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        let weight_kb = self.estimated_weight_bytes() as f64 / 1024.0;
        format!(
            "[{}] {} ({}, {}) weights: {:.1} KB in {} tensors ({})",
            self.index,
            self.name,
            self.layer_type,
            self.component,
            weight_kb,
            self.weight_shapes.len(),
            self.dtype,
        )
    }
}
