// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`ShardStrategy`] trait and strategy implementations.

pub mod balanced;
pub mod explicit;
pub mod split;

use device_runtime::MemoryBudget;
use model_hub::PretrainedModel;

use crate::{PlannerError, ShardPlan};

/// Trait for sharding strategies.
///
/// Each strategy takes a model layout, the number of devices in one
/// replica and the per-device memory budget, and produces a [`ShardPlan`]
/// that respects the budget.
///
/// Strategies are purely algorithmic with no I/O, so they are unit-tested
/// against synthetic layouts.
pub trait ShardStrategy: Send + Sync {
    /// Human-readable name of this strategy.
    fn name(&self) -> &str;

    /// Places the model's layers on `devices` devices.
    fn plan(
        &self,
        model: &PretrainedModel,
        devices: usize,
        budget: MemoryBudget,
    ) -> Result<ShardPlan, PlannerError>;
}

pub(crate) fn check_inputs(model: &PretrainedModel, devices: usize) -> Result<usize, PlannerError> {
    if devices == 0 {
        return Err(PlannerError::NoDevices);
    }
    match model.num_blocks() {
        0 => Err(PlannerError::EmptyModel),
        n => Ok(n),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use model_hub::{ModelConfig, PretrainedModel};

    /// Encoder-only classifier with `blocks` blocks of hidden size 8.
    pub fn encoder(blocks: usize) -> PretrainedModel {
        let json = format!(
            r#"{{"model_type": "bert", "model_class": "sequence_classification",
                "num_hidden_layers": {blocks}, "hidden_size": 8, "vocab_size": 16,
                "max_position_embeddings": 8}}"#
        );
        PretrainedModel::from_config("enc", None, ModelConfig::from_json(&json).unwrap()).unwrap()
    }

    /// Encoder-decoder model with `enc` encoder and `dec` decoder blocks.
    pub fn seq2seq(enc: usize, dec: usize) -> PretrainedModel {
        let json = format!(
            r#"{{"model_type": "t5", "model_class": "seq2seq_lm", "is_encoder_decoder": true,
                "num_hidden_layers": {enc}, "num_decoder_layers": {dec},
                "hidden_size": 8, "vocab_size": 16, "max_position_embeddings": 8}}"#
        );
        PretrainedModel::from_config("s2s", None, ModelConfig::from_json(&json).unwrap()).unwrap()
    }
}
