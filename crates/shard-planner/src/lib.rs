// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # shard-planner
//!
//! Splits a model's layer layout across the devices of one replica while
//! keeping every device within its memory budget.
//!
//! # Strategies
//!
//! | Strategy | Placement | Used for |
//! |---|---|---|
//! | [`Balanced`] | blocks spread evenly | default |
//! | [`Explicit`] | `layers_per_device` counts, `-1` fills the rest | configured layouts |
//! | [`EncoderDecoderSplit`] | encoder on the first half, decoder on the rest | seq2seq generation |
//!
//! # Trait-Based Extensibility
//!
//! All strategies implement [`ShardStrategy`]:
//!
//! ```ignore
//! struct MyStrategy;
//! impl ShardStrategy for MyStrategy {
//!     fn name(&self) -> &str { "custom" }
//!     fn plan(&self, model: &PretrainedModel, devices: usize, budget: MemoryBudget)
//!         -> Result<ShardPlan, PlannerError> { /* ... */ }
//! }
//! ```

mod error;
pub(crate) mod plan;
pub mod strategy;

use device_runtime::MemoryBudget;
use model_hub::PretrainedModel;

pub use error::PlannerError;
pub use plan::{ShardPlan, ShardStage};
pub use strategy::balanced::Balanced;
pub use strategy::explicit::{Explicit, FILL_REMAINDER};
pub use strategy::split::EncoderDecoderSplit;
pub use strategy::ShardStrategy;

/// Picks a strategy for `model` and runs it.
///
/// - Encoder-decoder models bound for generation use [`EncoderDecoderSplit`].
/// - Otherwise a non-empty `layers_per_device` selects [`Explicit`].
/// - Otherwise [`Balanced`].
pub fn plan_for(
    model: &PretrainedModel,
    devices: usize,
    layers_per_device: &[i64],
    for_generation: bool,
    budget: MemoryBudget,
) -> Result<ShardPlan, PlannerError> {
    let strategy: Box<dyn ShardStrategy> = if for_generation && model.is_encoder_decoder() {
        Box::new(EncoderDecoderSplit::new())
    } else if !layers_per_device.is_empty() {
        Box::new(Explicit::new(layers_per_device.to_vec()))
    } else {
        Box::new(Balanced::new())
    };
    tracing::debug!(
        model = model.id(),
        devices,
        strategy = strategy.name(),
        "sharding model"
    );
    strategy.plan(model, devices, budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::fixtures;

    #[test]
    fn test_plan_for_selects_strategy() {
        let budget = MemoryBudget::from_mb(1);
        let enc = fixtures::encoder(4);
        assert_eq!(plan_for(&enc, 2, &[], false, budget).unwrap().strategy_name, "balanced");
        assert_eq!(
            plan_for(&enc, 2, &[1, -1], false, budget).unwrap().strategy_name,
            "explicit"
        );
        let s2s = fixtures::seq2seq(2, 2);
        assert_eq!(
            plan_for(&s2s, 2, &[1, -1], true, budget).unwrap().strategy_name,
            "encoder-decoder-split"
        );
        assert_eq!(plan_for(&s2s, 2, &[], false, budget).unwrap().strategy_name, "balanced");
    }

    #[test]
    fn test_plan_serializes() {
        let plan =
            plan_for(&fixtures::encoder(2), 1, &[], false, MemoryBudget::from_mb(1)).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"strategy_name\":\"balanced\""));
    }
}
