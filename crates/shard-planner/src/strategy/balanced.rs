// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Balanced sharding strategy.
//!
//! Spreads transformer blocks as evenly as possible across devices, the
//! earlier devices taking one extra block when the count does not divide.
//! Embeddings land on the first device and the head on the last occupied
//! one.
//!
//! # When to use
//! - Default whenever no explicit per-device layer counts are configured.

use device_runtime::MemoryBudget;
use model_hub::{LayerDef, PretrainedModel};

use crate::plan::{split_evenly, PlanBuilder};
use crate::strategy::{check_inputs, ShardStrategy};
use crate::{PlannerError, ShardPlan};

#[derive(Debug, Clone, Default)]
pub struct Balanced;

impl Balanced {
    pub fn new() -> Self {
        Self
    }
}

impl ShardStrategy for Balanced {
    fn name(&self) -> &str {
        "balanced"
    }

    fn plan(
        &self,
        model: &PretrainedModel,
        devices: usize,
        budget: MemoryBudget,
    ) -> Result<ShardPlan, PlannerError> {
        let blocks = check_inputs(model, devices)?;
        let layers: Vec<&LayerDef> = model.layers().iter().collect();
        let mut builder = PlanBuilder::new(
            self.name(),
            devices,
            budget.as_bytes(),
            model.activation_bytes_per_sample(),
        );
        builder.place(&layers, 0, &split_evenly(blocks, devices));
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::fixtures;

    #[test]
    fn test_even_split() {
        let model = fixtures::encoder(4);
        let plan = Balanced::new()
            .plan(&model, 2, MemoryBudget::from_mb(1))
            .unwrap();
        assert_eq!(plan.num_stages(), 2);
        // embedding + 2 blocks | 2 blocks + head
        assert_eq!(plan.stages[0].num_layers(), 3);
        assert_eq!(plan.stages[1].num_layers(), 3);
        assert_eq!(plan.strategy_name, "balanced");
    }

    #[test]
    fn test_uneven_split_front_loaded() {
        let model = fixtures::encoder(5);
        let plan = Balanced::new()
            .plan(&model, 2, MemoryBudget::from_mb(1))
            .unwrap();
        assert_eq!(plan.stages[0].layer_indices, vec![0, 1, 2, 3]);
        assert_eq!(plan.stages[1].layer_indices, vec![4, 5, 6]);
    }

    #[test]
    fn test_single_device() {
        let model = fixtures::encoder(3);
        let plan = Balanced::new()
            .plan(&model, 1, MemoryBudget::from_mb(1))
            .unwrap();
        assert_eq!(plan.num_stages(), 1);
        assert_eq!(plan.total_layers(), model.layers().len());
    }

    #[test]
    fn test_budget_too_small() {
        let model = fixtures::encoder(2);
        let err = Balanced::new()
            .plan(&model, 1, MemoryBudget::from_bytes(64))
            .unwrap_err();
        assert!(matches!(err, PlannerError::BudgetTooSmall { device: 0, .. }));
    }

    #[test]
    fn test_zero_devices() {
        let model = fixtures::encoder(2);
        assert!(matches!(
            Balanced::new().plan(&model, 0, MemoryBudget::from_mb(1)),
            Err(PlannerError::NoDevices)
        ));
    }
}
