// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Explicit per-device block counts.
//!
//! `layers_per_device[d]` transformer blocks are placed on device `d`. One
//! entry may be `-1`, meaning "every block not claimed by another device".
//! The list must have one entry per device and must account for every
//! block of the model.

use device_runtime::MemoryBudget;
use model_hub::{LayerDef, PretrainedModel};

use crate::plan::PlanBuilder;
use crate::strategy::{check_inputs, ShardStrategy};
use crate::{PlannerError, ShardPlan};

/// Wildcard entry: takes the remaining blocks.
pub const FILL_REMAINDER: i64 = -1;

#[derive(Debug, Clone)]
pub struct Explicit {
    layers_per_device: Vec<i64>,
}

impl Explicit {
    pub fn new(layers_per_device: Vec<i64>) -> Self {
        Self { layers_per_device }
    }

    /// Resolves the configured counts against `blocks` blocks on `devices`
    /// devices.
    pub fn resolve(&self, blocks: usize, devices: usize) -> Result<Vec<usize>, PlannerError> {
        let invalid = |detail: String| PlannerError::LayerCountMismatch {
            layers_per_device: self.layers_per_device.clone(),
            detail,
        };

        if self.layers_per_device.len() != devices {
            return Err(invalid(format!(
                "{} entries for {devices} devices",
                self.layers_per_device.len()
            )));
        }
        let wildcards = self
            .layers_per_device
            .iter()
            .filter(|&&n| n == FILL_REMAINDER)
            .count();
        if wildcards > 1 {
            return Err(invalid("at most one entry may be -1".into()));
        }
        if let Some(bad) = self.layers_per_device.iter().find(|&&n| n < FILL_REMAINDER) {
            return Err(invalid(format!("negative count {bad}")));
        }

        let claimed: usize = self
            .layers_per_device
            .iter()
            .filter_map(|&n| usize::try_from(n).ok())
            .sum();
        if wildcards == 0 {
            if claimed != blocks {
                return Err(invalid(format!(
                    "counts sum to {claimed} but the model has {blocks} blocks"
                )));
            }
        } else if claimed > blocks {
            return Err(invalid(format!(
                "counts claim {claimed} blocks but the model has {blocks}"
            )));
        }

        let remainder = blocks.saturating_sub(claimed);
        Ok(self
            .layers_per_device
            .iter()
            .map(|&n| usize::try_from(n).unwrap_or(remainder))
            .collect())
    }
}

impl ShardStrategy for Explicit {
    fn name(&self) -> &str {
        "explicit"
    }

    fn plan(
        &self,
        model: &PretrainedModel,
        devices: usize,
        budget: MemoryBudget,
    ) -> Result<ShardPlan, PlannerError> {
        let blocks = check_inputs(model, devices)?;
        let counts = self.resolve(blocks, devices)?;
        let layers: Vec<&LayerDef> = model.layers().iter().collect();
        let mut builder = PlanBuilder::new(
            self.name(),
            devices,
            budget.as_bytes(),
            model.activation_bytes_per_sample(),
        );
        builder.place(&layers, 0, &counts);
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::fixtures;

    #[test]
    fn test_resolve_exact() {
        assert_eq!(Explicit::new(vec![2, 4]).resolve(6, 2).unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_resolve_wildcard() {
        assert_eq!(
            Explicit::new(vec![1, -1, 2]).resolve(6, 3).unwrap(),
            vec![1, 3, 2]
        );
        assert_eq!(Explicit::new(vec![0, -1]).resolve(4, 2).unwrap(), vec![0, 4]);
    }

    #[test]
    fn test_resolve_errors() {
        let cases: &[(Vec<i64>, usize, usize)] = &[
            (vec![2, 2], 6, 2),      // sum too small
            (vec![2, 2, 2], 6, 2),   // wrong length
            (vec![-1, -1], 6, 2),    // two wildcards
            (vec![-2, 8], 6, 2),     // negative
            (vec![7, -1], 6, 2),     // over-claimed
        ];
        for (counts, blocks, devices) in cases {
            let err = Explicit::new(counts.clone())
                .resolve(*blocks, *devices)
                .unwrap_err();
            assert!(
                matches!(err, PlannerError::LayerCountMismatch { .. }),
                "{counts:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_plan_follows_counts() {
        let model = fixtures::encoder(4);
        let plan = Explicit::new(vec![1, 3])
            .plan(&model, 2, MemoryBudget::from_mb(1))
            .unwrap();
        assert_eq!(plan.stages[0].layer_indices, vec![0, 1]);
        assert_eq!(plan.stages[1].layer_indices, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_error_message_names_counts() {
        let model = fixtures::encoder(4);
        let err = Explicit::new(vec![1, 1])
            .plan(&model, 2, MemoryBudget::from_mb(1))
            .unwrap_err();
        assert!(err.to_string().contains("[1, 1]"));
    }
}
