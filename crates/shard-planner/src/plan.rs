// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shard plan: the output of the shard planner.
//!
//! A plan is a sequence of [`ShardStage`]s. Each stage places a contiguous
//! run of layers on one device. Stages are ordered by layer index; two
//! stages may share a device when an encoder and a decoder both live on it.

use model_hub::{Component, LayerDef};

use crate::PlannerError;

/// A contiguous run of layers placed on one device.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ShardStage {
    /// Device index within the replica.
    pub device: usize,
    /// Indices of the layers in this stage (into the model layout).
    pub layer_indices: Vec<usize>,
    /// Weight bytes resident for this stage.
    pub weight_bytes: usize,
    /// Component of the layers in this stage.
    pub component: Component,
}

impl ShardStage {
    pub fn num_layers(&self) -> usize {
        self.layer_indices.len()
    }

    pub fn first_layer(&self) -> Option<usize> {
        self.layer_indices.first().copied()
    }

    pub fn last_layer(&self) -> Option<usize> {
        self.layer_indices.last().copied()
    }
}

/// The complete placement produced by a [`crate::ShardStrategy`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ShardPlan {
    /// Strategy name that produced this plan.
    pub strategy_name: String,
    /// Number of devices in the replica.
    pub num_devices: usize,
    pub stages: Vec<ShardStage>,
    /// Per-device memory budget used for planning.
    pub budget_bytes: usize,
    /// Activation bytes reserved on every occupied device.
    pub activation_bytes: usize,
}

impl ShardPlan {
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Total number of layers across all stages.
    pub fn total_layers(&self) -> usize {
        self.stages.iter().map(|s| s.num_layers()).sum()
    }

    /// Weight bytes on each device, indexed by device.
    ///
    /// With `Some(component)` only stages of that component are counted.
    pub fn device_weight_bytes(&self, component: Option<Component>) -> Vec<usize> {
        let mut bytes = vec![0; self.num_devices];
        for stage in &self.stages {
            if component.map_or(true, |c| c == stage.component) {
                if let Some(slot) = bytes.get_mut(stage.device) {
                    *slot += stage.weight_bytes;
                }
            }
        }
        bytes
    }

    /// Stages holding layers of `component`.
    pub fn stages_for(&self, component: Component) -> impl Iterator<Item = &ShardStage> {
        self.stages.iter().filter(move |s| s.component == component)
    }

    /// Validates the plan.
    ///
    /// Checks:
    /// - Plan is non-empty and has no empty stages.
    /// - Devices are in range and never decrease from stage to stage.
    /// - Layer indices are contiguous from 0 across stages.
    /// - No device exceeds the budget (weights plus activations).
    pub fn validate(&self) -> Result<(), PlannerError> {
        if self.stages.is_empty() {
            return Err(PlannerError::EmptyModel);
        }
        let fail = |detail: String| PlannerError::StrategyFailed {
            strategy: self.strategy_name.clone(),
            detail,
        };

        let mut expected_layer = 0;
        let mut last_device = 0;
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.layer_indices.is_empty() {
                return Err(fail(format!("stage {i} is empty")));
            }
            if stage.device >= self.num_devices {
                return Err(fail(format!(
                    "stage {i} placed on device {} of {}",
                    stage.device, self.num_devices
                )));
            }
            if stage.device < last_device {
                return Err(fail(format!(
                    "stage {i} goes back from device {last_device} to {}",
                    stage.device
                )));
            }
            last_device = stage.device;
            for &li in &stage.layer_indices {
                if li != expected_layer {
                    return Err(fail(format!(
                        "expected layer index {expected_layer}, got {li} in stage {i}"
                    )));
                }
                expected_layer += 1;
            }
        }

        for (device, weights) in self.device_weight_bytes(None).into_iter().enumerate() {
            if weights == 0 && !self.stages.iter().any(|s| s.device == device) {
                continue;
            }
            let required = weights + self.activation_bytes;
            if required > self.budget_bytes {
                return Err(PlannerError::BudgetTooSmall {
                    device,
                    required_bytes: required,
                    budget_bytes: self.budget_bytes,
                });
            }
        }
        Ok(())
    }

    /// Returns a human-readable summary of the plan.
    pub fn summary(&self) -> String {
        let mb = |b: usize| b as f64 / (1024.0 * 1024.0);
        let per_device: Vec<String> = self
            .device_weight_bytes(None)
            .into_iter()
            .map(|b| format!("{:.1}", mb(b)))
            .collect();
        let layers_per_stage: Vec<usize> = self.stages.iter().map(|s| s.num_layers()).collect();
        format!(
            "Plan '{}': {} stages on {} devices, {} layers total, \
             weights per device [{}] MB of {:.1} MB, stage sizes: {:?}",
            self.strategy_name,
            self.num_stages(),
            self.num_devices,
            self.total_layers(),
            per_device.join(", "),
            mb(self.budget_bytes),
            layers_per_stage,
        )
    }
}

/// Builder for constructing a `ShardPlan` device by device.
///
/// Used internally by strategy implementations.
pub(crate) struct PlanBuilder {
    strategy_name: String,
    num_devices: usize,
    budget_bytes: usize,
    activation_bytes: usize,
    stages: Vec<ShardStage>,
}

impl PlanBuilder {
    pub fn new(
        strategy_name: &str,
        num_devices: usize,
        budget_bytes: usize,
        activation_bytes: usize,
    ) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            num_devices,
            budget_bytes,
            activation_bytes,
            stages: Vec::new(),
        }
    }

    /// Places `layers` on devices starting at `first_device`.
    ///
    /// `blocks_per_device[d]` transformer blocks go to `first_device + d`.
    /// Non-block layers before the first block join the first device,
    /// every other non-block layer joins the device of the preceding layer.
    pub fn place(
        &mut self,
        layers: &[&LayerDef],
        first_device: usize,
        blocks_per_device: &[usize],
    ) {
        if blocks_per_device.is_empty() {
            return;
        }
        let mut offset = 0;
        let mut taken = 0;
        for layer in layers {
            if layer.layer_type.is_block() {
                while offset + 1 < blocks_per_device.len() && taken >= blocks_per_device[offset] {
                    offset += 1;
                    taken = 0;
                }
                taken += 1;
            }
            self.push_layer(first_device + offset, layer);
        }
    }

    fn push_layer(&mut self, device: usize, layer: &LayerDef) {
        match self.stages.last_mut() {
            Some(stage) if stage.device == device && stage.component == layer.component => {
                stage.layer_indices.push(layer.index);
                stage.weight_bytes += layer.estimated_weight_bytes();
            }
            _ => self.stages.push(ShardStage {
                device,
                layer_indices: vec![layer.index],
                weight_bytes: layer.estimated_weight_bytes(),
                component: layer.component,
            }),
        }
    }

    /// Consumes the builder, validates and returns the finished plan.
    pub fn build(self) -> Result<ShardPlan, PlannerError> {
        let plan = ShardPlan {
            strategy_name: self.strategy_name,
            num_devices: self.num_devices,
            stages: self.stages,
            budget_bytes: self.budget_bytes,
            activation_bytes: self.activation_bytes,
        };
        plan.validate()?;
        Ok(plan)
    }
}

/// Splits `items` into `bins` counts differing by at most one, larger first.
pub(crate) fn split_evenly(items: usize, bins: usize) -> Vec<usize> {
    if bins == 0 {
        return Vec::new();
    }
    let base = items / bins;
    let extra = items % bins;
    (0..bins).map(|i| base + usize::from(i < extra)).collect()
}
