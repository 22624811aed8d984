// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the shard planner.

/// Errors that can occur while sharding a model across devices.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// A device cannot hold the layers assigned to it.
    #[error("budget too small: device {device} requires {required_bytes} bytes, budget is {budget_bytes}")]
    BudgetTooSmall {
        device: usize,
        required_bytes: usize,
        budget_bytes: usize,
    },

    /// The model has no transformer blocks to place.
    #[error("cannot shard a model without transformer blocks")]
    EmptyModel,

    /// Zero devices were requested.
    #[error("at least one device is required")]
    NoDevices,

    /// An explicit per-device layer count does not describe the model.
    #[error("layers_per_device {layers_per_device:?} is invalid: {detail}")]
    LayerCountMismatch {
        layers_per_device: Vec<i64>,
        detail: String,
    },

    /// The chosen strategy cannot satisfy the given constraints.
    #[error("strategy '{strategy}' failed: {detail}")]
    StrategyFailed { strategy: String, detail: String },
}
