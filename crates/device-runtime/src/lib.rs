// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # device-runtime
//!
//! The accelerator-facing layer: a runtime interface for fixed-shape,
//! ahead-of-time compiled executables and an in-process simulation of it.
//!
//! # Key Components
//!
//! - [`DeviceRuntime`]: compile / execute / destroy / cast-to-half.
//! - [`BatchSignature`]: the input shape an executable is fixed to.
//! - [`CompiledExecutable`]: an RAII handle that destroys its device
//!   executable exactly once, explicitly or on drop.
//! - [`MemoryBudget`]: per-device memory with human-readable parsing
//!   (`"900M"`, `"1G"`).
//! - [`SimulatedDevice`]: a multi-device accelerator model that enforces
//!   budgets and signatures and counts compiles in [`DeviceStats`].
//!
//! # Ownership Model
//!
//! ```text
//! CompiledExecutable::compile(runtime, request)
//!       │
//!       ▼
//!   CompiledExecutable  ◄─── owns ExecutableId, holds Arc<dyn DeviceRuntime>
//!       │
//!       │  destroy(self) / drop()
//!       ▼
//!   DeviceRuntime::destroy(id)  ──► device memory released
//! ```

mod budget;
mod error;
mod executable;
mod runtime;
mod simulated;
mod stats;

pub use budget::MemoryBudget;
pub use error::DeviceError;
pub use executable::CompiledExecutable;
pub use runtime::{
    BatchSignature, CompileRequest, DeviceRuntime, ExecutableId, ExecutionOptions,
    ExecutionStrategy, OutputSpec, Precision, ProgramSpec,
};
pub use simulated::SimulatedDevice;
pub use stats::DeviceStats;
