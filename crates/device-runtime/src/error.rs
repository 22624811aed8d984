// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the accelerator runtime.

use crate::{BatchSignature, ExecutableId};
use tensor_core::TensorError;

/// Errors raised by a [`DeviceRuntime`](crate::DeviceRuntime) or by the
/// executables it hands out.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device compiler rejected the program.
    #[error("compilation of '{program}' failed: {reason}")]
    CompileFailed { program: String, reason: String },

    /// A stage does not fit in the memory left on its device.
    #[error("out of device memory on device {device}: requested {requested_bytes} bytes, {available_bytes} available (budget: {budget_bytes})")]
    OutOfMemory {
        device: usize,
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// The program spans more devices than the runtime exposes.
    #[error("program needs {requested} devices but only {available} are attached")]
    TooFewDevices { requested: usize, available: usize },

    /// No live executable with this id.
    #[error("unknown or already destroyed executable {0}")]
    UnknownExecutable(ExecutableId),

    /// Inputs do not match the fixed shape the executable was compiled for.
    #[error("executable {id} was compiled for {expected}, called with {actual}")]
    SignatureMismatch {
        id: ExecutableId,
        expected: BatchSignature,
        actual: BatchSignature,
    },

    /// The inputs carry no tensor to derive a batch signature from.
    #[error("inputs contain no tensor value")]
    NoTensorInput,

    /// A memory budget string could not be parsed.
    #[error("invalid memory budget {0}")]
    InvalidBudget(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}
