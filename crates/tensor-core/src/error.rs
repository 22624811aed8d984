// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{DType, Shape};

/// Errors that can occur during tensor construction and conversion.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer size does not match the expected size for the given shape and dtype.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// A tensor's shape is not acceptable for the requested operation.
    #[error("invalid shape {shape} for {op}: {detail}")]
    InvalidShape {
        op: &'static str,
        shape: Shape,
        detail: String,
    },

    /// The requested data type is not supported for this operation.
    #[error("unsupported dtype {dtype} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },
}
