// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Host-side tensor types for accelerator pipelines.
//!
//! This crate provides:
//! - [`Tensor`]: an n-dimensional tensor backed by a little-endian byte buffer.
//! - [`Shape`]: shape descriptors whose leading dimension is the batch.
//! - [`DType`]: supported element types (f32, f16, i64, i32, u8).
//! - [`ModelInputs`] / [`ModelOutputs`]: insertion-ordered named values
//!   exchanged with compiled executables.
//! - Half-precision casting through the `half` crate.
//! - Row-wise [`softmax_rows`] and [`argmax_rows`] for postprocessing.
//!
//! # Design Goals
//! - No `unsafe`: typed access decodes from bytes.
//! - Clean error types via `thiserror`.

mod dtype;
mod error;
mod io;
mod ops;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use io::{InputValue, ModelInputs, ModelOutputs};
pub use ops::{argmax_rows, softmax_rows};
pub use shape::Shape;
pub use tensor::Tensor;
