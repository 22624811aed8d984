// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Row-wise reductions used by host-side postprocessing.
//!
//! All operations treat the last dimension as the row length and every
//! leading dimension as a row index.

use crate::{Tensor, TensorError};

fn rows_of(t: &Tensor, op: &'static str) -> Result<(Vec<f32>, usize), TensorError> {
    let width = match t.shape().dims().last() {
        Some(&w) if w > 0 => w,
        _ => {
            return Err(TensorError::InvalidShape {
                op,
                shape: t.shape().clone(),
                detail: "needs a non-empty last dimension".into(),
            })
        }
    };
    Ok((t.to_f32_vec()?, width))
}

/// Numerically stable softmax over each row.
pub fn softmax_rows(t: &Tensor) -> Result<Vec<Vec<f32>>, TensorError> {
    let (values, width) = rows_of(t, "softmax_rows")?;
    Ok(values
        .chunks_exact(width)
        .map(|row| {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = row.iter().map(|x| (x - max).exp()).collect();
            let sum: f32 = exps.iter().sum();
            exps.into_iter().map(|e| e / sum).collect()
        })
        .collect())
}

/// Index of the largest value in each row. Ties resolve to the lowest index.
pub fn argmax_rows(t: &Tensor) -> Result<Vec<usize>, TensorError> {
    let (values, width) = rows_of(t, "argmax_rows")?;
    Ok(values
        .chunks_exact(width)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv {
                        (i, v)
                    } else {
                        (bi, bv)
                    }
                })
                .0
        })
        .collect())
}
