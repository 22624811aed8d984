// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type.

use half::f16;

use crate::{DType, Shape, TensorError};

/// A dense host tensor.
///
/// `Tensor` is the data carrier between host-side preprocessing
/// and a compiled device executable.
///
/// # Memory Layout
/// Data is stored in row-major (C) order as a flat little-endian byte
/// buffer. Typed access goes through decoding helpers such as
/// [`to_f32_vec`](Tensor::to_f32_vec) and [`to_i64_vec`](Tensor::to_i64_vec),
/// so the buffer never has to be aligned for the element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    data: Vec<u8>,
}

impl Tensor {
    /// ```
    /// use tensor_core::{DType, Shape, Tensor};
    /// let mask = Tensor::zeros(Shape::matrix(4, 16), DType::I64);
    /// assert_eq!(mask.size_bytes(), 4 * 16 * 8);
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let size = shape.size_bytes(dtype);
        Self {
            shape,
            dtype,
            data: vec![0u8; size],
        }
    }

    /// Wraps little-endian bytes; the length must match `shape` and `dtype`.
    pub fn from_bytes(shape: Shape, dtype: DType, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, dtype, data })
    }

    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let wave = Tensor::from_f32(Shape::matrix(1, 3), &[0.5, -0.5, 0.25]).unwrap();
    /// assert_eq!(wave.to_f32_vec().unwrap(), vec![0.5, -0.5, 0.25]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        check_len(&shape, values.len(), DType::F32)?;
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Ok(Self {
            shape,
            dtype: DType::F32,
            data,
        })
    }

    /// Creates a half-precision tensor from a slice of `f32` values.
    pub fn from_f32_as_half(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        check_len(&shape, values.len(), DType::F16)?;
        let data = values
            .iter()
            .flat_map(|v| f16::from_f32(*v).to_le_bytes())
            .collect();
        Ok(Self {
            shape,
            dtype: DType::F16,
            data,
        })
    }

    /// Creates a tensor from a slice of `i64` values (token ids, masks).
    pub fn from_i64(shape: Shape, values: &[i64]) -> Result<Self, TensorError> {
        check_len(&shape, values.len(), DType::I64)?;
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Ok(Self {
            shape,
            dtype: DType::I64,
            data,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Leading dimension of the shape, `None` for scalars.
    pub fn batch_size(&self) -> Option<usize> {
        self.shape.batch_size()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes a device transfer of this tensor moves.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Decodes the buffer as `f32` values. Half-precision data is widened.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        match self.dtype {
            DType::F32 => Ok(self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()),
            DType::F16 => Ok(self
                .data
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect()),
            other => Err(TensorError::UnsupportedDType {
                op: "to_f32_vec",
                dtype: other,
            }),
        }
    }

    /// Decodes the buffer as `i64` values. `i32` and `u8` data is widened.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>, TensorError> {
        match self.dtype {
            DType::I64 => Ok(self
                .data
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect()),
            DType::I32 => Ok(self
                .data
                .chunks_exact(4)
                .map(|c| i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect()),
            DType::U8 => Ok(self.data.iter().map(|&b| i64::from(b)).collect()),
            other => Err(TensorError::UnsupportedDType {
                op: "to_i64_vec",
                dtype: other,
            }),
        }
    }

    /// Returns a half-precision copy of a floating-point tensor.
    ///
    /// An `F16` tensor is returned unchanged. Integer tensors are rejected.
    pub fn to_half(&self) -> Result<Tensor, TensorError> {
        match self.dtype {
            DType::F16 => Ok(self.clone()),
            DType::F32 => {
                let values = self.to_f32_vec()?;
                Self::from_f32_as_half(self.shape.clone(), &values)
            }
            other => Err(TensorError::UnsupportedDType {
                op: "to_half",
                dtype: other,
            }),
        }
    }
}

fn check_len(shape: &Shape, len: usize, dtype: DType) -> Result<(), TensorError> {
    let expected = shape.num_elements();
    if len != expected {
        return Err(TensorError::BufferSizeMismatch {
            expected: expected * dtype.size_bytes(),
            actual: len * dtype.size_bytes(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mask() {
        let mask = Tensor::zeros(Shape::matrix(3, 5), DType::I64);
        assert_eq!(mask.size_bytes(), 120);
        assert_eq!(mask.batch_size(), Some(3));
        assert_eq!(mask.to_i64_vec().unwrap(), vec![0; 15]);
    }

    #[test]
    fn test_f32_values_keep_row_major_order() {
        let values = [0.1f32, 0.2, 0.3, -0.1, -0.2, -0.3];
        let wave = Tensor::from_f32(Shape::matrix(2, 3), &values).unwrap();
        assert_eq!(wave.to_f32_vec().unwrap(), values);
        assert_eq!(wave.shape().trailing_dims(), &[3]);
    }

    #[test]
    fn test_raw_bytes_must_fill_shape() {
        let result = Tensor::from_bytes(Shape::matrix(1, 4), DType::F16, vec![0u8; 6]);
        assert!(matches!(
            result,
            Err(TensorError::BufferSizeMismatch {
                expected: 8,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_from_i64_element_count_mismatch() {
        let result = Tensor::from_i64(Shape::matrix(2, 2), &[1, 2, 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_i64_decoding() {
        let t = Tensor::from_i64(Shape::matrix(1, 3), &[101, -7, 0]).unwrap();
        assert_eq!(t.to_i64_vec().unwrap(), vec![101, -7, 0]);
        assert!(t.to_f32_vec().is_err());
    }

    #[test]
    fn test_to_half_halves_storage() {
        let t = Tensor::from_f32(Shape::matrix(2, 2), &[0.5, -1.25, 2.0, 1024.0]).unwrap();
        let h = t.to_half().unwrap();
        assert_eq!(h.dtype(), DType::F16);
        assert_eq!(h.shape(), t.shape());
        assert_eq!(h.size_bytes(), t.size_bytes() / 2);
        // All of these are exactly representable in f16.
        assert_eq!(h.to_f32_vec().unwrap(), vec![0.5, -1.25, 2.0, 1024.0]);
    }

    #[test]
    fn test_to_half_is_idempotent() {
        let h = Tensor::from_f32_as_half(Shape::vector(2), &[1.0, 3.0]).unwrap();
        assert_eq!(h.to_half().unwrap(), h);
    }

    #[test]
    fn test_to_half_rejects_integers() {
        let t = Tensor::from_i64(Shape::vector(2), &[1, 2]).unwrap();
        assert!(matches!(
            t.to_half(),
            Err(TensorError::UnsupportedDType { dtype: DType::I64, .. })
        ));
    }
}
