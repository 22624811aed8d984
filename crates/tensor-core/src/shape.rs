// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shapes. Dimension 0 is the batch dimension everywhere in the
//! workspace; executables are compiled for one `(batch, trailing)` pair.

use std::fmt;

use crate::DType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![4, 128]);
    /// assert_eq!(s.batch_size(), Some(4));
    /// assert_eq!(s.trailing_dims(), &[128]);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn scalar() -> Self {
        Self::new(Vec::new())
    }

    pub fn vector(len: usize) -> Self {
        Self::new(vec![len])
    }

    /// `[batch, sequence]`.
    pub fn matrix(batch: usize, len: usize) -> Self {
        Self::new(vec![batch, len])
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of all dimensions; 1 for a scalar.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.dims.first().copied()
    }

    /// Dimensions after the batch dimension.
    pub fn trailing_dims(&self) -> &[usize] {
        match self.dims.split_first() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    pub fn size_bytes(&self, dtype: DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(usize::to_string).collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_and_trailing() {
        let s = Shape::new(vec![8, 16, 3]);
        assert_eq!(s.batch_size(), Some(8));
        assert_eq!(s.trailing_dims(), &[16, 3]);
        assert_eq!(s.num_elements(), 384);

        let scalar = Shape::scalar();
        assert_eq!(scalar.batch_size(), None);
        assert!(scalar.trailing_dims().is_empty());
        assert_eq!(scalar.num_elements(), 1);
    }

    #[test]
    fn test_size_bytes_by_dtype() {
        let s = Shape::matrix(2, 64);
        assert_eq!(s.size_bytes(DType::F32), 512);
        assert_eq!(s.size_bytes(DType::F16), 256);
        assert_eq!(s.size_bytes(DType::I64), 1024);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::matrix(1, 128).to_string(), "[1, 128]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }
}
