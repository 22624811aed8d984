// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Named model inputs and outputs.
//!
//! Inputs keep insertion order: the first tensor-valued entry is the
//! *primary* tensor, whose shape keys compiled executables.

use std::fmt;

use crate::Tensor;

/// A single named value handed to a model's forward pass.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// A tensor (token ids, masks, pixel values, waveforms).
    Tensor(Tensor),
    /// A scalar integer argument, e.g. `max_length` during generation.
    Int(i64),
    /// A free-form text argument.
    Text(String),
}

impl InputValue {
    /// Returns the tensor if this value holds one.
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            InputValue::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Tensor> for InputValue {
    fn from(t: Tensor) -> Self {
        InputValue::Tensor(t)
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        InputValue::Int(v)
    }
}

impl From<String> for InputValue {
    fn from(v: String) -> Self {
        InputValue::Text(v)
    }
}

/// Insertion-ordered map of named inputs.
///
/// Re-inserting an existing name replaces the value in place and keeps
/// its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInputs {
    entries: Vec<(String, InputValue)>,
}

impl ModelInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a named value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<InputValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_tensor(&self, name: &str) -> Option<&Tensor> {
        self.get(name).and_then(InputValue::as_tensor)
    }

    /// The first tensor-valued input in insertion order.
    pub fn primary_tensor(&self) -> Option<(&str, &Tensor)> {
        self.entries
            .iter()
            .find_map(|(n, v)| v.as_tensor().map(|t| (n.as_str(), t)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut InputValue)> {
        self.entries.iter_mut().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl IntoIterator for ModelInputs {
    type Item = (String, InputValue);
    type IntoIter = std::vec::IntoIter<(String, InputValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, InputValue)> for ModelInputs {
    fn from_iter<I: IntoIterator<Item = (String, InputValue)>>(iter: I) -> Self {
        let mut inputs = ModelInputs::new();
        for (name, value) in iter {
            inputs.insert(name, value);
        }
        inputs
    }
}

impl fmt::Display for ModelInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                InputValue::Tensor(t) => write!(f, "{name}: {}{}", t.dtype(), t.shape())?,
                InputValue::Int(v) => write!(f, "{name}: {v}")?,
                InputValue::Text(s) => write!(f, "{name}: {s:?}")?,
            }
        }
        write!(f, "}}")
    }
}

/// Named tensors produced by a forward pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutputs {
    entries: Vec<(String, Tensor)>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = tensor,
            None => self.entries.push((name, tensor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
