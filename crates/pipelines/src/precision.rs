// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Casts floating-point inputs for half-precision executables.

use device_runtime::Precision;
use tensor_core::{DType, InputValue, ModelInputs};
use tracing::debug;

use crate::binding::ModelBinding;
use crate::PipelineError;

/// Converts `F32` tensor inputs to `F16` before a half-precision forward.
///
/// Integer tensors, masks and non-tensor values pass through untouched.
/// Nothing happens for full precision or for a `Raw` binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionAdapter {
    precision: Precision,
}

impl PrecisionAdapter {
    pub fn new(precision: Precision) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn applies_to(&self, binding: &ModelBinding) -> bool {
        self.precision.is_half()
            && match binding {
                ModelBinding::Raw(_) => false,
                ModelBinding::Bound(_) | ModelBinding::Generative(_) => true,
            }
    }

    /// Casts in place; returns the number of tensors cast.
    pub fn adapt(
        &self,
        binding: &ModelBinding,
        inputs: &mut ModelInputs,
    ) -> Result<usize, PipelineError> {
        if !self.applies_to(binding) {
            return Ok(0);
        }
        let Some(runtime) = binding.runtime() else {
            return Ok(0);
        };
        let mut cast = 0;
        for (name, value) in inputs.iter_mut() {
            if let InputValue::Tensor(tensor) = value {
                if tensor.dtype() == DType::F32 {
                    *tensor = runtime.cast_half(tensor)?;
                    debug!(input = name, shape = %tensor.shape(), "cast input to f16");
                    cast += 1;
                }
            }
        }
        Ok(cast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::fixtures::*;
    use tensor_core::{Shape, Tensor};

    fn mixed_inputs() -> ModelInputs {
        ModelInputs::new()
            .with(
                "input_values",
                Tensor::from_f32(Shape::matrix(1, 4), &[0.5, -1.25, 2.0, 0.0]).unwrap(),
            )
            .with("attention_mask", Tensor::from_i64(Shape::matrix(1, 4), &[1, 1, 1, 0]).unwrap())
            .with("max_length", 8i64)
    }

    #[test]
    fn test_half_casts_only_f32_tensors() {
        let device = device();
        let binding = bind(&device, classifier(), "text-classification", Precision::Half);
        let mut inputs = mixed_inputs();
        let mask_before = inputs.get_tensor("attention_mask").unwrap().clone();

        let cast = PrecisionAdapter::new(Precision::Half).adapt(&binding, &mut inputs).unwrap();
        assert_eq!(cast, 1);
        let values = inputs.get_tensor("input_values").unwrap();
        assert_eq!(values.dtype(), DType::F16);
        assert_eq!(values.to_f32_vec().unwrap(), vec![0.5, -1.25, 2.0, 0.0]);
        assert_eq!(inputs.get_tensor("attention_mask").unwrap(), &mask_before);
        assert_eq!(inputs.get("max_length"), Some(&InputValue::Int(8)));
        assert_eq!(inputs.names(), vec!["input_values", "attention_mask", "max_length"]);
    }

    #[test]
    fn test_full_precision_is_untouched() {
        let device = device();
        let binding = bind(&device, classifier(), "text-classification", Precision::Full);
        let mut inputs = mixed_inputs();
        let before = inputs.clone();
        assert_eq!(PrecisionAdapter::new(Precision::Full).adapt(&binding, &mut inputs).unwrap(), 0);
        assert_eq!(inputs, before);
    }

    #[test]
    fn test_raw_binding_is_untouched() {
        let binding = ModelBinding::Raw(classifier());
        let adapter = PrecisionAdapter::new(Precision::Half);
        assert!(!adapter.applies_to(&binding));
        let mut inputs = mixed_inputs();
        assert_eq!(adapter.adapt(&binding, &mut inputs).unwrap(), 0);
        assert_eq!(inputs.get_tensor("input_values").unwrap().dtype(), DType::F32);
    }
}
