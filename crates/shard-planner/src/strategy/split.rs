// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Encoder/decoder split for sequence-to-sequence generation.
//!
//! The encoder and decoder are compiled as separate executables, so each
//! gets its own group of devices:
//!
//! ```text
//! devices:   0 .. k-1          k .. n-1
//!            [embedding, enc]  [dec, head]      k = max(1, n / 2)
//! ```
//!
//! With a single device both halves share device 0.

use device_runtime::MemoryBudget;
use model_hub::{Component, LayerDef, PretrainedModel};

use crate::plan::{split_evenly, PlanBuilder};
use crate::strategy::{check_inputs, ShardStrategy};
use crate::{PlannerError, ShardPlan};

#[derive(Debug, Clone, Default)]
pub struct EncoderDecoderSplit;

impl EncoderDecoderSplit {
    pub fn new() -> Self {
        Self
    }
}

impl ShardStrategy for EncoderDecoderSplit {
    fn name(&self) -> &str {
        "encoder-decoder-split"
    }

    fn plan(
        &self,
        model: &PretrainedModel,
        devices: usize,
        budget: MemoryBudget,
    ) -> Result<ShardPlan, PlannerError> {
        check_inputs(model, devices)?;
        if !model.is_encoder_decoder() {
            return Err(PlannerError::StrategyFailed {
                strategy: self.name().into(),
                detail: format!("'{}' is not an encoder-decoder model", model.id()),
            });
        }

        let encoder = component_layers(model, Component::Encoder);
        let decoder = component_layers(model, Component::Decoder);

        let (enc_devices, dec_first, dec_devices) = if devices == 1 {
            (1, 0, 1)
        } else {
            let k = (devices / 2).max(1);
            (k, k, devices - k)
        };

        let mut builder = PlanBuilder::new(
            self.name(),
            devices,
            budget.as_bytes(),
            model.activation_bytes_per_sample(),
        );
        builder.place(&encoder, 0, &split_evenly(blocks(&encoder), enc_devices));
        builder.place(&decoder, dec_first, &split_evenly(blocks(&decoder), dec_devices));
        builder.build()
    }
}

fn component_layers(model: &PretrainedModel, component: Component) -> Vec<&LayerDef> {
    model
        .layers()
        .iter()
        .filter(|l| l.component == component)
        .collect()
}

fn blocks(layers: &[&LayerDef]) -> usize {
    layers.iter().filter(|l| l.layer_type.is_block()).count()
}
