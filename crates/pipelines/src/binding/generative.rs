// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Generation-capable models with their own executables.
//!
//! A [`GenerativeModel`] owns one slot per sub-executable: a decoder, and
//! for sequence-to-sequence models an encoder. Slots compile lazily on the
//! first [`generate`](GenerativeModel::generate) call and recompile on
//! their own when the batch signature changes.
//!
//! # Greedy Decoding
//!
//! ```text
//! seq2seq       encoder(input_ids) ──► hidden
//!               decoder([start, pad, ..], hidden) ─► argmax ─► write t=1
//!               decoder([start, y1, pad, ..], hidden) ─► ...  until eos
//!
//! decoder-only  decoder([prompt.., pad, ..]) ─► argmax ─► append  until eos
//! ```
//!
//! Decoder inputs are padded to `max_length` so every step reuses the
//! same executable.

use std::fmt;
use std::sync::Arc;

use device_runtime::{
    BatchSignature, CompileRequest, DeviceRuntime, ExecutionOptions, Precision, ProgramSpec,
};
use model_hub::{ModelConfig, PretrainedModel};
use tensor_core::{argmax_rows, ModelInputs, ModelOutputs, Shape, Tensor};
use tracing::{debug, warn};

use super::ExecutableSlot;
use crate::PipelineError;

/// Decoder input carrying the encoder's output.
const ENCODER_HIDDEN_STATES: &str = "encoder_hidden_states";

/// A named sub-executable of a generative model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubExecutable {
    Encoder,
    Decoder,
}

impl SubExecutable {
    /// Every sub-executable, in release order.
    pub const ALL: [SubExecutable; 2] = [SubExecutable::Decoder, SubExecutable::Encoder];

    pub fn as_str(self) -> &'static str {
        match self {
            SubExecutable::Encoder => "encoder",
            SubExecutable::Decoder => "decoder",
        }
    }
}

impl fmt::Display for SubExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits and special tokens for greedy decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    /// Generated tokens for seq2seq models; total length for decoder-only.
    pub max_length: usize,
    pub pad_token_id: i64,
    pub eos_token_id: Option<i64>,
    pub decoder_start_token_id: i64,
}

impl GenerationParams {
    pub const DEFAULT_MAX_LENGTH: usize = 20;

    /// Defaults taken from a model configuration.
    pub fn from_config(config: &ModelConfig) -> Self {
        let pad = config.pad_token_id.or(config.eos_token_id).unwrap_or(0);
        Self {
            max_length: Self::DEFAULT_MAX_LENGTH,
            pad_token_id: pad,
            eos_token_id: config.eos_token_id,
            decoder_start_token_id: config.decoder_start_token_id.unwrap_or(pad),
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }
}

#[derive(Debug)]
struct SubProgram {
    program: ProgramSpec,
    slot: ExecutableSlot,
}

impl SubProgram {
    fn new(which: SubExecutable, program: ProgramSpec) -> Self {
        Self {
            program,
            slot: ExecutableSlot::new(which.as_str()),
        }
    }
}

/// A model that runs its own generation loop on the device.
#[derive(Debug)]
pub struct GenerativeModel {
    runtime: Arc<dyn DeviceRuntime>,
    model: PretrainedModel,
    precision: Precision,
    options: ExecutionOptions,
    encoder: Option<SubProgram>,
    decoder: SubProgram,
}

impl GenerativeModel {
    /// Wraps a model; `encoder` is `None` for decoder-only models.
    pub fn new(
        runtime: Arc<dyn DeviceRuntime>,
        model: PretrainedModel,
        encoder: Option<ProgramSpec>,
        decoder: ProgramSpec,
        precision: Precision,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            runtime,
            model,
            precision,
            options,
            encoder: encoder.map(|p| SubProgram::new(SubExecutable::Encoder, p)),
            decoder: SubProgram::new(SubExecutable::Decoder, decoder),
        }
    }

    pub fn model(&self) -> &PretrainedModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut PretrainedModel {
        &mut self.model
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn runtime(&self) -> &Arc<dyn DeviceRuntime> {
        &self.runtime
    }

    pub fn is_seq2seq(&self) -> bool {
        self.encoder.is_some()
    }

    /// The slot of a sub-executable, `None` if the model has none.
    pub fn slot(&self, which: SubExecutable) -> Option<&ExecutableSlot> {
        match which {
            SubExecutable::Encoder => self.encoder.as_ref().map(|s| &s.slot),
            SubExecutable::Decoder => Some(&self.decoder.slot),
        }
    }

    pub fn slot_mut(&mut self, which: SubExecutable) -> Option<&mut ExecutableSlot> {
        match which {
            SubExecutable::Encoder => self.encoder.as_mut().map(|s| &mut s.slot),
            SubExecutable::Decoder => Some(&mut self.decoder.slot),
        }
    }

    pub fn program(&self, which: SubExecutable) -> Option<&ProgramSpec> {
        match which {
            SubExecutable::Encoder => self.encoder.as_ref().map(|s| &s.program),
            SubExecutable::Decoder => Some(&self.decoder.program),
        }
    }

    /// Greedy generation.
    ///
    /// Reads `input_ids` (and `attention_mask` if present) and returns
    /// `sequences` (`[batch, n]` new tokens, pad-filled) and `lengths`
    /// (`[batch]` tokens generated per row, eos excluded).
    pub fn generate(
        &mut self,
        inputs: &ModelInputs,
        params: &GenerationParams,
    ) -> Result<ModelOutputs, PipelineError> {
        let input_ids = inputs
            .get_tensor("input_ids")
            .ok_or_else(|| PipelineError::InvalidInput("generation needs input_ids".into()))?;
        let (batch, len) = match input_ids.shape().dims() {
            &[b, l] => (b, l),
            _ => {
                return Err(PipelineError::InvalidInput(format!(
                    "input_ids must be [batch, len], got {}",
                    input_ids.shape()
                )))
            }
        };
        let ids = input_ids.to_i64_vec()?;
        let prompt_lengths = match inputs.get_tensor("attention_mask") {
            Some(mask) => mask
                .to_i64_vec()?
                .chunks(len.max(1))
                .map(|row| row.iter().filter(|&&m| m != 0).count())
                .collect(),
            None => vec![len; batch],
        };
        let prompts: Vec<Vec<i64>> = ids
            .chunks(len.max(1))
            .zip(&prompt_lengths)
            .map(|(row, &n)| row[..n.min(row.len())].to_vec())
            .collect();

        let generated = if self.is_seq2seq() {
            self.generate_seq2seq(inputs, batch, params)?
        } else {
            self.generate_decoder_only(&prompts, params)?
        };

        let width = generated.iter().map(Vec::len).max().unwrap_or(0);
        let mut sequences = Vec::with_capacity(batch * width);
        let mut lengths = Vec::with_capacity(batch);
        for row in &generated {
            sequences.extend_from_slice(row);
            sequences.extend(std::iter::repeat(params.pad_token_id).take(width - row.len()));
            lengths.push(row.len() as i64);
        }
        Ok(ModelOutputs::new()
            .with("sequences", Tensor::from_i64(Shape::matrix(batch, width), &sequences)?)
            .with("lengths", Tensor::from_i64(Shape::vector(batch), &lengths)?))
    }

    fn generate_seq2seq(
        &mut self,
        inputs: &ModelInputs,
        batch: usize,
        params: &GenerationParams,
    ) -> Result<Vec<Vec<i64>>, PipelineError> {
        let encoded = self.run(SubExecutable::Encoder, inputs)?;
        let hidden = encoded
            .get("last_hidden_state")
            .cloned()
            .ok_or_else(|| PipelineError::InvalidInput("encoder returned no hidden state".into()))?;

        let steps = params.max_length + 1;
        let mut decoder_ids = vec![params.pad_token_id; batch * steps];
        for row in decoder_ids.chunks_mut(steps) {
            row[0] = params.decoder_start_token_id;
        }
        let mut generated = vec![Vec::new(); batch];
        let mut finished = vec![false; batch];

        for t in 1..steps {
            let step_inputs = ModelInputs::new()
                .with(
                    "decoder_input_ids",
                    Tensor::from_i64(Shape::matrix(batch, steps), &decoder_ids)?,
                )
                .with(ENCODER_HIDDEN_STATES, hidden.clone());
            let next = self.next_tokens(&step_inputs, steps, &vec![t - 1; batch])?;
            for (b, token) in next.into_iter().enumerate() {
                if finished[b] {
                    continue;
                }
                decoder_ids[b * steps + t] = token;
                if Some(token) == params.eos_token_id {
                    finished[b] = true;
                } else {
                    generated[b].push(token);
                }
            }
            if finished.iter().all(|&f| f) {
                break;
            }
        }
        Ok(generated)
    }

    fn generate_decoder_only(
        &mut self,
        prompts: &[Vec<i64>],
        params: &GenerationParams,
    ) -> Result<Vec<Vec<i64>>, PipelineError> {
        let batch = prompts.len();
        let width = params.max_length;
        let mut generated = vec![Vec::new(); batch];
        if prompts.iter().any(|p| p.len() >= width) {
            warn!(
                max_length = width,
                "prompt reaches max_length, nothing is generated for it"
            );
        }

        let mut buffer = vec![params.pad_token_id; batch * width];
        let mut cursor: Vec<usize> = prompts.iter().map(|p| p.len().min(width)).collect();
        for (b, prompt) in prompts.iter().enumerate() {
            buffer[b * width..b * width + cursor[b]].copy_from_slice(&prompt[..cursor[b]]);
        }
        let mut finished: Vec<bool> = cursor.iter().map(|&c| c >= width).collect();

        while !finished.iter().all(|&f| f) {
            let mask: Vec<i64> = cursor
                .iter()
                .flat_map(|&c| (0..width).map(move |i| i64::from(i < c)))
                .collect();
            let step_inputs = ModelInputs::new()
                .with("input_ids", Tensor::from_i64(Shape::matrix(batch, width), &buffer)?)
                .with("attention_mask", Tensor::from_i64(Shape::matrix(batch, width), &mask)?);
            let positions: Vec<usize> = cursor.iter().map(|&c| c.saturating_sub(1)).collect();
            let next = self.next_tokens(&step_inputs, width, &positions)?;
            for (b, token) in next.into_iter().enumerate() {
                if finished[b] {
                    continue;
                }
                if Some(token) == params.eos_token_id {
                    finished[b] = true;
                    continue;
                }
                buffer[b * width + cursor[b]] = token;
                generated[b].push(token);
                cursor[b] += 1;
                finished[b] = cursor[b] >= width;
            }
        }
        Ok(generated)
    }

    /// Runs the decoder once and picks the argmax token at `positions[b]`
    /// of every row.
    fn next_tokens(
        &mut self,
        inputs: &ModelInputs,
        seq: usize,
        positions: &[usize],
    ) -> Result<Vec<i64>, PipelineError> {
        let outputs = self.run(SubExecutable::Decoder, inputs)?;
        let logits = outputs
            .get("logits")
            .ok_or_else(|| PipelineError::InvalidInput("decoder returned no logits".into()))?;
        let best = argmax_rows(logits)?;
        positions
            .iter()
            .enumerate()
            .map(|(b, &pos)| {
                best.get(b * seq + pos)
                    .map(|&t| t as i64)
                    .ok_or_else(|| {
                        PipelineError::InvalidInput(format!(
                            "decoder logits {} do not cover row {b}",
                            logits.shape()
                        ))
                    })
            })
            .collect()
    }

    /// Runs one sub-executable, recompiling its slot on a signature change.
    ///
    /// The decoder's signature also covers the encoder hidden state shape,
    /// which follows the encoder's input length.
    fn run(
        &mut self,
        which: SubExecutable,
        inputs: &ModelInputs,
    ) -> Result<ModelOutputs, PipelineError> {
        let mut signature = BatchSignature::of(inputs)
            .ok_or_else(|| PipelineError::InvalidInput("inputs contain no tensor".into()))?;
        if which == SubExecutable::Decoder {
            if let Some(hidden) = inputs.get_tensor(ENCODER_HIDDEN_STATES) {
                signature = signature.with_input(ENCODER_HIDDEN_STATES, hidden.shape());
            }
        }
        let sub = match which {
            SubExecutable::Encoder => self.encoder.as_mut().ok_or(PipelineError::NotBound)?,
            SubExecutable::Decoder => &mut self.decoder,
        };
        if sub.slot.evict_if_mismatched(&signature)? {
            debug!(sub = %which, %signature, "recompiling sub-executable");
        }
        let request = CompileRequest {
            program: &sub.program,
            signature: &signature,
            precision: self.precision,
            options: &self.options,
        };
        sub.slot.compile_if_needed(&self.runtime, &request)?;
        let exe = sub.slot.executable().ok_or(PipelineError::NotBound)?;
        Ok(exe.run(inputs)?)
    }
}
