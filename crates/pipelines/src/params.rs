// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Call parameters and the text encoding they control.
//!
//! Fixed-shape executables recompile for every new input shape, so text
//! pipelines pad to a fixed `max_length` by default: every call then
//! produces the same signature.

use std::fmt;

use model_hub::Tokenizer;
use tensor_core::{ModelInputs, Shape, Tensor};

use crate::PipelineError;

/// How a batch of sequences is padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Pad to the longest sequence of the batch.
    #[default]
    Longest,
    /// Pad (and truncate) to `max_length`.
    MaxLength,
    /// Sequences must already have equal length.
    DoNotPad,
}

/// Which part of an input is cut when it exceeds the length limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    #[default]
    DoNotTruncate,
    /// Cut the longest sequence of a pair first.
    LongestFirst,
    /// Cut only the first sequence of a pair.
    OnlyFirst,
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Truncation::DoNotTruncate => "do_not_truncate",
            Truncation::LongestFirst => "longest_first",
            Truncation::OnlyFirst => "only_first",
        })
    }
}

/// Per-pipeline call parameters; `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallParams {
    pub padding: Option<Padding>,
    /// Padded length for encoders, generated length for generation tasks.
    pub max_length: Option<usize>,
    /// Input length limit of sequence-to-sequence generation.
    pub max_input_length: Option<usize>,
    pub truncation: Option<Truncation>,
}

/// An encoded text batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    /// `[batch, len]` token ids.
    pub input_ids: Tensor,
    /// `[batch, len]`, 1 for real tokens, 0 for padding.
    pub attention_mask: Tensor,
    /// Unpadded length of each sequence.
    pub lengths: Vec<usize>,
}

impl EncodedBatch {
    /// Model inputs with `input_ids` as the primary tensor.
    pub fn into_inputs(self) -> ModelInputs {
        ModelInputs::new()
            .with("input_ids", self.input_ids)
            .with("attention_mask", self.attention_mask)
    }
}

/// Pads and truncates pre-tokenized sequences into a rectangular batch.
///
/// Sequences are cut to `max_length` when truncation is enabled or when
/// padding to `max_length`. A tokenizer without a pad token can only
/// produce batches that need no padding.
pub fn pad_batch(
    tokenizer: &dyn Tokenizer,
    mut sequences: Vec<Vec<i64>>,
    padding: Padding,
    max_length: Option<usize>,
    truncation: Truncation,
) -> Result<EncodedBatch, PipelineError> {
    if sequences.is_empty() {
        return Err(PipelineError::InvalidInput("empty batch".into()));
    }
    if let Some(limit) = max_length {
        if truncation != Truncation::DoNotTruncate || padding == Padding::MaxLength {
            for seq in &mut sequences {
                seq.truncate(limit);
            }
        }
    }

    let lengths: Vec<usize> = sequences.iter().map(Vec::len).collect();
    let longest = lengths.iter().copied().max().unwrap_or(0);
    let target = match padding {
        Padding::MaxLength => max_length.unwrap_or(longest),
        Padding::Longest => longest,
        Padding::DoNotPad => {
            if lengths.iter().any(|&l| l != longest) {
                return Err(PipelineError::InvalidInput(
                    "sequences differ in length and padding is disabled".into(),
                ));
            }
            longest
        }
    }
    .max(1);

    let needs_pad = lengths.iter().any(|&l| l < target);
    let pad = match (tokenizer.pad_token_id(), needs_pad) {
        (Some(id), _) => id,
        (None, false) => 0,
        (None, true) => {
            return Err(PipelineError::InvalidInput(format!(
                "tokenizer '{}' has no pad token",
                tokenizer.name()
            )))
        }
    };

    let batch = sequences.len();
    let mut ids = Vec::with_capacity(batch * target);
    let mut mask = Vec::with_capacity(batch * target);
    for seq in &sequences {
        ids.extend_from_slice(seq);
        ids.extend(std::iter::repeat(pad).take(target - seq.len()));
        mask.extend(std::iter::repeat(1).take(seq.len()));
        mask.extend(std::iter::repeat(0).take(target - seq.len()));
    }
    Ok(EncodedBatch {
        input_ids: Tensor::from_i64(Shape::matrix(batch, target), &ids)?,
        attention_mask: Tensor::from_i64(Shape::matrix(batch, target), &mask)?,
        lengths,
    })
}

/// Tokenizes texts and pads them with [`pad_batch`].
pub fn encode_texts(
    tokenizer: &dyn Tokenizer,
    texts: &[String],
    padding: Padding,
    max_length: Option<usize>,
    truncation: Truncation,
) -> Result<EncodedBatch, PipelineError> {
    let sequences = texts.iter().map(|t| tokenizer.encode(t)).collect();
    pad_batch(tokenizer, sequences, padding, max_length, truncation)
}
