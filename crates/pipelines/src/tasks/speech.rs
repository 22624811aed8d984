// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CTC speech recognition.

use tensor_core::{argmax_rows, ModelInputs, ModelOutputs};

use super::{feature_batch, logits};
use crate::{
    PipelineContext, PipelineError, PipelineInput, PipelineKind, PipelineOutput, TaskPipeline,
};

/// Greedy CTC decoding: argmax per frame, collapse repeats, drop blanks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeechRecognition;

impl SpeechRecognition {
    pub fn new() -> Self {
        Self
    }
}

/// Collapses repeated ids and removes `blank`.
pub(crate) fn ctc_collapse(frames: &[i64], blank: i64) -> Vec<i64> {
    let mut out = Vec::new();
    let mut previous = None;
    for &id in frames {
        if previous != Some(id) && id != blank {
            out.push(id);
        }
        previous = Some(id);
    }
    out
}

impl TaskPipeline for SpeechRecognition {
    fn kind(&self) -> PipelineKind {
        PipelineKind::SpeechRecognition
    }

    fn preprocess(
        &self,
        input: &PipelineInput,
        ctx: &PipelineContext<'_>,
    ) -> Result<ModelInputs, PipelineError> {
        match input {
            PipelineInput::Audio(waves) => {
                feature_batch(ctx.feature_extractor()?, "input_values", waves)
            }
            other => Err(other.unsupported(self.kind())),
        }
    }

    fn postprocess(
        &self,
        input: &PipelineInput,
        outputs: ModelOutputs,
        ctx: &PipelineContext<'_>,
    ) -> Result<PipelineOutput, PipelineError> {
        let PipelineInput::Audio(waves) = input else {
            return Err(input.unsupported(self.kind()));
        };
        let tokenizer = ctx.tokenizer()?;
        let logits = logits(&outputs)?;
        let frames = match *logits.shape().dims() {
            [_, frames, _] => frames,
            _ => {
                return Err(PipelineError::InvalidInput(format!(
                    "expected [batch, frames, vocab] logits, got {}",
                    logits.shape()
                )))
            }
        };
        let blank = ctx
            .config
            .pad_token_id
            .or(tokenizer.pad_token_id())
            .unwrap_or(0);
        let best: Vec<i64> = argmax_rows(logits)?.into_iter().map(|i| i as i64).collect();

        let texts = waves
            .iter()
            .zip(best.chunks(frames.max(1)))
            .map(|(wave, row)| {
                let row = &row[..wave.len().min(row.len())];
                tokenizer.decode(&ctc_collapse(row, blank))
            })
            .collect();
        Ok(PipelineOutput::Text(texts))
    }
}
