// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Text generation, summarization, translation and text-to-text.

use tensor_core::{ModelInputs, ModelOutputs};

use crate::binding::{GenerationParams, ModelBinding};
use crate::{
    encode_texts, CallParams, Padding, PipelineContext, PipelineError, PipelineInput,
    PipelineKind, PipelineOutput, TaskPipeline, Truncation,
};

/// Greedy generation through a [`GenerativeModel`](crate::binding::GenerativeModel).
///
/// `max_length` from the call parameters bounds the generated tokens
/// (seq2seq) or the full sequence (decoder-only); `max_input_length`
/// bounds the encoder input.
#[derive(Debug, Clone)]
pub struct Generation {
    kind: PipelineKind,
    /// `(source, target)` of a `translation_xx_to_yy` task.
    languages: Option<(String, String)>,
}

impl Generation {
    pub fn new(kind: PipelineKind, languages: Option<(String, String)>) -> Self {
        Self { kind, languages }
    }

    /// Key of the generated texts in the output.
    pub fn output_key(&self) -> &'static str {
        match self.kind {
            PipelineKind::Summarization => "summary_text",
            PipelineKind::Translation => "translation_text",
            _ => "generated_text",
        }
    }

    fn is_decoder_only(&self) -> bool {
        self.kind == PipelineKind::TextGeneration
    }

    /// The text the model sees for one request.
    fn model_text(&self, text: &str) -> String {
        match &self.languages {
            Some((src, tgt)) if self.kind == PipelineKind::Translation => {
                format!("translate {src} to {tgt}: {text}")
            }
            _ => text.to_string(),
        }
    }
}

impl TaskPipeline for Generation {
    fn kind(&self) -> PipelineKind {
        self.kind
    }

    fn preprocess(
        &self,
        input: &PipelineInput,
        ctx: &PipelineContext<'_>,
    ) -> Result<ModelInputs, PipelineError> {
        let PipelineInput::Text(texts) = input else {
            return Err(input.unsupported(self.kind));
        };
        let texts: Vec<String> = texts.iter().map(|t| self.model_text(t)).collect();
        let tokenizer = ctx.tokenizer()?;
        let encoded = if self.is_decoder_only() {
            encode_texts(tokenizer, &texts, Padding::Longest, None, Truncation::DoNotTruncate)?
        } else {
            let padding = match (ctx.params.padding, ctx.params.max_input_length) {
                (Some(padding), _) => padding,
                (None, Some(_)) => Padding::MaxLength,
                (None, None) => Padding::default(),
            };
            encode_texts(
                tokenizer,
                &texts,
                padding,
                ctx.params.max_input_length,
                ctx.params.truncation.unwrap_or_default(),
            )?
        };
        Ok(encoded.into_inputs())
    }

    fn forward(
        &self,
        binding: &mut ModelBinding,
        inputs: ModelInputs,
        params: &CallParams,
    ) -> Result<ModelOutputs, PipelineError> {
        match binding {
            ModelBinding::Generative(model) => {
                let mut generation = GenerationParams::from_config(model.model().config());
                if let Some(max_length) = params.max_length {
                    generation = generation.with_max_length(max_length);
                }
                model.generate(&inputs, &generation)
            }
            ModelBinding::Raw(_) => Err(PipelineError::NotBound),
            ModelBinding::Bound(_) => Err(PipelineError::InvalidInput(format!(
                "{} needs a generative binding",
                self.kind
            ))),
        }
    }

    fn postprocess(
        &self,
        input: &PipelineInput,
        outputs: ModelOutputs,
        ctx: &PipelineContext<'_>,
    ) -> Result<PipelineOutput, PipelineError> {
        let PipelineInput::Text(prompts) = input else {
            return Err(input.unsupported(self.kind));
        };
        let tokenizer = ctx.tokenizer()?;
        let missing =
            |name: &str| PipelineError::InvalidInput(format!("generation returned no {name}"));
        let sequences = outputs.get("sequences").ok_or_else(|| missing("sequences"))?;
        let lengths = outputs.get("lengths").ok_or_else(|| missing("lengths"))?.to_i64_vec()?;
        let width = sequences.shape().dim(1).unwrap_or(0);
        let ids = sequences.to_i64_vec()?;

        let texts = prompts
            .iter()
            .zip(&lengths)
            .enumerate()
            .map(|(b, (prompt, &len))| {
                let row = &ids[b * width..b * width + (len.max(0) as usize).min(width)];
                let generated = tokenizer.decode(row);
                if self.is_decoder_only() {
                    format!("{prompt}{generated}")
                } else {
                    generated
                }
            })
            .collect();
        Ok(PipelineOutput::Generated {
            key: self.output_key().to_string(),
            texts,
        })
    }
}
