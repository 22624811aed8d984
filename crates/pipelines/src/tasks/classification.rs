// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sequence-level classification.

use model_hub::ModelConfig;
use tensor_core::{softmax_rows, ModelInputs, ModelOutputs};

use super::{feature_batch, logits, ranked_labels, softmax};
use crate::{
    pad_batch, LabelScore, PipelineContext, PipelineError, PipelineInput, PipelineKind,
    PipelineOutput, TaskPipeline,
};

/// Text, audio or image classification: one label distribution per row.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    kind: PipelineKind,
}

impl Classification {
    pub fn new(kind: PipelineKind) -> Self {
        Self { kind }
    }
}

impl TaskPipeline for Classification {
    fn kind(&self) -> PipelineKind {
        self.kind
    }

    fn preprocess(
        &self,
        input: &PipelineInput,
        ctx: &PipelineContext<'_>,
    ) -> Result<ModelInputs, PipelineError> {
        match (self.kind, input) {
            (PipelineKind::TextClassification, PipelineInput::Text(texts)) => {
                Ok(ctx.encode(texts)?.into_inputs())
            }
            (PipelineKind::AudioClassification, PipelineInput::Audio(waves)) => {
                feature_batch(ctx.feature_extractor()?, "input_values", waves)
            }
            (PipelineKind::ImageClassification, PipelineInput::Image(images)) => {
                feature_batch(ctx.feature_extractor()?, "pixel_values", images)
            }
            (kind, other) => Err(other.unsupported(kind)),
        }
    }

    fn postprocess(
        &self,
        _input: &PipelineInput,
        outputs: ModelOutputs,
        ctx: &PipelineContext<'_>,
    ) -> Result<PipelineOutput, PipelineError> {
        let rows = softmax_rows(logits(&outputs)?)?;
        Ok(PipelineOutput::Labels(
            rows.iter().map(|probs| ranked_labels(probs, ctx.config)).collect(),
        ))
    }
}

/// Natural-language-inference classification against free labels.
///
/// Every candidate label becomes one `(sequence, hypothesis)` row, so the
/// batch size follows the number of labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroShot;

impl ZeroShot {
    pub const DEFAULT_TEMPLATE: &'static str = "This example is {}.";

    pub fn new() -> Self {
        Self
    }
}

/// Index of the `entailment` class, else the last class.
fn entailment_index(config: &ModelConfig) -> usize {
    config
        .id2label
        .iter()
        .find(|(_, label)| label.to_lowercase().starts_with("entail"))
        .map(|(&i, _)| i)
        .unwrap_or(config.num_labels() - 1)
}

impl TaskPipeline for ZeroShot {
    fn kind(&self) -> PipelineKind {
        PipelineKind::ZeroShotClassification
    }

    fn preprocess(
        &self,
        input: &PipelineInput,
        ctx: &PipelineContext<'_>,
    ) -> Result<ModelInputs, PipelineError> {
        let PipelineInput::ZeroShot {
            sequence,
            candidate_labels,
            hypothesis_template,
        } = input
        else {
            return Err(input.unsupported(self.kind()));
        };
        if candidate_labels.is_empty() {
            return Err(PipelineError::InvalidInput(
                "zero-shot classification needs at least one candidate label".into(),
            ));
        }
        let template = hypothesis_template.as_deref().unwrap_or(Self::DEFAULT_TEMPLATE);
        if !template.contains("{}") {
            return Err(PipelineError::InvalidInput(format!(
                "hypothesis template {template:?} has no {{}} placeholder"
            )));
        }

        let tokenizer = ctx.tokenizer()?;
        let premise = tokenizer.encode(sequence);
        let separator = tokenizer.eos_token_id();
        let rows = candidate_labels
            .iter()
            .map(|label| {
                let mut ids = premise.clone();
                ids.extend(separator);
                ids.extend(tokenizer.encode(&template.replacen("{}", label, 1)));
                ids
            })
            .collect();
        Ok(pad_batch(
            tokenizer,
            rows,
            ctx.params.padding.unwrap_or_default(),
            ctx.params.max_length,
            ctx.params.truncation.unwrap_or_default(),
        )?
        .into_inputs())
    }

    fn postprocess(
        &self,
        input: &PipelineInput,
        outputs: ModelOutputs,
        ctx: &PipelineContext<'_>,
    ) -> Result<PipelineOutput, PipelineError> {
        let PipelineInput::ZeroShot {
            candidate_labels, ..
        } = input
        else {
            return Err(input.unsupported(self.kind()));
        };
        let logits = logits(&outputs)?;
        let width = logits.shape().dims().last().copied().unwrap_or(0);
        let entail = entailment_index(ctx.config);
        if entail >= width {
            return Err(PipelineError::InvalidInput(format!(
                "entailment index {entail} outside logits {}",
                logits.shape()
            )));
        }
        let values = logits.to_f32_vec()?;
        let entailment: Vec<f32> = values.chunks(width).map(|row| row[entail]).collect();
        let scores = softmax(&entailment);

        let mut labels: Vec<LabelScore> = candidate_labels
            .iter()
            .zip(scores)
            .map(|(label, score)| LabelScore {
                label: label.clone(),
                score,
            })
            .collect();
        labels.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(PipelineOutput::Labels(vec![labels]))
    }
}
