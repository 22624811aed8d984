// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Standard [`TaskPipeline`] implementations.
//!
//! | Kind | Implementation | Input | Output |
//! |---|---|---|---|
//! | text / audio / image classification | [`Classification`] | texts, waveforms, pixels | `Labels` |
//! | zero-shot classification | [`ZeroShot`] | sequence + labels | `Labels` |
//! | token classification | [`TokenTagging`] | texts | `Tokens` |
//! | fill-mask | [`FillMask`] | texts with `<mask>` | `MaskFills` |
//! | question answering | [`QuestionAnswering`] | question + context | `Answer` |
//! | speech recognition | [`SpeechRecognition`] | waveforms | `Text` |
//! | generation tasks | [`Generation`] | texts | `Generated` |

mod classification;
mod generation;
mod speech;
mod tagging;

pub use classification::{Classification, ZeroShot};
pub use generation::Generation;
pub use speech::SpeechRecognition;
pub use tagging::{FillMask, QuestionAnswering, TokenTagging};

use model_hub::{FeatureExtractor, ModelConfig};
use tensor_core::{ModelInputs, ModelOutputs, Shape, Tensor};

use crate::{LabelScore, PipelineError, PipelineKind, TaskPipeline};

/// The default implementation for a pipeline kind.
///
/// `languages` is the `(source, target)` pair of a `translation_xx_to_yy`
/// task.
pub fn build(kind: PipelineKind, languages: Option<(String, String)>) -> Box<dyn TaskPipeline> {
    match kind {
        PipelineKind::TextClassification
        | PipelineKind::AudioClassification
        | PipelineKind::ImageClassification => Box::new(Classification::new(kind)),
        PipelineKind::ZeroShotClassification => Box::new(ZeroShot::new()),
        PipelineKind::TokenClassification => Box::new(TokenTagging::new()),
        PipelineKind::FillMask => Box::new(FillMask::new()),
        PipelineKind::QuestionAnswering => Box::new(QuestionAnswering::new()),
        PipelineKind::SpeechRecognition => Box::new(SpeechRecognition::new()),
        PipelineKind::TextGeneration
        | PipelineKind::Summarization
        | PipelineKind::Translation
        | PipelineKind::Text2TextGeneration => Box::new(Generation::new(kind, languages)),
    }
}

// ── Shared helpers ─────────────────────────────────────────────────────────

pub(crate) fn logits(outputs: &ModelOutputs) -> Result<&Tensor, PipelineError> {
    outputs
        .get("logits")
        .ok_or_else(|| PipelineError::InvalidInput("model returned no logits".into()))
}

/// Extracts features from each row and zero-pads them into `name`
/// (`[batch, len]`, `F32`) plus an `attention_mask`.
pub(crate) fn feature_batch(
    extractor: &dyn FeatureExtractor,
    name: &str,
    rows: &[Vec<f32>],
) -> Result<ModelInputs, PipelineError> {
    if rows.is_empty() || rows.iter().all(Vec::is_empty) {
        return Err(PipelineError::InvalidInput("empty batch".into()));
    }
    let features: Vec<Vec<f32>> = rows.iter().map(|r| extractor.extract(r)).collect();
    let width = features.iter().map(Vec::len).max().unwrap_or(0);
    let batch = features.len();

    let mut values = Vec::with_capacity(batch * width);
    let mut mask = Vec::with_capacity(batch * width);
    for row in &features {
        values.extend_from_slice(row);
        values.extend(std::iter::repeat(0.0).take(width - row.len()));
        mask.extend(std::iter::repeat(1).take(row.len()));
        mask.extend(std::iter::repeat(0).take(width - row.len()));
    }
    Ok(ModelInputs::new()
        .with(name, Tensor::from_f32(Shape::matrix(batch, width), &values)?)
        .with("attention_mask", Tensor::from_i64(Shape::matrix(batch, width), &mask)?))
}

/// Labels of a probability row, highest first.
pub(crate) fn ranked_labels(probs: &[f32], config: &ModelConfig) -> Vec<LabelScore> {
    let mut labels: Vec<LabelScore> = probs
        .iter()
        .enumerate()
        .map(|(i, &score)| LabelScore {
            label: config.label(i),
            score,
        })
        .collect();
    labels.sort_by(|a, b| b.score.total_cmp(&a.score));
    labels
}

/// Softmax of a plain slice.
pub(crate) fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_hub::NormalizingFeatureExtractor;

    #[test]
    fn test_build_covers_every_kind() {
        let kinds = [
            PipelineKind::AudioClassification,
            PipelineKind::SpeechRecognition,
            PipelineKind::FillMask,
            PipelineKind::ImageClassification,
            PipelineKind::QuestionAnswering,
            PipelineKind::TextClassification,
            PipelineKind::TokenClassification,
            PipelineKind::TextGeneration,
            PipelineKind::Summarization,
            PipelineKind::Translation,
            PipelineKind::Text2TextGeneration,
            PipelineKind::ZeroShotClassification,
        ];
        for kind in kinds {
            assert_eq!(build(kind, None).kind(), kind);
        }
    }

    #[test]
    fn test_feature_batch_pads_rows() {
        let fe = NormalizingFeatureExtractor::new("fe");
        let inputs = feature_batch(&fe, "input_values", &[vec![1.0, 2.0, 3.0], vec![4.0]]).unwrap();
        let values = inputs.get_tensor("input_values").unwrap();
        assert_eq!(values.shape().dims(), &[2, 3]);
        assert_eq!(
            inputs.get_tensor("attention_mask").unwrap().to_i64_vec().unwrap(),
            vec![1, 1, 1, 1, 0, 0]
        );
        assert_eq!(inputs.primary_tensor().unwrap().0, "input_values");
    }

    #[test]
    fn test_ranked_labels() {
        let config = ModelConfig::from_json(
            r#"{"model_type": "bert", "num_hidden_layers": 1, "hidden_size": 4,
                "vocab_size": 8, "id2label": {"0": "NEG", "1": "POS"}}"#,
        )
        .unwrap();
        let labels = ranked_labels(&softmax(&[0.1, 0.9]), &config);
        assert_eq!(labels[0].label, "POS");
        assert!((labels[0].score + labels[1].score - 1.0).abs() < 1e-5);
    }
}
