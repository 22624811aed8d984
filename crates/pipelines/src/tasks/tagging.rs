// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-token heads: token classification, fill-mask and extractive
//! question answering.
//!
//! All three read `logits` of shape `[batch, seq, width]` and map rows back
//! to input tokens by re-encoding the request.

use model_hub::Tokenizer;
use tensor_core::{softmax_rows, ModelInputs, ModelOutputs, Tensor};

use super::{logits, softmax};
use crate::{
    pad_batch, Answer, MaskFill, PipelineContext, PipelineError, PipelineInput, PipelineKind,
    PipelineOutput, TaskPipeline, TokenLabel,
};

/// `(batch, seq, width)` of a per-token output.
fn per_token_dims(t: &Tensor) -> Result<(usize, usize, usize), PipelineError> {
    match *t.shape().dims() {
        [b, s, w] => Ok((b, s, w)),
        _ => Err(PipelineError::InvalidInput(format!(
            "expected [batch, seq, width] logits, got {}",
            t.shape()
        ))),
    }
}

// ── Token classification ───────────────────────────────────────────────────

/// Tags every input token; tokens labelled `O` are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenTagging;

impl TokenTagging {
    pub const OUTSIDE: &'static str = "O";

    pub fn new() -> Self {
        Self
    }
}

impl TaskPipeline for TokenTagging {
    fn kind(&self) -> PipelineKind {
        PipelineKind::TokenClassification
    }

    fn preprocess(
        &self,
        input: &PipelineInput,
        ctx: &PipelineContext<'_>,
    ) -> Result<ModelInputs, PipelineError> {
        match input {
            PipelineInput::Text(texts) => Ok(ctx.encode(texts)?.into_inputs()),
            other => Err(other.unsupported(self.kind())),
        }
    }

    fn postprocess(
        &self,
        input: &PipelineInput,
        outputs: ModelOutputs,
        ctx: &PipelineContext<'_>,
    ) -> Result<PipelineOutput, PipelineError> {
        let PipelineInput::Text(texts) = input else {
            return Err(input.unsupported(self.kind()));
        };
        let tokenizer = ctx.tokenizer()?;
        let encoded = ctx.encode(texts)?;
        let ids = encoded.input_ids.to_i64_vec()?;
        let width = encoded.input_ids.shape().dim(1).unwrap_or(0);
        let logits = logits(&outputs)?;
        let (_, seq, _) = per_token_dims(logits)?;
        let probs = softmax_rows(logits)?;

        let mut rows = Vec::with_capacity(texts.len());
        for (b, &len) in encoded.lengths.iter().enumerate() {
            let mut tokens = Vec::new();
            for pos in 0..len.min(seq).min(width) {
                let row = &probs[b * seq + pos];
                let (best, score) = row.iter().copied().enumerate().fold(
                    (0, f32::NEG_INFINITY),
                    |acc, (i, p)| if p > acc.1 { (i, p) } else { acc },
                );
                let label = ctx.config.label(best);
                if label == Self::OUTSIDE {
                    continue;
                }
                tokens.push(TokenLabel {
                    index: pos,
                    token: tokenizer.decode(&ids[b * width + pos..b * width + pos + 1]),
                    label,
                    score,
                });
            }
            rows.push(tokens);
        }
        Ok(PipelineOutput::Tokens(rows))
    }
}

// ── Fill-mask ──────────────────────────────────────────────────────────────

/// Predicts the token behind a single `<mask>` marker per text.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillMask;

impl FillMask {
    pub const MASK_MARKER: &'static str = "<mask>";
    pub const TOP_K: usize = 5;

    pub fn new() -> Self {
        Self
    }

    /// Token ids with the mask id in place of the marker, and its position.
    fn encode_masked(
        tokenizer: &dyn Tokenizer,
        text: &str,
    ) -> Result<(Vec<i64>, usize), PipelineError> {
        let mask = tokenizer.mask_token_id().ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "tokenizer '{}' has no mask token",
                tokenizer.name()
            ))
        })?;
        let parts: Vec<&str> = text.split(Self::MASK_MARKER).collect();
        let [before, after] = parts.as_slice() else {
            return Err(PipelineError::InvalidInput(format!(
                "expected exactly one {} in {text:?}",
                Self::MASK_MARKER
            )));
        };
        let mut ids = tokenizer.encode(before);
        let position = ids.len();
        ids.push(mask);
        ids.extend(tokenizer.encode(after));
        Ok((ids, position))
    }
}

impl TaskPipeline for FillMask {
    fn kind(&self) -> PipelineKind {
        PipelineKind::FillMask
    }

    fn preprocess(
        &self,
        input: &PipelineInput,
        ctx: &PipelineContext<'_>,
    ) -> Result<ModelInputs, PipelineError> {
        let PipelineInput::Text(texts) = input else {
            return Err(input.unsupported(self.kind()));
        };
        let tokenizer = ctx.tokenizer()?;
        let rows = texts
            .iter()
            .map(|t| Self::encode_masked(tokenizer, t).map(|(ids, _)| ids))
            .collect::<Result<Vec<_>, _>>()?;
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
        let PipelineInput::Text(texts) = input else {
            return Err(input.unsupported(self.kind()));
        };
        let tokenizer = ctx.tokenizer()?;
        let logits = logits(&outputs)?;
        let (_, seq, _) = per_token_dims(logits)?;
        let probs = softmax_rows(logits)?;

        let mut rows = Vec::with_capacity(texts.len());
        for (b, text) in texts.iter().enumerate() {
            let (_, position) = Self::encode_masked(tokenizer, text)?;
            if position >= seq {
                return Err(PipelineError::InvalidInput(format!(
                    "mask at position {position} was truncated (sequence length {seq})"
                )));
            }
            let row = &probs[b * seq + position];
            let mut ranked: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            let fills = ranked
                .into_iter()
                .take(Self::TOP_K)
                .map(|(token, score)| {
                    let token = token as i64;
                    let token_str = tokenizer.decode(&[token]);
                    MaskFill {
                        token,
                        sequence: text.replacen(Self::MASK_MARKER, &token_str, 1),
                        token_str,
                        score,
                    }
                })
                .collect();
            rows.push(fills);
        }
        Ok(PipelineOutput::MaskFills(rows))
    }
}

// ── Question answering ─────────────────────────────────────────────────────

/// Extractive question answering over `question <eos> context`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionAnswering;

impl QuestionAnswering {
    /// Longest answer span, in tokens.
    pub const MAX_ANSWER_LEN: usize = 15;

    pub fn new() -> Self {
        Self
    }

    /// Encoded pair and the offset of the context.
    fn encode_pair(tokenizer: &dyn Tokenizer, question: &str, context: &str) -> (Vec<i64>, usize) {
        let mut ids = tokenizer.encode(question);
        ids.extend(tokenizer.eos_token_id());
        let offset = ids.len();
        ids.extend(tokenizer.encode(context));
        (ids, offset)
    }
}

impl TaskPipeline for QuestionAnswering {
    fn kind(&self) -> PipelineKind {
        PipelineKind::QuestionAnswering
    }

    fn preprocess(
        &self,
        input: &PipelineInput,
        ctx: &PipelineContext<'_>,
    ) -> Result<ModelInputs, PipelineError> {
        let PipelineInput::Question { question, context } = input else {
            return Err(input.unsupported(self.kind()));
        };
        let tokenizer = ctx.tokenizer()?;
        let (ids, _) = Self::encode_pair(tokenizer, question, context);
        Ok(pad_batch(
            tokenizer,
            vec![ids],
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
        let PipelineInput::Question { question, context } = input else {
            return Err(input.unsupported(self.kind()));
        };
        let tokenizer = ctx.tokenizer()?;
        let (ids, offset) = Self::encode_pair(tokenizer, question, context);
        let logits = logits(&outputs)?;
        let (_, seq, width) = per_token_dims(logits)?;
        if width != 2 {
            return Err(PipelineError::InvalidInput(format!(
                "expected start/end logits, got {}",
                logits.shape()
            )));
        }
        let end_of_context = ids.len().min(seq);
        if offset >= end_of_context {
            return Err(PipelineError::InvalidInput(
                "context was truncated away; raise max_length".into(),
            ));
        }

        let values = logits.to_f32_vec()?;
        let span = offset..end_of_context;
        let start_probs = softmax(&span.clone().map(|i| values[i * 2]).collect::<Vec<_>>());
        let end_probs = softmax(&span.clone().map(|i| values[i * 2 + 1]).collect::<Vec<_>>());

        let mut best = (0, 0, f32::NEG_INFINITY);
        for (s, &ps) in start_probs.iter().enumerate() {
            let last = (s + Self::MAX_ANSWER_LEN).min(end_probs.len());
            for (e, &pe) in end_probs.iter().enumerate().take(last).skip(s) {
                if ps * pe > best.2 {
                    best = (s, e, ps * pe);
                }
            }
        }
        let (start, end, score) = best;
        Ok(PipelineOutput::Answer(Answer {
            answer: tokenizer.decode(&ids[offset + start..=offset + end]),
            start,
            end: end + 1,
            score,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallParams, Padding};
    use model_hub::{ByteTokenizer, ModelConfig};
    use tensor_core::Shape;

    fn config() -> ModelConfig {
        ModelConfig::from_json(
            r#"{"model_type": "bert", "num_hidden_layers": 1, "hidden_size": 4,
                "vocab_size": 260, "id2label": {"0": "O", "1": "B-PER"}}"#,
        )
        .unwrap()
    }

    fn ctx<'a>(
        tok: &'a ByteTokenizer,
        params: &'a CallParams,
        cfg: &'a ModelConfig,
    ) -> PipelineContext<'a> {
        PipelineContext {
            tokenizer: Some(tok),
            feature_extractor: None,
            params,
            config: cfg,
        }
    }

    #[test]
    fn test_token_tagging_skips_outside() {
        let tok = ByteTokenizer::new("t");
        let params = CallParams::default();
        let cfg = config();
        let input = PipelineInput::text("ab");
        // position 0 -> B-PER, position 1 -> O
        let logits = Tensor::from_f32(Shape::new(vec![1, 2, 2]), &[0.0, 5.0, 5.0, 0.0]).unwrap();
        let out = TokenTagging::new()
            .postprocess(
                &input,
                ModelOutputs::new().with("logits", logits),
                &ctx(&tok, &params, &cfg),
            )
            .unwrap();
        let PipelineOutput::Tokens(rows) = out else {
            panic!("expected tokens");
        };
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0][0].token, "a");
        assert_eq!(rows[0][0].label, "B-PER");
    }

    #[test]
    fn test_fill_mask_encodes_single_marker() {
        let tok = ByteTokenizer::new("t");
        let (ids, pos) = FillMask::encode_masked(&tok, "a<mask>b").unwrap();
        assert_eq!(pos, 1);
        assert_eq!(ids[1], ByteTokenizer::MASK);
        assert_eq!(ids.len(), 3);
        assert!(FillMask::encode_masked(&tok, "no marker").is_err());
        assert!(FillMask::encode_masked(&tok, "<mask><mask>").is_err());
    }

    #[test]
    fn test_fill_mask_top_k() {
        let tok = ByteTokenizer::new("t");
        let params = CallParams::default();
        let cfg = config();
        let input = PipelineInput::text("<mask>!");
        let vocab = ByteTokenizer::VOCAB_SIZE;
        let mut values = vec![0.0f32; 2 * vocab];
        values[(b'A' as usize) + 4] = 9.0;
        let logits = Tensor::from_f32(Shape::new(vec![1, 2, vocab]), &values).unwrap();
        let out = FillMask::new()
            .postprocess(
                &input,
                ModelOutputs::new().with("logits", logits),
                &ctx(&tok, &params, &cfg),
            )
            .unwrap();
        let PipelineOutput::MaskFills(rows) = out else {
            panic!("expected mask fills");
        };
        assert_eq!(rows[0].len(), FillMask::TOP_K);
        assert_eq!(rows[0][0].token_str, "A");
        assert_eq!(rows[0][0].sequence, "A!");
    }

    #[test]
    fn test_question_answering_pads_and_extracts() {
        let tok = ByteTokenizer::new("t");
        let params = CallParams {
            padding: Some(Padding::MaxLength),
            max_length: Some(16),
            ..CallParams::default()
        };
        let cfg = config();
        let input = PipelineInput::question("q", "xyz");
        let inputs = QuestionAnswering::new()
            .preprocess(&input, &ctx(&tok, &params, &cfg))
            .unwrap();
        assert_eq!(inputs.get_tensor("input_ids").unwrap().shape().dims(), &[1, 16]);

        // context starts at offset 2; best start at "y", best end at "z"
        let mut values = vec![0.0f32; 16 * 2];
        values[3 * 2] = 5.0;
        values[4 * 2 + 1] = 5.0;
        let logits = Tensor::from_f32(Shape::new(vec![1, 16, 2]), &values).unwrap();
        let out = QuestionAnswering::new()
            .postprocess(
                &input,
                ModelOutputs::new().with("logits", logits),
                &ctx(&tok, &params, &cfg),
            )
            .unwrap();
        let PipelineOutput::Answer(answer) = out else {
            panic!("expected an answer");
        };
        assert_eq!(answer.answer, "yz");
        assert_eq!((answer.start, answer.end), (1, 3));
    }
}
