// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model configuration parsing (`config.json`).
//!
//! # Format
//! ```json
//! {
//!   "model_type": "distilbert",
//!   "architectures": ["DistilBertForSequenceClassification"],
//!   "n_layers": 6,
//!   "dim": 768,
//!   "vocab_size": 30522,
//!   "id2label": { "0": "NEGATIVE", "1": "POSITIVE" },
//!   "pipeline_tag": "text-classification"
//! }
//! ```
//!
//! Common per-family key names (`n_embd`, `d_model`, `n_layer`,
//! `encoder_layers`, ...) are accepted as aliases.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::ModelError;

/// The head a model carries, which decides which tasks it can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    SequenceClassification,
    TokenClassification,
    QuestionAnswering,
    MaskedLm,
    CausalLm,
    Seq2SeqLm,
    AudioClassification,
    Ctc,
    ImageClassification,
}

impl ModelClass {
    /// Infers the class from an architecture name such as
    /// `"BertForSequenceClassification"`.
    pub fn from_architecture(arch: &str) -> Option<Self> {
        const SUFFIXES: &[(&str, ModelClass)] = &[
            ("ForSequenceClassification", ModelClass::SequenceClassification),
            ("ForTokenClassification", ModelClass::TokenClassification),
            ("ForQuestionAnswering", ModelClass::QuestionAnswering),
            ("ForMaskedLM", ModelClass::MaskedLm),
            ("ForCausalLM", ModelClass::CausalLm),
            ("LMHeadModel", ModelClass::CausalLm),
            ("ForConditionalGeneration", ModelClass::Seq2SeqLm),
            ("ForAudioClassification", ModelClass::AudioClassification),
            ("ForCTC", ModelClass::Ctc),
            ("ForImageClassification", ModelClass::ImageClassification),
        ];
        SUFFIXES
            .iter()
            .find(|(suffix, _)| arch.ends_with(suffix))
            .map(|(_, class)| *class)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SequenceClassification => "sequence_classification",
            Self::TokenClassification => "token_classification",
            Self::QuestionAnswering => "question_answering",
            Self::MaskedLm => "masked_lm",
            Self::CausalLm => "causal_lm",
            Self::Seq2SeqLm => "seq2seq_lm",
            Self::AudioClassification => "audio_classification",
            Self::Ctc => "ctc",
            Self::ImageClassification => "image_classification",
        }
    }

    /// `true` when the model emits one row per input token.
    pub fn is_per_token(self) -> bool {
        matches!(
            self,
            Self::TokenClassification | Self::QuestionAnswering | Self::MaskedLm | Self::Ctc
        )
    }
}

impl fmt::Display for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model's `config.json`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelConfig {
    /// Architecture family (e.g. `"bert"`, `"gpt2"`, `"t5"`).
    pub model_type: String,
    #[serde(default)]
    pub architectures: Vec<String>,
    /// Explicit head; inferred from `architectures` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_class: Option<ModelClass>,
    #[serde(default)]
    pub is_encoder_decoder: bool,
    #[serde(alias = "n_layer", alias = "n_layers", alias = "num_layers", alias = "encoder_layers")]
    pub num_hidden_layers: usize,
    #[serde(default, alias = "decoder_layers", skip_serializing_if = "Option::is_none")]
    pub num_decoder_layers: Option<usize>,
    #[serde(alias = "n_embd", alias = "d_model", alias = "dim")]
    pub hidden_size: usize,
    pub vocab_size: usize,
    #[serde(default)]
    pub id2label: BTreeMap<usize, String>,
    #[serde(default)]
    pub pad_token_id: Option<i64>,
    #[serde(default)]
    pub eos_token_id: Option<i64>,
    #[serde(default)]
    pub decoder_start_token_id: Option<i64>,
    #[serde(default = "default_max_positions", alias = "n_positions")]
    pub max_position_embeddings: usize,
    /// Task the model was published for, used for task inference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_tag: Option<String>,
}

fn default_max_positions() -> usize {
    512
}

impl ModelConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The model head: the explicit `model_class`, else the first
    /// recognised entry of `architectures`.
    pub fn class(&self) -> Option<ModelClass> {
        self.model_class.or_else(|| {
            self.architectures
                .iter()
                .find_map(|a| ModelClass::from_architecture(a))
        })
    }

    /// Number of decoder layers; equals the encoder depth when unspecified.
    pub fn decoder_layers(&self) -> usize {
        if self.is_encoder_decoder {
            self.num_decoder_layers.unwrap_or(self.num_hidden_layers)
        } else {
            0
        }
    }

    /// Number of labels of a classification head (at least 2).
    pub fn num_labels(&self) -> usize {
        self.id2label.len().max(2)
    }

    /// Label for a class index, falling back to `LABEL_<i>`.
    pub fn label(&self, index: usize) -> String {
        self.id2label
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{index}"))
    }

    /// Checks the fields the layout builder depends on.
    pub fn validate(&self, model: &str) -> Result<(), ModelError> {
        let invalid = |detail: &str| ModelError::InvalidConfig {
            model: model.to_string(),
            detail: detail.to_string(),
        };
        if self.num_hidden_layers == 0 {
            return Err(invalid("num_hidden_layers must be at least 1"));
        }
        if self.hidden_size == 0 {
            return Err(invalid("hidden_size must be at least 1"));
        }
        if self.vocab_size == 0 {
            return Err(invalid("vocab_size must be at least 1"));
        }
        if self.is_encoder_decoder && self.decoder_layers() == 0 {
            return Err(invalid("encoder-decoder model needs decoder layers"));
        }
        if self.class().is_none() {
            return Err(invalid(
                "cannot determine model class from model_class or architectures",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISTILBERT: &str = r#"{
        "model_type": "distilbert",
        "architectures": ["DistilBertForSequenceClassification"],
        "n_layers": 6,
        "dim": 768,
        "vocab_size": 30522,
        "id2label": {"0": "NEGATIVE", "1": "POSITIVE"},
        "pad_token_id": 0,
        "pipeline_tag": "text-classification"
    }"#;

    #[test]
    fn test_parse_with_aliases() {
        let cfg = ModelConfig::from_json(DISTILBERT).unwrap();
        assert_eq!(cfg.num_hidden_layers, 6);
        assert_eq!(cfg.hidden_size, 768);
        assert_eq!(cfg.max_position_embeddings, 512);
        assert_eq!(cfg.class(), Some(ModelClass::SequenceClassification));
        assert_eq!(cfg.label(1), "POSITIVE");
        assert_eq!(cfg.label(7), "LABEL_7");
        assert!(cfg.validate("distilbert").is_ok());
    }

    #[test]
    fn test_encoder_decoder_layers() {
        let cfg = ModelConfig::from_json(
            r#"{"model_type": "bart", "is_encoder_decoder": true,
                "architectures": ["BartForConditionalGeneration"],
                "encoder_layers": 6, "decoder_layers": 4,
                "d_model": 768, "vocab_size": 50265}"#,
        )
        .unwrap();
        assert_eq!(cfg.num_hidden_layers, 6);
        assert_eq!(cfg.decoder_layers(), 4);
        assert_eq!(cfg.class(), Some(ModelClass::Seq2SeqLm));
    }

    #[test]
    fn test_gpt2_lm_head() {
        assert_eq!(
            ModelClass::from_architecture("GPT2LMHeadModel"),
            Some(ModelClass::CausalLm)
        );
        assert_eq!(ModelClass::from_architecture("BertModel"), None);
    }

    #[test]
    fn test_validate_rejects_unknown_class() {
        let mut cfg = ModelConfig::from_json(DISTILBERT).unwrap();
        cfg.architectures.clear();
        assert!(matches!(
            cfg.validate("m"),
            Err(ModelError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_serde_roundtrip_keeps_labels() {
        let cfg = ModelConfig::from_json(DISTILBERT).unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        let back = ModelConfig::from_json(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
