// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tokenizers, feature extractors and where to find them.
//!
//! Text models need a [`Tokenizer`], audio and image models a
//! [`FeatureExtractor`], multimodal models both. A [`PreprocessorSource`]
//! resolves either one by model id.

use std::fmt;
use std::sync::Arc;

use crate::ModelError;

// ── Tokenizers ─────────────────────────────────────────────────────────────

/// Converts text to token ids and back.
pub trait Tokenizer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Encodes text without special tokens or padding.
    fn encode(&self, text: &str) -> Vec<i64>;

    /// Decodes ids, skipping special tokens.
    fn decode(&self, ids: &[i64]) -> String;

    fn pad_token_id(&self) -> Option<i64>;

    fn eos_token_id(&self) -> Option<i64>;

    /// Placeholder id for masked-language-model inputs.
    fn mask_token_id(&self) -> Option<i64> {
        None
    }
}

/// Byte-level tokenizer: every UTF-8 byte is one token.
///
/// Ids `0..4` are reserved for pad, eos, unk and mask; byte `b` encodes as
/// `b + 4`.
#[derive(Debug, Clone)]
pub struct ByteTokenizer {
    name: String,
    has_pad: bool,
}

impl ByteTokenizer {
    pub const PAD: i64 = 0;
    pub const EOS: i64 = 1;
    pub const UNK: i64 = 2;
    pub const MASK: i64 = 3;
    const OFFSET: i64 = 4;
    pub const VOCAB_SIZE: usize = 256 + Self::OFFSET as usize;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_pad: true,
        }
    }

    /// A tokenizer that defines no pad token, like the GPT-2 tokenizer.
    pub fn without_pad(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_pad: false,
        }
    }
}

impl Tokenizer for ByteTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Vec<i64> {
        text.bytes().map(|b| i64::from(b) + Self::OFFSET).collect()
    }

    fn decode(&self, ids: &[i64]) -> String {
        let bytes: Vec<u8> = ids
            .iter()
            .filter_map(|&id| u8::try_from(id - Self::OFFSET).ok())
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn pad_token_id(&self) -> Option<i64> {
        self.has_pad.then_some(Self::PAD)
    }

    fn eos_token_id(&self) -> Option<i64> {
        Some(Self::EOS)
    }

    fn mask_token_id(&self) -> Option<i64> {
        Some(Self::MASK)
    }
}

/// Wraps a tokenizer and replaces its pad token.
#[derive(Debug, Clone)]
pub struct PadTokenOverride {
    inner: Arc<dyn Tokenizer>,
    pad_token_id: i64,
}

impl PadTokenOverride {
    pub fn new(inner: Arc<dyn Tokenizer>, pad_token_id: i64) -> Self {
        Self {
            inner,
            pad_token_id,
        }
    }
}

impl Tokenizer for PadTokenOverride {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn encode(&self, text: &str) -> Vec<i64> {
        self.inner.encode(text)
    }

    fn decode(&self, ids: &[i64]) -> String {
        self.inner.decode(ids)
    }

    fn pad_token_id(&self) -> Option<i64> {
        Some(self.pad_token_id)
    }

    fn eos_token_id(&self) -> Option<i64> {
        self.inner.eos_token_id()
    }

    fn mask_token_id(&self) -> Option<i64> {
        self.inner.mask_token_id()
    }
}

// ── Feature extractors ─────────────────────────────────────────────────────

/// Turns raw audio samples or pixel values into model features.
pub trait FeatureExtractor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn extract(&self, raw: &[f32]) -> Vec<f32>;

    /// Expected audio sampling rate in Hz.
    fn sampling_rate(&self) -> u32;
}

/// Normalises inputs to zero mean and unit variance.
#[derive(Debug, Clone)]
pub struct NormalizingFeatureExtractor {
    name: String,
    sampling_rate: u32,
}

impl NormalizingFeatureExtractor {
    pub const DEFAULT_SAMPLING_RATE: u32 = 16_000;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sampling_rate: Self::DEFAULT_SAMPLING_RATE,
        }
    }

    pub fn with_sampling_rate(mut self, hz: u32) -> Self {
        self.sampling_rate = hz;
        self
    }
}

impl FeatureExtractor for NormalizingFeatureExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, raw: &[f32]) -> Vec<f32> {
        if raw.is_empty() {
            return Vec::new();
        }
        let n = raw.len() as f32;
        let mean = raw.iter().sum::<f32>() / n;
        let var = raw.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
        let std = (var + 1e-7).sqrt();
        raw.iter().map(|x| (x - mean) / std).collect()
    }

    fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }
}

// ── Sources ────────────────────────────────────────────────────────────────

/// Resolves preprocessors by model id.
pub trait PreprocessorSource: Send + Sync {
    fn tokenizer(&self, model_id: &str) -> Result<Arc<dyn Tokenizer>, ModelError>;

    fn feature_extractor(&self, model_id: &str) -> Result<Arc<dyn FeatureExtractor>, ModelError>;
}

/// Serves a [`ByteTokenizer`] and a [`NormalizingFeatureExtractor`] for
/// every model id.
///
/// Ids starting with one of the configured prefixes (by default `gpt2`)
/// get a tokenizer without a pad token.
#[derive(Debug, Clone)]
pub struct BuiltinPreprocessors {
    padless_prefixes: Vec<String>,
}

impl Default for BuiltinPreprocessors {
    fn default() -> Self {
        Self {
            padless_prefixes: vec!["gpt2".into()],
        }
    }
}

impl BuiltinPreprocessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_padless_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.padless_prefixes.push(prefix.into());
        self
    }
}

impl PreprocessorSource for BuiltinPreprocessors {
    fn tokenizer(&self, model_id: &str) -> Result<Arc<dyn Tokenizer>, ModelError> {
        let padless = self
            .padless_prefixes
            .iter()
            .any(|p| model_id.starts_with(p.as_str()));
        Ok(if padless {
            Arc::new(ByteTokenizer::without_pad(model_id))
        } else {
            Arc::new(ByteTokenizer::new(model_id))
        })
    }

    fn feature_extractor(&self, model_id: &str) -> Result<Arc<dyn FeatureExtractor>, ModelError> {
        Ok(Arc::new(NormalizingFeatureExtractor::new(model_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_tokenizer_roundtrip_text() {
        let tok = ByteTokenizer::new("t");
        let ids = tok.encode("héllo");
        assert_eq!(ids.len(), "héllo".len());
        assert!(ids.iter().all(|&id| id >= 4));
        assert_eq!(tok.decode(&ids), "héllo");
    }

    #[test]
    fn test_decode_skips_special_tokens() {
        let tok = ByteTokenizer::new("t");
        let mut ids = tok.encode("ok");
        ids.push(ByteTokenizer::EOS);
        ids.push(ByteTokenizer::PAD);
        assert_eq!(tok.decode(&ids), "ok");
    }

    #[test]
    fn test_pad_override() {
        let base: Arc<dyn Tokenizer> = Arc::new(ByteTokenizer::without_pad("gpt2"));
        assert_eq!(base.pad_token_id(), None);
        let eos = base.eos_token_id().unwrap();
        let tok = PadTokenOverride::new(base, eos);
        assert_eq!(tok.pad_token_id(), Some(ByteTokenizer::EOS));
        assert_eq!(tok.name(), "gpt2");
    }

    #[test]
    fn test_feature_extractor_normalizes() {
        let fe = NormalizingFeatureExtractor::new("fe");
        let out = fe.extract(&[1.0, 2.0, 3.0, 4.0]);
        let mean: f32 = out.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!(fe.extract(&[]).is_empty());
        assert_eq!(fe.sampling_rate(), 16_000);
    }

    #[test]
    fn test_builtin_padless_prefix() {
        let src = BuiltinPreprocessors::new();
        assert_eq!(src.tokenizer("gpt2").unwrap().pad_token_id(), None);
        assert_eq!(
            src.tokenizer("distilbert-base-uncased").unwrap().pad_token_id(),
            Some(ByteTokenizer::PAD)
        );
    }
}
