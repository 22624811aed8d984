// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model loading and layout construction.

/// Errors that can occur when loading or describing models.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A model configuration file could not be read.
    #[error("failed to read model config: {0}")]
    ConfigReadError(#[from] std::io::Error),

    /// A model configuration is malformed JSON.
    #[error("failed to parse model config: {0}")]
    ConfigParseError(#[from] serde_json::Error),

    /// No model with this id (and revision) is available.
    #[error("model '{id}' not found{}", at_revision(.revision))]
    NotFound { id: String, revision: Option<String> },

    /// The configuration is internally inconsistent.
    #[error("invalid config for '{model}': {detail}")]
    InvalidConfig { model: String, detail: String },

    /// A layer definition is invalid.
    #[error("invalid layer '{layer}': {detail}")]
    InvalidLayer { layer: String, detail: String },

    /// No tokenizer or feature extractor can be provided for a model.
    #[error("no {kind} available for model '{model}'")]
    PreprocessorUnavailable { kind: &'static str, model: String },
}

fn at_revision(revision: &Option<String>) -> String {
    revision
        .as_deref()
        .map(|r| format!(" at revision '{r}'"))
        .unwrap_or_default()
}
