// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-hub
//!
//! Everything the pipelines need to know about a model before it touches a
//! device:
//!
//! - [`ModelConfig`]: the parsed `config.json`, with the [`ModelClass`]
//!   (head) that decides which tasks the model can serve.
//! - [`PretrainedModel`]: configuration plus a layer layout
//!   ([`LayerDef`]) that the shard planner splits across devices.
//! - [`ModelSource`]: resolves model ids, with [`LocalModelSource`]
//!   (directory tree) and [`InMemoryModelSource`] implementations.
//! - [`Tokenizer`] / [`FeatureExtractor`] and the [`PreprocessorSource`]
//!   that provides them.
//!
//! # Example
//! ```no_run
//! use model_hub::{LocalModelSource, ModelSource};
//!
//! let source = LocalModelSource::new("./models");
//! let model = source.from_pretrained("distilbert-base-uncased", None).unwrap();
//! println!("{}", model.summary());
//! ```

mod config;
mod error;
mod layer;
mod model;
mod preprocess;
mod source;

pub use config::{ModelClass, ModelConfig};
pub use error::ModelError;
pub use layer::{Component, LayerDef, LayerType};
pub use model::PretrainedModel;
pub use preprocess::{
    BuiltinPreprocessors, ByteTokenizer, FeatureExtractor, NormalizingFeatureExtractor,
    PadTokenOverride, PreprocessorSource, Tokenizer,
};
pub use source::{InMemoryModelSource, LocalModelSource, ModelSource};
