// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Where pretrained models come from.
//!
//! A [`ModelSource`] resolves a model id (and optional revision) into a
//! [`PretrainedModel`] and can report the task a model was published for.
//!
//! # On-disk Layout ([`LocalModelSource`])
//! ```text
//! <root>/<model-id>/config.json              default revision
//! <root>/<model-id>/<revision>/config.json   pinned revision
//! ```
//! Model ids may contain `/` (e.g. `superb/hubert-base-superb-ks`); they map
//! to nested directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::{ModelConfig, ModelError, PretrainedModel};

/// Config filename inside a model directory.
const CONFIG_FILE: &str = "config.json";

/// A source of pretrained models.
pub trait ModelSource: Send + Sync {
    /// Loads a model by id, optionally pinned to a revision.
    fn from_pretrained(&self, id: &str, revision: Option<&str>)
        -> Result<PretrainedModel, ModelError>;

    /// The task tag a model was published for, if any.
    fn pipeline_tag(&self, id: &str) -> Result<Option<String>, ModelError>;
}

/// Reads model configurations from a directory tree.
#[derive(Debug, Clone)]
pub struct LocalModelSource {
    root: PathBuf,
}

impl LocalModelSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn config_path(&self, id: &str, revision: Option<&str>) -> Result<PathBuf, ModelError> {
        let model_dir = self.root.join(id);
        let path = match revision {
            Some(rev) => model_dir.join(rev).join(CONFIG_FILE),
            None => model_dir.join(CONFIG_FILE),
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(ModelError::NotFound {
                id: id.to_string(),
                revision: revision.map(str::to_string),
            })
        }
    }

    fn load_config(&self, id: &str, revision: Option<&str>) -> Result<ModelConfig, ModelError> {
        let path = self.config_path(id, revision)?;
        debug!(model = id, path = %path.display(), "reading model config");
        ModelConfig::from_file(&path)
    }
}

impl ModelSource for LocalModelSource {
    fn from_pretrained(
        &self,
        id: &str,
        revision: Option<&str>,
    ) -> Result<PretrainedModel, ModelError> {
        let config = self.load_config(id, revision)?;
        PretrainedModel::from_config(id, revision.map(str::to_string), config)
    }

    fn pipeline_tag(&self, id: &str) -> Result<Option<String>, ModelError> {
        Ok(self.load_config(id, None)?.pipeline_tag)
    }
}

/// An in-memory model catalogue, used by the CLI demo and by tests.
///
/// Revisions are accepted for any registered model; every request is
/// logged so callers can check which id and revision were asked for.
#[derive(Debug, Default)]
pub struct InMemoryModelSource {
    models: HashMap<String, ModelConfig>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl InMemoryModelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model configuration under `id`.
    pub fn with_model(mut self, id: impl Into<String>, config: ModelConfig) -> Self {
        self.models.insert(id.into(), config);
        self
    }

    /// Registered ids, sorted.
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// `(id, revision)` pairs passed to `from_pretrained`, oldest first.
    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn config(&self, id: &str, revision: Option<&str>) -> Result<&ModelConfig, ModelError> {
        self.models.get(id).ok_or_else(|| ModelError::NotFound {
            id: id.to_string(),
            revision: revision.map(str::to_string),
        })
    }
}

impl ModelSource for InMemoryModelSource {
    fn from_pretrained(
        &self,
        id: &str,
        revision: Option<&str>,
    ) -> Result<PretrainedModel, ModelError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id.to_string(), revision.map(str::to_string)));
        let config = self.config(id, revision)?.clone();
        PretrainedModel::from_config(id, revision.map(str::to_string), config)
    }

    fn pipeline_tag(&self, id: &str) -> Result<Option<String>, ModelError> {
        Ok(self.config(id, None)?.pipeline_tag.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CONFIG: &str = r#"{
        "model_type": "wav2vec2",
        "architectures": ["Wav2Vec2ForCTC"],
        "num_hidden_layers": 2,
        "hidden_size": 8,
        "vocab_size": 32,
        "pipeline_tag": "automatic-speech-recognition"
    }"#;

    #[test]
    fn test_local_source_reads_nested_ids() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("facebook/wav2vec2-base-960h");
        fs::create_dir_all(&model_dir).unwrap();
        fs::write(model_dir.join(CONFIG_FILE), CONFIG).unwrap();

        let source = LocalModelSource::new(dir.path());
        let model = source
            .from_pretrained("facebook/wav2vec2-base-960h", None)
            .unwrap();
        assert_eq!(model.model_type(), "wav2vec2");
        assert_eq!(
            source.pipeline_tag("facebook/wav2vec2-base-960h").unwrap().as_deref(),
            Some("automatic-speech-recognition")
        );
    }

    #[test]
    fn test_local_source_revision_directory() {
        let dir = tempfile::tempdir().unwrap();
        let rev_dir = dir.path().join("m").join("55bb623");
        fs::create_dir_all(&rev_dir).unwrap();
        fs::write(rev_dir.join(CONFIG_FILE), CONFIG).unwrap();

        let source = LocalModelSource::new(dir.path());
        let model = source.from_pretrained("m", Some("55bb623")).unwrap();
        assert_eq!(model.revision(), Some("55bb623"));
        assert!(matches!(
            source.from_pretrained("m", Some("other")),
            Err(ModelError::NotFound { .. })
        ));
    }

    #[test]
    fn test_local_source_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("m")).unwrap();
        fs::write(dir.path().join("m").join(CONFIG_FILE), "{ not json").unwrap();
        let source = LocalModelSource::new(dir.path());
        assert!(matches!(
            source.from_pretrained("m", None),
            Err(ModelError::ConfigParseError(_))
        ));
    }

    #[test]
    fn test_in_memory_source_logs_requests() {
        let source = InMemoryModelSource::new()
            .with_model("m", ModelConfig::from_json(CONFIG).unwrap());
        source.from_pretrained("m", Some("abc")).unwrap();
        assert!(source.from_pretrained("missing", None).is_err());
        assert_eq!(
            source.requests(),
            vec![
                ("m".to_string(), Some("abc".to_string())),
                ("missing".to_string(), None)
            ]
        );
        assert_eq!(source.model_ids(), vec!["m"]);
    }
}
