// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CLI configuration loaded from a TOML file.
//!
//! # TOML Format
//! ```toml
//! models_dir = "./models"
//! preset_dir = "./presets"
//! devices = 4
//! memory_per_device = "512M"
//! fp16 = true
//! ```
//!
//! Without `models_dir` the builtin demo catalogue is used.

use std::path::{Path, PathBuf};

use anyhow::Context;
use device_runtime::MemoryBudget;
use pipelines::PresetStore;

/// Settings shared by every subcommand.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Root of `<id>[/<revision>]/config.json` model directories.
    pub models_dir: Option<PathBuf>,
    /// Directory of `<name>.toml` device presets.
    pub preset_dir: Option<PathBuf>,
    /// Devices attached to the simulated accelerator.
    pub devices: usize,
    /// Memory per device (e.g. `"512M"`, `"2G"`).
    pub memory_per_device: String,
    pub fp16: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            models_dir: None,
            preset_dir: None,
            devices: 4,
            memory_per_device: "512M".into(),
            fp16: true,
        }
    }
}

impl CliConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("TOML parse error")
    }

    pub fn budget(&self) -> anyhow::Result<MemoryBudget> {
        MemoryBudget::parse(&self.memory_per_device)
            .map_err(|e| anyhow::anyhow!("invalid memory_per_device: {e}"))
    }

    /// Builtin presets, plus the preset directory when configured.
    pub fn presets(&self) -> PresetStore {
        let store = PresetStore::builtin();
        match &self.preset_dir {
            Some(dir) => store.with_dir(dir),
            None => store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.budget().unwrap(), MemoryBudget::from_mb(512));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accel-pipe.toml");
        std::fs::write(&path, "devices = 2\nmemory_per_device = \"1G\"\nfp16 = false\n").unwrap();
        let config = CliConfig::from_file(&path).unwrap();
        assert_eq!(config.devices, 2);
        assert!(!config.fp16);
        assert_eq!(config.budget().unwrap(), MemoryBudget::from_gb(1));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(CliConfig::from_toml("device = 2").is_err());
    }

    #[test]
    fn test_preset_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny.toml"), "devices_per_replica = 3\n").unwrap();
        let config = CliConfig {
            preset_dir: Some(dir.path().to_path_buf()),
            ..CliConfig::default()
        };
        assert_eq!(config.presets().get("tiny").unwrap().devices_per_replica, 3);
    }
}
