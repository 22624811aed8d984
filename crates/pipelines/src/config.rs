// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device configuration: how a model is mapped onto the accelerator.
//!
//! A [`DeviceConfig`] comes from one of three places, captured by
//! [`DeviceConfigArg`]:
//!
//! - a named preset resolved through a [`PresetStore`] (builtin presets,
//!   or `<preset_dir>/<name>.toml`);
//! - a JSON mapping with the same keys;
//! - an explicit [`DeviceConfig`] value.
//!
//! # TOML Format
//! ```toml
//! devices_per_replica = 2
//! layers_per_device = [4, -1]
//! replication_factor = 1
//! device_iterations = 1
//! enable_half_partials = true
//! execution_strategy = "sharded"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use device_runtime::{ExecutionOptions, ExecutionStrategy, Precision};
use tracing::debug;

use crate::PipelineError;

/// How a model is placed on the accelerator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Devices one model replica is sharded across.
    pub devices_per_replica: usize,
    /// Transformer blocks per device; `-1` fills the remainder. Empty
    /// means an even split.
    pub layers_per_device: Vec<i64>,
    pub replication_factor: usize,
    /// Batches processed per host call.
    pub device_iterations: usize,
    /// Accumulate matmul partials in half precision.
    pub enable_half_partials: bool,
    pub execution_strategy: ExecutionStrategy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            devices_per_replica: 1,
            layers_per_device: Vec::new(),
            replication_factor: 1,
            device_iterations: 1,
            enable_half_partials: true,
            execution_strategy: ExecutionStrategy::Sharded,
        }
    }
}

impl DeviceConfig {
    /// A config spanning `devices` devices with an even layer split.
    pub fn with_devices(devices: usize) -> Self {
        Self {
            devices_per_replica: devices,
            ..Self::default()
        }
    }

    /// Loads a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigResolution(format!(
                "cannot read device config '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| PipelineError::ConfigResolution(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from a JSON object; missing keys take defaults.
    pub fn from_mapping(mapping: &serde_json::Value) -> Result<Self, PipelineError> {
        if !mapping.is_object() {
            return Err(PipelineError::ConfigResolution(format!(
                "device config mapping must be an object, got {mapping}"
            )));
        }
        let config: Self = serde_json::from_value(mapping.clone())
            .map_err(|e| PipelineError::ConfigResolution(format!("invalid mapping: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises the config to TOML.
    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::ConfigResolution(format!("TOML serialise error: {e}")))
    }

    /// Rejects zero counts and layer counts below `-1`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |detail: String| Err(PipelineError::ConfigResolution(detail));
        if self.devices_per_replica == 0 {
            return invalid("devices_per_replica must be at least 1".into());
        }
        if self.replication_factor == 0 {
            return invalid("replication_factor must be at least 1".into());
        }
        if self.device_iterations == 0 {
            return invalid("device_iterations must be at least 1".into());
        }
        if let Some(bad) = self.layers_per_device.iter().find(|&&n| n < -1) {
            return invalid(format!("layers_per_device entry {bad} is below -1"));
        }
        Ok(())
    }

    /// Forces inference-safe values before binding.
    ///
    /// Device iterations and replication drop to 1, the strategy becomes
    /// sharded, and full precision disables half partials.
    pub fn prepare_for_inference(&mut self, precision: Precision) {
        self.device_iterations = 1;
        self.replication_factor = 1;
        if !precision.is_half() {
            self.enable_half_partials = false;
        }
        self.execution_strategy = ExecutionStrategy::Sharded;
    }

    /// Runtime options baked into each executable.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            strategy: self.execution_strategy,
            device_iterations: self.device_iterations,
            replication_factor: self.replication_factor,
            enable_half_partials: self.enable_half_partials,
        }
    }

    /// Returns a one-line description.
    pub fn summary(&self) -> String {
        let layout = if self.layers_per_device.is_empty() {
            "even".to_string()
        } else {
            format!("{:?}", self.layers_per_device)
        };
        format!(
            "{} device(s) per replica, layers {}, replication {}, iterations {}, half partials {}, {}",
            self.devices_per_replica,
            layout,
            self.replication_factor,
            self.device_iterations,
            if self.enable_half_partials { "on" } else { "off" },
            self.execution_strategy,
        )
    }
}

// ── Argument forms ─────────────────────────────────────────────────────────

/// A device configuration as supplied by a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceConfigArg {
    /// Name of a preset.
    Preset(String),
    /// A JSON object with [`DeviceConfig`] keys.
    Mapping(serde_json::Value),
    /// A ready config.
    Config(DeviceConfig),
}

impl DeviceConfigArg {
    /// Produces the concrete config.
    pub fn resolve(&self, presets: &PresetStore) -> Result<DeviceConfig, PipelineError> {
        match self {
            DeviceConfigArg::Preset(name) => presets.get(name),
            DeviceConfigArg::Mapping(mapping) => DeviceConfig::from_mapping(mapping),
            DeviceConfigArg::Config(config) => {
                config.validate()?;
                Ok(config.clone())
            }
        }
    }

    /// How the argument is named in error messages.
    pub fn label(&self) -> String {
        match self {
            DeviceConfigArg::Preset(name) => name.clone(),
            DeviceConfigArg::Mapping(mapping) => format!("mapping {mapping}"),
            DeviceConfigArg::Config(config) => format!("explicit ({})", config.summary()),
        }
    }
}

impl fmt::Display for DeviceConfigArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<&str> for DeviceConfigArg {
    fn from(name: &str) -> Self {
        DeviceConfigArg::Preset(name.to_string())
    }
}

impl From<String> for DeviceConfigArg {
    fn from(name: String) -> Self {
        DeviceConfigArg::Preset(name)
    }
}

impl From<serde_json::Value> for DeviceConfigArg {
    fn from(mapping: serde_json::Value) -> Self {
        DeviceConfigArg::Mapping(mapping)
    }
}

impl From<DeviceConfig> for DeviceConfigArg {
    fn from(config: DeviceConfig) -> Self {
        DeviceConfigArg::Config(config)
    }
}

// ── Presets ────────────────────────────────────────────────────────────────

/// Named device configurations.
///
/// Lookups try `<dir>/<name>.toml` first when a directory is set, then the
/// in-memory presets.
#[derive(Debug, Clone, Default)]
pub struct PresetStore {
    presets: BTreeMap<String, DeviceConfig>,
    dir: Option<PathBuf>,
}

impl PresetStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The presets referenced by the builtin task table.
    pub fn builtin() -> Self {
        let mut store = Self::new();
        for (name, devices) in [
            ("distilbert-base", 1),
            ("distilroberta-base", 1),
            ("bert-large", 2),
            ("roberta-large", 2),
            ("hubert-base", 1),
            ("wav2vec2-ctc-base", 2),
            ("vit-base", 1),
        ] {
            store = store.with_preset(name, DeviceConfig::with_devices(devices));
        }
        store
    }

    /// Adds or replaces a preset.
    pub fn with_preset(mut self, name: impl Into<String>, config: DeviceConfig) -> Self {
        self.presets.insert(name.into(), config);
        self
    }

    /// Also looks presets up as TOML files in `dir`.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Resolves a preset by name.
    pub fn get(&self, name: &str) -> Result<DeviceConfig, PipelineError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{name}.toml"));
            if path.is_file() {
                debug!(preset = name, path = %path.display(), "loading device preset");
                return DeviceConfig::from_file(&path);
            }
        }
        self.presets.get(name).cloned().ok_or_else(|| {
            PipelineError::ConfigResolution(format!(
                "unknown device preset '{name}'; known presets: {}",
                self.names().join(", ")
            ))
        })
    }

    /// Names of the in-memory presets, sorted.
    pub fn names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }
}
