// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use pipelines::{ResolvedTask, TaskRegistry};

use crate::config::CliConfig;

pub fn execute(config: &CliConfig, task: &str) -> anyhow::Result<()> {
    let registry = TaskRegistry::builtin();
    let resolved = registry.resolve(task)?;
    print!("{}", render(config, task, &resolved)?);
    Ok(())
}

/// The full description of a resolved task.
fn render(
    config: &CliConfig,
    requested: &str,
    resolved: &ResolvedTask<'_>,
) -> anyhow::Result<String> {
    let descriptor = resolved.descriptor;
    let device_config = descriptor.default_config.resolve(&config.presets())?;

    let mut out = String::new();
    out.push_str(&format!("Task:        {requested}\n"));
    if requested != descriptor.name {
        out.push_str(&format!("Registered:  {}\n", descriptor.name));
    }
    out.push_str(&format!("Pipeline:    {}\n", descriptor.kind));
    out.push_str(&format!(
        "Needs:       tokenizer {}, feature extractor {}\n",
        yes_no(descriptor.modality.requires_tokenizer()),
        yes_no(descriptor.modality.requires_feature_extractor()),
    ));
    out.push_str(&format!("Generation:  {:?}\n", descriptor.generation));
    if let Some((src, tgt)) = &resolved.languages {
        out.push_str(&format!("Languages:   {src} -> {tgt}\n"));
    }
    out.push_str(&format!(
        "Model:       {}@{}\n",
        descriptor.default_model, descriptor.default_revision
    ));
    out.push_str(&format!("Summary:     {}\n", descriptor.summary()));
    out.push_str(&format!(
        "Device:      {} -> {}\n\n",
        descriptor.default_config,
        device_config.summary()
    ));
    out.push_str(&device_config.to_toml()?);
    Ok(out)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
