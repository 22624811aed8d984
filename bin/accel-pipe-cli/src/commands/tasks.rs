// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use pipelines::TaskRegistry;

pub fn execute() -> anyhow::Result<()> {
    let registry = TaskRegistry::builtin();

    println!("╔══════════════════════════════════════════╗");
    println!("║           Supported Tasks                ║");
    println!("╚══════════════════════════════════════════╝");
    println!();

    for descriptor in registry.descriptors() {
        println!("  {}", descriptor.summary());
    }

    println!();
    println!("  Aliases:");
    for (alias, target) in registry.aliases() {
        println!("    {alias} -> {target}");
    }
    println!();
    println!("  Translation pairs: translation_<src>_to_<tgt>");

    Ok(())
}
