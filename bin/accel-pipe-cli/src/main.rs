// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # accel-pipe
//!
//! Command-line driver for task pipelines on a simulated accelerator.
//!
//! ## Usage
//! ```bash
//! # List tasks and aliases
//! accel-pipe tasks
//!
//! # Show a task's defaults and resolved device config
//! accel-pipe describe ner
//!
//! # Run a pipeline on the builtin demo models
//! accel-pipe run --task sentiment-analysis --input "great film" --input "dull plot" --repeat 3
//!
//! # Question answering from models on disk
//! accel-pipe --config accel-pipe.toml run --task question-answering \
//!     --question "who?" --context "nobody knows"
//! ```

mod commands;
mod config;
mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::run::RunArgs;
use crate::config::CliConfig;

#[derive(Parser)]
#[command(
    name = "accel-pipe",
    about = "Task pipelines bound to a fixed-shape accelerator",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported tasks and aliases.
    Tasks,

    /// Show what a task needs and how it runs by default.
    Describe {
        /// Task name or alias.
        task: String,
    },

    /// Build a pipeline and run inputs through it.
    Run(RunArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };

    match cli.command {
        Commands::Tasks => commands::tasks::execute(),
        Commands::Describe { task } => commands::describe::execute(&config, &task),
        Commands::Run(args) => commands::run::execute(&config, args),
    }
}
