// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Args;
use device_runtime::SimulatedDevice;
use model_hub::{BuiltinPreprocessors, LocalModelSource, ModelSource};
use pipelines::{
    CallParams, Collaborators, DeviceConfigArg, ModelTypeCheck, PipelineBuilder, PipelineInput,
    PipelineKind, TaskRegistry,
};
use tracing::info;

use crate::config::CliConfig;
use crate::demo;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Task name or alias (inferred from the model when omitted).
    #[arg(short, long)]
    pub task: Option<String>,

    /// Model id.
    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(long)]
    pub revision: Option<String>,

    /// Preset name, or a JSON object of device config keys.
    #[arg(short, long)]
    pub device_config: Option<String>,

    /// Input text, or comma-separated samples for audio and image tasks.
    /// Repeat for a batch.
    #[arg(short, long = "input")]
    pub inputs: Vec<String>,

    #[arg(long)]
    pub question: Option<String>,

    #[arg(long)]
    pub context: Option<String>,

    /// Candidate labels for zero-shot classification.
    #[arg(long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Hypothesis template for zero-shot classification, with `{}`.
    #[arg(long)]
    pub template: Option<String>,

    #[arg(long)]
    pub max_length: Option<usize>,

    /// Run in f32 even when the config enables fp16.
    #[arg(long)]
    pub full_precision: bool,

    /// Reject models whose type the task does not list.
    #[arg(long)]
    pub strict: bool,

    /// Number of times to run the input.
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,

    /// Print outputs as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn execute(config: &CliConfig, args: RunArgs) -> anyhow::Result<()> {
    let registry = TaskRegistry::builtin();
    let device = Arc::new(SimulatedDevice::new(config.devices, config.budget()?));
    let models: Arc<dyn ModelSource> = match &config.models_dir {
        Some(dir) => Arc::new(LocalModelSource::new(dir)),
        None => Arc::new(demo::catalogue(&registry)?),
    };
    let collaborators = Collaborators::new(
        models,
        Arc::new(BuiltinPreprocessors::new()),
        device.clone(),
    )
    .with_presets(config.presets());

    let mut builder = PipelineBuilder::new(&registry, collaborators)
        .fp16(config.fp16 && !args.full_precision);
    if let Some(task) = &args.task {
        builder = builder.task(task.as_str());
    }
    if let Some(model) = &args.model {
        builder = builder.model(model.as_str());
    }
    if let Some(revision) = &args.revision {
        builder = builder.revision(revision.as_str());
    }
    if let Some(device_config) = &args.device_config {
        builder = builder.device_config(parse_device_config(device_config)?);
    }
    if args.max_length.is_some() {
        builder = builder.params(CallParams {
            max_length: args.max_length,
            ..CallParams::default()
        });
    }
    if args.strict {
        builder = builder.model_type_check(ModelTypeCheck::Strict);
    }
    let mut pipeline = builder.build()?;
    let input = build_input(pipeline.kind(), &args)?;

    println!("╔══════════════════════════════════════════╗");
    println!("║           Pipeline Run                   ║");
    println!("╚══════════════════════════════════════════╝");
    println!();
    println!("  Task:      {} ({})", pipeline.task(), pipeline.kind());
    println!("  Model:     {}", pipeline.model().id());
    println!("  Precision: {:?}", pipeline.precision());
    println!();

    for i in 0..args.repeat.max(1) {
        let output = pipeline.call(input.clone())?;
        info!(iteration = i, "call done");
        if i + 1 == args.repeat.max(1) {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", output.summary());
            }
        }
    }

    println!();
    println!("  {}", pipeline.metrics().summary());
    println!("  {}", device.stats().summary());

    let report = pipeline.dispose()?;
    println!(
        "  Released {} executable(s) {:?}",
        report.destroyed_count(),
        report.destroyed
    );
    Ok(())
}

fn parse_device_config(arg: &str) -> anyhow::Result<DeviceConfigArg> {
    if arg.trim_start().starts_with('{') {
        let mapping: serde_json::Value =
            serde_json::from_str(arg).context("device config is not valid JSON")?;
        Ok(DeviceConfigArg::Mapping(mapping))
    } else {
        Ok(DeviceConfigArg::Preset(arg.to_string()))
    }
}

/// Builds the request for `kind` from the arguments, falling back to a
/// sample input when none is given.
fn build_input(kind: PipelineKind, args: &RunArgs) -> anyhow::Result<PipelineInput> {
    match kind {
        PipelineKind::QuestionAnswering => match (&args.question, &args.context) {
            (Some(question), Some(context)) => {
                Ok(PipelineInput::question(question.as_str(), context.as_str()))
            }
            (None, None) if args.inputs.is_empty() => Ok(sample_input(kind)),
            _ => bail!("question answering needs both --question and --context"),
        },
        PipelineKind::ZeroShotClassification => {
            if args.inputs.is_empty() && args.labels.is_empty() {
                return Ok(sample_input(kind));
            }
            let Some(sequence) = args.inputs.first() else {
                bail!("zero-shot classification needs an --input");
            };
            if args.labels.is_empty() {
                bail!("zero-shot classification needs --labels");
            }
            Ok(PipelineInput::ZeroShot {
                sequence: sequence.clone(),
                candidate_labels: args.labels.clone(),
                hypothesis_template: args.template.clone(),
            })
        }
        PipelineKind::AudioClassification | PipelineKind::SpeechRecognition => {
            if args.inputs.is_empty() {
                return Ok(sample_input(kind));
            }
            Ok(PipelineInput::Audio(parse_rows(&args.inputs)?))
        }
        PipelineKind::ImageClassification => {
            if args.inputs.is_empty() {
                return Ok(sample_input(kind));
            }
            Ok(PipelineInput::Image(parse_rows(&args.inputs)?))
        }
        _ if args.inputs.is_empty() => Ok(sample_input(kind)),
        _ => Ok(PipelineInput::Text(args.inputs.clone())),
    }
}

fn parse_rows(inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
    inputs
        .iter()
        .map(|row| {
            row.split(',')
                .map(|v| {
                    v.trim()
                        .parse::<f32>()
                        .with_context(|| format!("'{v}' is not a number"))
                })
                .collect()
        })
        .collect()
}

/// A request every pipeline of `kind` accepts.
pub fn sample_input(kind: PipelineKind) -> PipelineInput {
    match kind {
        PipelineKind::TextClassification => {
            PipelineInput::texts(["I love this accelerator", "The build failed again"])
        }
        PipelineKind::ZeroShotClassification => PipelineInput::zero_shot(
            "The new phone has a great camera",
            ["technology", "sports", "cooking"],
        ),
        PipelineKind::TokenClassification => PipelineInput::text("Ada Lovelace lived in London"),
        PipelineKind::FillMask => PipelineInput::text("Paris is the <mask> of France."),
        PipelineKind::QuestionAnswering => {
            PipelineInput::question("Where does Ada live?", "Ada lives in London.")
        }
        PipelineKind::AudioClassification | PipelineKind::SpeechRecognition => {
            let wave = (0..32).map(|i| (i as f32 * 0.4).sin()).collect();
            PipelineInput::Audio(vec![wave])
        }
        PipelineKind::ImageClassification => {
            let pixels = (0..48).map(|i| i as f32 / 48.0).collect();
            PipelineInput::Image(vec![pixels])
        }
        PipelineKind::TextGeneration => PipelineInput::text("Once upon a time"),
        PipelineKind::Summarization => PipelineInput::text(
            "The accelerator compiles one executable per input shape. \
             Changing the batch size forces a recompilation.",
        ),
        PipelineKind::Translation => PipelineInput::text("How old are you?"),
        PipelineKind::Text2TextGeneration => {
            PipelineInput::text("question: what does the compiler cache?")
        }
    }
}
