// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # pipelines
//!
//! Task pipelines (task + model + tokenizer or feature extractor) running on
//! a fixed-shape accelerator that compiles one executable per input batch
//! shape and precision.
//!
//! The pieces, in the order a call meets them:
//! - [`TaskRegistry`]: what each task needs and its defaults.
//! - [`PipelineBuilder`]: resolves task, model, device config and
//!   preprocessors, then binds the model with a
//!   [`DeviceBinder`](binding::DeviceBinder).
//! - [`DevicePipeline`]: preprocess, forward, postprocess. Every forward
//!   first goes through the [`RecompilationController`] (evict on a new
//!   batch shape) and the [`PrecisionAdapter`] (cast `f32` inputs to `f16`).
//! - [`LifecycleManager`]: releases every executable exactly once when the
//!   pipeline is disposed or dropped.
//!
//! # Binding Life Cycle
//! ```text
//!            first call            same shape
//! Uncompiled ──────────► Compiled ◄──────────┐
//!     ▲                   │    └─────────────┘
//!     │ dispose           │ new shape: destroy, then compile
//!     └────────────────── ▼
//!                        Stale ──► Compiled (same call)
//! ```
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use device_runtime::{MemoryBudget, SimulatedDevice};
//! use model_hub::{BuiltinPreprocessors, LocalModelSource};
//! use pipelines::{Collaborators, PipelineBuilder, PipelineInput, TaskRegistry};
//!
//! let registry = TaskRegistry::builtin();
//! let collaborators = Collaborators::new(
//!     Arc::new(LocalModelSource::new("./models")),
//!     Arc::new(BuiltinPreprocessors::new()),
//!     Arc::new(SimulatedDevice::new(4, MemoryBudget::from_mb(512))),
//! );
//! let mut pipeline = PipelineBuilder::new(&registry, collaborators)
//!     .task("sentiment-analysis")
//!     .build()
//!     .unwrap();
//! let output = pipeline.call(PipelineInput::text("what a day")).unwrap();
//! println!("{}", output.summary());
//! ```

pub mod binding;
mod config;
mod error;
mod factory;
mod lifecycle;
mod metrics;
mod params;
mod pipeline;
mod precision;
mod recompile;
mod registry;
pub mod tasks;

pub use binding::ModelBinding;
pub use config::{DeviceConfig, DeviceConfigArg, PresetStore};
pub use error::PipelineError;
pub use factory::{Collaborators, ModelArg, ModelTypeCheck, PipelineBuilder};
pub use lifecycle::{DisposalReport, LifecycleManager};
pub use metrics::PipelineMetrics;
pub use params::{encode_texts, pad_batch, CallParams, EncodedBatch, Padding, Truncation};
pub use pipeline::{
    Answer, DevicePipeline, LabelScore, MaskFill, PipelineContext, PipelineInput, PipelineOutput,
    TaskPipeline, TokenLabel,
};
pub use precision::PrecisionAdapter;
pub use recompile::{RecompilationController, RecompileDecision};
pub use registry::{
    GenerationKind, Modality, PipelineKind, ResolvedTask, TaskDescriptor, TaskRegistry,
    QA_MAX_SEQ_LEN,
};
