// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The pipeline contract and the device-bound pipeline.
//!
//! ```text
//! DevicePipeline::call(input)
//!   │ preprocess          TaskPipeline     input  -> ModelInputs
//!   │ forward
//!   │   ├─ before_forward RecompilationController (evict on new signature)
//!   │   ├─ adapt          PrecisionAdapter        (f32 -> f16)
//!   │   └─ forward        TaskPipeline     ModelInputs -> ModelOutputs
//!   │ postprocess         TaskPipeline     ModelOutputs -> PipelineOutput
//!   ▼
//! PipelineOutput
//! ```
//!
//! A [`DevicePipeline`] owns its [`ModelBinding`]. Dropping the pipeline
//! releases every executable through the [`LifecycleManager`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use device_runtime::Precision;
use model_hub::{FeatureExtractor, ModelConfig, PretrainedModel, Tokenizer};
use tensor_core::{ModelInputs, ModelOutputs};
use tracing::{debug, warn};

use crate::binding::ModelBinding;
use crate::{
    encode_texts, CallParams, DisposalReport, EncodedBatch, LifecycleManager, PipelineError,
    PipelineKind, PipelineMetrics, PrecisionAdapter, RecompilationController, RecompileDecision,
};

// ── Inputs and outputs ─────────────────────────────────────────────────────

/// A request to a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineInput {
    /// One or more texts, processed as one batch.
    Text(Vec<String>),
    /// An extractive question over a context passage.
    Question { question: String, context: String },
    /// A text scored against candidate labels.
    ZeroShot {
        sequence: String,
        candidate_labels: Vec<String>,
        /// Hypothesis with a `{}` placeholder for the label.
        hypothesis_template: Option<String>,
    },
    /// Raw waveforms, one per batch row.
    Audio(Vec<Vec<f32>>),
    /// Flattened pixel values, one image per batch row.
    Image(Vec<Vec<f32>>),
}

impl PipelineInput {
    pub fn text(text: impl Into<String>) -> Self {
        PipelineInput::Text(vec![text.into()])
    }

    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipelineInput::Text(texts.into_iter().map(Into::into).collect())
    }

    pub fn question(question: impl Into<String>, context: impl Into<String>) -> Self {
        PipelineInput::Question {
            question: question.into(),
            context: context.into(),
        }
    }

    pub fn zero_shot<I, S>(sequence: impl Into<String>, candidate_labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipelineInput::ZeroShot {
            sequence: sequence.into(),
            candidate_labels: candidate_labels.into_iter().map(Into::into).collect(),
            hypothesis_template: None,
        }
    }

    /// `"text"`, `"question"`, `"zero-shot"`, `"audio"` or `"image"`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PipelineInput::Text(_) => "text",
            PipelineInput::Question { .. } => "question",
            PipelineInput::ZeroShot { .. } => "zero-shot",
            PipelineInput::Audio(_) => "audio",
            PipelineInput::Image(_) => "image",
        }
    }

    /// Error for an input a pipeline kind does not accept.
    pub fn unsupported(&self, kind: PipelineKind) -> PipelineError {
        PipelineError::InvalidInput(format!(
            "{} pipelines do not accept {} input",
            kind.as_str(),
            self.kind_name()
        ))
    }
}

/// A label with its probability.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// A tagged input token.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TokenLabel {
    /// Position in the encoded sequence.
    pub index: usize,
    pub token: String,
    pub label: String,
    pub score: f32,
}

/// One candidate for a masked position.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MaskFill {
    pub token: i64,
    pub token_str: String,
    pub score: f32,
    /// The input with the mask replaced.
    pub sequence: String,
}

/// An extracted answer span; `start` and `end` index context tokens.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Answer {
    pub answer: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// The result of a pipeline call, one entry per batch row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutput {
    /// Labels sorted by descending score.
    Labels(Vec<Vec<LabelScore>>),
    Tokens(Vec<Vec<TokenLabel>>),
    MaskFills(Vec<Vec<MaskFill>>),
    Answer(Answer),
    /// Transcriptions.
    Text(Vec<String>),
    /// Generated texts under their task key (`generated_text`, ...).
    Generated { key: String, texts: Vec<String> },
}

impl PipelineOutput {
    /// One line per batch row.
    pub fn summary(&self) -> String {
        let rows: Vec<String> = match self {
            PipelineOutput::Labels(rows) => rows
                .iter()
                .map(|r| match r.first() {
                    Some(top) => format!("{} ({:.3})", top.label, top.score),
                    None => "-".into(),
                })
                .collect(),
            PipelineOutput::Tokens(rows) => rows
                .iter()
                .map(|r| {
                    r.iter()
                        .map(|t| format!("{}:{}", t.token, t.label))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect(),
            PipelineOutput::MaskFills(rows) => rows
                .iter()
                .map(|r| match r.first() {
                    Some(top) => format!("{} ({:.3})", top.sequence, top.score),
                    None => "-".into(),
                })
                .collect(),
            PipelineOutput::Answer(a) => vec![format!("{:?} ({:.3})", a.answer, a.score)],
            PipelineOutput::Text(texts) => texts.clone(),
            PipelineOutput::Generated { key, texts } => {
                texts.iter().map(|t| format!("{key}: {t}")).collect()
            }
        };
        rows.join("\n")
    }
}

// ── Task contract ──────────────────────────────────────────────────────────

/// Collaborators and parameters visible to a task during one call.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub tokenizer: Option<&'a dyn Tokenizer>,
    pub feature_extractor: Option<&'a dyn FeatureExtractor>,
    pub params: &'a CallParams,
    pub config: &'a ModelConfig,
}

impl<'a> PipelineContext<'a> {
    pub fn tokenizer(&self) -> Result<&'a dyn Tokenizer, PipelineError> {
        self.tokenizer
            .ok_or_else(|| PipelineError::InvalidInput("pipeline has no tokenizer".into()))
    }

    pub fn feature_extractor(&self) -> Result<&'a dyn FeatureExtractor, PipelineError> {
        self.feature_extractor
            .ok_or_else(|| PipelineError::InvalidInput("pipeline has no feature extractor".into()))
    }

    /// Encodes texts with the pipeline's padding and truncation.
    pub fn encode(&self, texts: &[String]) -> Result<EncodedBatch, PipelineError> {
        encode_texts(
            self.tokenizer()?,
            texts,
            self.params.padding.unwrap_or_default(),
            self.params.max_length,
            self.params.truncation.unwrap_or_default(),
        )
    }
}

impl fmt::Debug for PipelineContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("tokenizer", &self.tokenizer.map(|t| t.name()))
            .field("feature_extractor", &self.feature_extractor.map(|e| e.name()))
            .field("params", self.params)
            .finish()
    }
}

/// The host side of a pipeline: turns requests into model inputs and
/// model outputs into results.
pub trait TaskPipeline: Send + fmt::Debug {
    fn kind(&self) -> PipelineKind;

    fn preprocess(
        &self,
        input: &PipelineInput,
        ctx: &PipelineContext<'_>,
    ) -> Result<ModelInputs, PipelineError>;

    /// Runs the model; the default dispatches on the binding.
    fn forward(
        &self,
        binding: &mut ModelBinding,
        inputs: ModelInputs,
        _params: &CallParams,
    ) -> Result<ModelOutputs, PipelineError> {
        binding.forward(inputs)
    }

    fn postprocess(
        &self,
        input: &PipelineInput,
        outputs: ModelOutputs,
        ctx: &PipelineContext<'_>,
    ) -> Result<PipelineOutput, PipelineError>;
}

// ── Device pipeline ────────────────────────────────────────────────────────

/// Everything a [`DevicePipeline`] is assembled from.
#[derive(Debug)]
pub(crate) struct PipelineParts {
    pub task: String,
    pub binding: ModelBinding,
    pub implementation: Box<dyn TaskPipeline>,
    pub generation_task: bool,
    pub precision: Precision,
    pub tokenizer: Option<Arc<dyn Tokenizer>>,
    pub feature_extractor: Option<Arc<dyn FeatureExtractor>>,
    pub params: CallParams,
}

/// A task pipeline bound to an accelerator.
#[derive(Debug)]
pub struct DevicePipeline {
    task: String,
    binding: ModelBinding,
    implementation: Box<dyn TaskPipeline>,
    controller: RecompilationController,
    adapter: PrecisionAdapter,
    lifecycle: LifecycleManager,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    feature_extractor: Option<Arc<dyn FeatureExtractor>>,
    params: CallParams,
    metrics: PipelineMetrics,
    disposed: bool,
}

impl DevicePipeline {
    pub(crate) fn new(parts: PipelineParts) -> Self {
        Self {
            task: parts.task,
            binding: parts.binding,
            implementation: parts.implementation,
            controller: RecompilationController::new(parts.generation_task),
            adapter: PrecisionAdapter::new(parts.precision),
            lifecycle: LifecycleManager::new(),
            tokenizer: parts.tokenizer,
            feature_extractor: parts.feature_extractor,
            params: parts.params,
            metrics: PipelineMetrics::new(),
            disposed: false,
        }
    }

    /// The task as requested, after alias resolution.
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn kind(&self) -> PipelineKind {
        self.implementation.kind()
    }

    pub fn binding(&self) -> &ModelBinding {
        &self.binding
    }

    pub fn model(&self) -> &PretrainedModel {
        self.binding.model()
    }

    pub fn precision(&self) -> Precision {
        self.adapter.precision()
    }

    pub fn tokenizer(&self) -> Option<&Arc<dyn Tokenizer>> {
        self.tokenizer.as_ref()
    }

    pub fn feature_extractor(&self) -> Option<&Arc<dyn FeatureExtractor>> {
        self.feature_extractor.as_ref()
    }

    pub fn params(&self) -> &CallParams {
        &self.params
    }

    /// Replaces the call parameters used by later calls.
    pub fn set_params(&mut self, params: CallParams) {
        self.params = params;
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Successful compilations across all executables of the binding.
    pub fn compile_count(&self) -> u64 {
        self.binding.compile_count()
    }

    /// Runs one request end to end.
    pub fn call(&mut self, input: PipelineInput) -> Result<PipelineOutput, PipelineError> {
        self.ensure_live()?;
        let start = Instant::now();
        let inputs = self.implementation.preprocess(&input, &self.context())?;
        let preprocess = start.elapsed();

        let outputs = self.forward(inputs)?;

        let start = Instant::now();
        let output = self.implementation.postprocess(&input, outputs, &self.context())?;
        self.metrics.record_call(preprocess, start.elapsed());
        Ok(output)
    }

    /// Runs the model on prepared inputs.
    ///
    /// The recompilation check runs first, then the precision cast, then
    /// the task's forward.
    pub fn forward(&mut self, mut inputs: ModelInputs) -> Result<ModelOutputs, PipelineError> {
        self.ensure_live()?;
        let decision = self.controller.before_forward(&mut self.binding, &inputs)?;
        self.metrics.record_decision(&decision);
        if let RecompileDecision::Evicted { previous, next } = &decision {
            debug!(task = %self.task, %previous, %next, "recompiling for new batch signature");
        }
        let cast = self.adapter.adapt(&self.binding, &mut inputs)?;
        self.metrics.record_cast(cast);

        let start = Instant::now();
        let outputs = self
            .implementation
            .forward(&mut self.binding, inputs, &self.params)?;
        self.metrics.record_forward(start.elapsed());
        Ok(outputs)
    }

    /// Releases every device executable. Later calls fail with `Disposed`.
    ///
    /// Disposing an already disposed pipeline does nothing.
    pub fn dispose(&mut self) -> Result<DisposalReport, PipelineError> {
        if self.disposed {
            return Ok(DisposalReport::default());
        }
        self.disposed = true;
        self.lifecycle.dispose(&mut self.binding)
    }

    fn ensure_live(&self) -> Result<(), PipelineError> {
        if self.disposed {
            Err(PipelineError::Disposed)
        } else {
            Ok(())
        }
    }

    fn context(&self) -> PipelineContext<'_> {
        PipelineContext {
            tokenizer: self.tokenizer.as_deref(),
            feature_extractor: self.feature_extractor.as_deref(),
            params: &self.params,
            config: self.binding.model().config(),
        }
    }
}

impl Drop for DevicePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!(task = %self.task, error = %e, "failed to release device executables");
        }
    }
}
