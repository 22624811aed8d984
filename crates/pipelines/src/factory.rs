// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The pipeline factory.
//!
//! [`PipelineBuilder`] is the composition root: it resolves the task,
//! loads and binds the model, finds the tokenizer or feature extractor and
//! fills in the call parameters a fixed-shape device needs.
//!
//! # Build Steps
//! ```text
//! task / model id ──► TaskRegistry::resolve ──► DeviceConfigArg::resolve
//!                                                      │
//!        ModelSource::from_pretrained ──► DeviceBinder::bind
//!                                                      │
//!   PreprocessorSource ──► model-type check ──► default params ──► DevicePipeline
//! ```

use std::fmt;
use std::sync::Arc;

use device_runtime::{DeviceRuntime, Precision};
use model_hub::{
    FeatureExtractor, ModelSource, PadTokenOverride, PreprocessorSource, PretrainedModel,
    Tokenizer,
};
use tracing::{debug, info, warn};

use crate::binding::{DeviceBinder, InferenceExecutor, ModelBinding};
use crate::pipeline::PipelineParts;
use crate::{
    tasks, CallParams, DeviceConfigArg, DevicePipeline, Padding, PipelineError, PipelineKind,
    PresetStore, TaskDescriptor, TaskPipeline, TaskRegistry, QA_MAX_SEQ_LEN,
};

/// Model types that ship without a pad token.
const PADLESS_MODEL_TYPES: &[&str] = &["gpt2"];

/// How the model is supplied to the factory.
#[derive(Debug)]
pub enum ModelArg {
    /// A model id, loaded from the model source.
    Id(String),
    /// A loaded model that still has to be bound.
    Pretrained(PretrainedModel),
    /// A model already bound to a device.
    Bound(InferenceExecutor),
}

impl ModelArg {
    fn kind_name(&self) -> &'static str {
        match self {
            ModelArg::Id(_) => "model id",
            ModelArg::Pretrained(_) => "pretrained model",
            ModelArg::Bound(_) => "bound executor",
        }
    }
}

impl From<&str> for ModelArg {
    fn from(id: &str) -> Self {
        ModelArg::Id(id.to_string())
    }
}

impl From<String> for ModelArg {
    fn from(id: String) -> Self {
        ModelArg::Id(id)
    }
}

impl From<PretrainedModel> for ModelArg {
    fn from(model: PretrainedModel) -> Self {
        ModelArg::Pretrained(model)
    }
}

impl From<InferenceExecutor> for ModelArg {
    fn from(executor: InferenceExecutor) -> Self {
        ModelArg::Bound(executor)
    }
}

/// What happens when the model's head is not one the task lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTypeCheck {
    /// Log a warning and build anyway.
    #[default]
    Warn,
    /// Fail with [`PipelineError::ModelTypeMismatch`].
    Strict,
    Off,
}

/// The external services a pipeline is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub models: Arc<dyn ModelSource>,
    pub preprocessors: Arc<dyn PreprocessorSource>,
    pub runtime: Arc<dyn DeviceRuntime>,
    pub presets: PresetStore,
}

impl Collaborators {
    /// Uses the builtin device presets.
    pub fn new(
        models: Arc<dyn ModelSource>,
        preprocessors: Arc<dyn PreprocessorSource>,
        runtime: Arc<dyn DeviceRuntime>,
    ) -> Self {
        Self {
            models,
            preprocessors,
            runtime,
            presets: PresetStore::builtin(),
        }
    }

    pub fn with_presets(mut self, presets: PresetStore) -> Self {
        self.presets = presets;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("runtime", &self.runtime.name())
            .field("presets", &self.presets)
            .finish_non_exhaustive()
    }
}

/// Builds a [`DevicePipeline`].
///
/// Only a task or a model is required; everything else has defaults.
/// Precision defaults to half.
pub struct PipelineBuilder<'r> {
    registry: &'r TaskRegistry,
    collaborators: Collaborators,
    task: Option<String>,
    model: Option<ModelArg>,
    revision: Option<String>,
    device_config: Option<DeviceConfigArg>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    feature_extractor: Option<Arc<dyn FeatureExtractor>>,
    precision: Precision,
    implementation: Option<Box<dyn TaskPipeline>>,
    params: CallParams,
    type_check: ModelTypeCheck,
}

impl<'r> PipelineBuilder<'r> {
    pub fn new(registry: &'r TaskRegistry, collaborators: Collaborators) -> Self {
        Self {
            registry,
            collaborators,
            task: None,
            model: None,
            revision: None,
            device_config: None,
            tokenizer: None,
            feature_extractor: None,
            precision: Precision::Half,
            implementation: None,
            params: CallParams::default(),
            type_check: ModelTypeCheck::default(),
        }
    }

    /// Task name or alias; inferred from the model id when absent.
    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn model(mut self, model: impl Into<ModelArg>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Revision used when the model is given as an id.
    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn device_config(mut self, config: impl Into<DeviceConfigArg>) -> Self {
        self.device_config = Some(config.into());
        self
    }

    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn feature_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.feature_extractor = Some(extractor);
        self
    }

    pub fn fp16(self, fp16: bool) -> Self {
        self.precision(Precision::from_half_flag(fp16))
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Replaces the task's standard pipeline implementation.
    pub fn implementation(mut self, implementation: Box<dyn TaskPipeline>) -> Self {
        self.implementation = Some(implementation);
        self
    }

    /// Explicit call parameters; unset fields get the task defaults.
    pub fn params(mut self, params: CallParams) -> Self {
        self.params = params;
        self
    }

    pub fn model_type_check(mut self, check: ModelTypeCheck) -> Self {
        self.type_check = check;
        self
    }

    pub fn build(mut self) -> Result<DevicePipeline, PipelineError> {
        let task = self.infer_task()?;
        let registry = self.registry;
        let resolved = registry.resolve(&task)?;
        let descriptor = resolved.descriptor;

        let implementation = match self.implementation.take() {
            Some(implementation) => implementation,
            None => tasks::build(descriptor.kind, resolved.languages.clone()),
        };

        let (mut binding, model_id) = self.bind_model(descriptor)?;
        let precision = binding.precision().unwrap_or(self.precision);

        let mut tokenizer = self.tokenizer.take();
        let mut feature_extractor = self.feature_extractor.take();
        if let Some(id) = &model_id {
            let preprocessors = &self.collaborators.preprocessors;
            if tokenizer.is_none() && descriptor.modality.requires_tokenizer() {
                debug!(model = %id, "loading tokenizer");
                tokenizer = Some(preprocessors.tokenizer(id)?);
            }
            if feature_extractor.is_none() && descriptor.modality.requires_feature_extractor() {
                debug!(model = %id, "loading feature extractor");
                feature_extractor = Some(preprocessors.feature_extractor(id)?);
            }
        }

        check_model_type(self.type_check, &resolved.task, descriptor, binding.model())?;
        let params = default_params(descriptor, std::mem::take(&mut self.params));

        if PADLESS_MODEL_TYPES.contains(&binding.model().model_type()) {
            if let Some(eos) = tokenizer.as_ref().and_then(|t| t.eos_token_id()) {
                tokenizer = tokenizer.map(|t| -> Arc<dyn Tokenizer> {
                    Arc::new(PadTokenOverride::new(t, eos))
                });
            }
            let config = binding.model_mut().config_mut();
            config.pad_token_id = config.eos_token_id;
        }

        info!(
            task = %resolved.task,
            model = binding.model().id(),
            binding = binding.kind_name(),
            %precision,
            "built pipeline"
        );
        Ok(DevicePipeline::new(PipelineParts {
            task: resolved.task,
            binding,
            implementation,
            generation_task: descriptor.is_generation(),
            precision,
            tokenizer,
            feature_extractor,
            params,
        }))
    }

    fn infer_task(&self) -> Result<String, PipelineError> {
        if let Some(task) = &self.task {
            return Ok(task.clone());
        }
        match &self.model {
            None => Err(PipelineError::MissingTaskAndModel),
            Some(ModelArg::Id(id)) => {
                let tag = self.collaborators.models.pipeline_tag(id)?;
                let task = tag.ok_or_else(|| {
                    PipelineError::TaskInference(format!("model '{id}' has no pipeline tag"))
                })?;
                debug!(model = %id, %task, "inferred task");
                Ok(task)
            }
            Some(other) => Err(PipelineError::TaskInference(format!(
                "inferring the task needs a model id, got a {}",
                other.kind_name()
            ))),
        }
    }

    /// Loads and binds the model; returns the id preprocessors are loaded by.
    fn bind_model(
        &mut self,
        descriptor: &TaskDescriptor,
    ) -> Result<(ModelBinding, Option<String>), PipelineError> {
        let models = Arc::clone(&self.collaborators.models);
        match self.model.take() {
            None => {
                let id = descriptor.default_model.clone();
                let revision = descriptor.default_revision.clone();
                warn!(
                    task = %descriptor.name,
                    model = %id,
                    %revision,
                    "no model was supplied, using the task default; pin a model and revision in production"
                );
                let model = models.from_pretrained(&id, Some(&revision))?;
                Ok((self.bind(model, descriptor)?, Some(id)))
            }
            Some(ModelArg::Id(id)) => {
                let model = models.from_pretrained(&id, self.revision.as_deref())?;
                Ok((self.bind(model, descriptor)?, Some(id)))
            }
            Some(ModelArg::Pretrained(model)) => {
                self.require_collaborators(descriptor, "pretrained model")?;
                Ok((self.bind(model, descriptor)?, None))
            }
            Some(ModelArg::Bound(executor)) => {
                if descriptor.is_generation() {
                    return Err(PipelineError::InvalidInput(format!(
                        "{} needs a generative binding, not a bound executor",
                        descriptor.name
                    )));
                }
                self.require_collaborators(descriptor, "bound executor")?;
                if let Some(config) = &self.device_config {
                    warn!(config = %config, "model is already bound, ignoring the device config");
                }
                Ok((ModelBinding::Bound(executor), None))
            }
        }
    }

    fn require_collaborators(
        &self,
        descriptor: &TaskDescriptor,
        model_kind: &'static str,
    ) -> Result<(), PipelineError> {
        if self.tokenizer.is_none() && descriptor.modality.requires_tokenizer() {
            return Err(PipelineError::MissingCollaborator {
                collaborator: "tokenizer",
                model_kind,
            });
        }
        if self.feature_extractor.is_none() && descriptor.modality.requires_feature_extractor() {
            return Err(PipelineError::MissingCollaborator {
                collaborator: "feature extractor",
                model_kind,
            });
        }
        Ok(())
    }

    fn bind(
        &self,
        model: PretrainedModel,
        descriptor: &TaskDescriptor,
    ) -> Result<ModelBinding, PipelineError> {
        let arg = self
            .device_config
            .as_ref()
            .unwrap_or(&descriptor.default_config);
        let config = arg.resolve(&self.collaborators.presets)?;
        DeviceBinder::new(Arc::clone(&self.collaborators.runtime)).bind(
            model,
            &config,
            &arg.label(),
            descriptor,
            self.precision,
        )
    }
}

fn check_model_type(
    check: ModelTypeCheck,
    task: &str,
    descriptor: &TaskDescriptor,
    model: &PretrainedModel,
) -> Result<(), PipelineError> {
    if check == ModelTypeCheck::Off || descriptor.supports(model.class()) {
        return Ok(());
    }
    let err = PipelineError::ModelTypeMismatch {
        task: task.to_string(),
        model: model.id().to_string(),
        class: model.class().to_string(),
        supported: descriptor
            .model_classes
            .iter()
            .map(|c| c.to_string())
            .collect(),
    };
    if check == ModelTypeCheck::Strict {
        return Err(err);
    }
    warn!("{err}");
    Ok(())
}

/// Fills unset call parameters from the task defaults.
fn default_params(descriptor: &TaskDescriptor, mut params: CallParams) -> CallParams {
    if let Some(default_max) = descriptor.max_length {
        if !descriptor.is_generation() {
            params.padding.get_or_insert(Padding::MaxLength);
            if params.max_length.is_none() {
                warn!(
                    task = %descriptor.name,
                    max_length = default_max,
                    "no padding arguments given, padding to the default max_length; longer inputs are truncated"
                );
            }
        }
        params.max_length.get_or_insert(default_max);
    }

    if descriptor.is_seq2seq_generation() {
        if params.max_input_length.is_none() {
            params.max_input_length = descriptor.max_input_length;
        }
        if params.truncation.is_none() {
            params.truncation = descriptor.truncation;
        }
        if params.max_input_length.is_some() {
            params.padding.get_or_insert(Padding::MaxLength);
        }
    }

    if descriptor.kind == PipelineKind::QuestionAnswering {
        params.padding.get_or_insert(Padding::MaxLength);
        if params.max_length.is_none() {
            warn!(
                max_length = QA_MAX_SEQ_LEN,
                "no padding arguments given, padding questions to the default length; longer inputs are truncated"
            );
            params.max_length = Some(QA_MAX_SEQ_LEN);
        }
    }
    params
}
