// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: releasing device executables.

mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use common::*;
use device_runtime::{
    CompileRequest, DeviceError, DeviceRuntime, ExecutableId, MemoryBudget, SimulatedDevice,
};
use model_hub::BuiltinPreprocessors;
use pipelines::{Collaborators, PipelineBuilder, PipelineError, PipelineInput, TaskRegistry};
use tensor_core::{ModelInputs, ModelOutputs};

/// A simulated device whose compile or destroy fails for chosen programs.
#[derive(Debug)]
struct FaultyDevice {
    inner: SimulatedDevice,
    fail_compile_suffix: Option<&'static str>,
    fail_destroy_suffix: Option<&'static str>,
    programs: Mutex<BTreeMap<ExecutableId, String>>,
}

impl FaultyDevice {
    fn new() -> Self {
        Self {
            inner: SimulatedDevice::new(4, MemoryBudget::from_mb(256)),
            fail_compile_suffix: None,
            fail_destroy_suffix: None,
            programs: Mutex::new(BTreeMap::new()),
        }
    }
}

impl DeviceRuntime for FaultyDevice {
    fn name(&self) -> &str {
        "faulty"
    }

    fn num_devices(&self) -> usize {
        self.inner.num_devices()
    }

    fn memory_per_device(&self) -> MemoryBudget {
        self.inner.memory_per_device()
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<ExecutableId, DeviceError> {
        let name = &request.program.name;
        if self.fail_compile_suffix.is_some_and(|s| name.ends_with(s)) {
            return Err(DeviceError::CompileFailed {
                program: name.clone(),
                reason: "injected".into(),
            });
        }
        let id = self.inner.compile(request)?;
        self.programs.lock().unwrap().insert(id, name.clone());
        Ok(id)
    }

    fn execute(&self, id: ExecutableId, inputs: &ModelInputs) -> Result<ModelOutputs, DeviceError> {
        self.inner.execute(id, inputs)
    }

    fn destroy(&self, id: ExecutableId) -> Result<(), DeviceError> {
        let program = self.programs.lock().unwrap().get(&id).cloned().unwrap_or_default();
        if self.fail_destroy_suffix.is_some_and(|s| program.ends_with(s)) {
            return Err(DeviceError::UnknownExecutable(id));
        }
        self.inner.destroy(id)
    }
}

fn faulty_builder(registry: &TaskRegistry, device: Arc<FaultyDevice>) -> PipelineBuilder<'_> {
    let collaborators = Collaborators::new(
        Arc::new(catalogue()),
        Arc::new(BuiltinPreprocessors::new()),
        device,
    );
    PipelineBuilder::new(registry, collaborators)
}

#[test]
fn test_dispose_twice_destroys_once() {
    let registry = TaskRegistry::builtin();
    let device = device();
    let (builder, _) = builder(&registry, &device);
    let mut pipeline = builder.task("text-classification").build().unwrap();
    pipeline.call(PipelineInput::text("hello")).unwrap();

    let report = pipeline.dispose().unwrap();
    assert_eq!(report.destroyed, vec!["executable"]);
    assert_eq!(device.stats().destroys, 1);

    let report = pipeline.dispose().unwrap();
    assert_eq!(report.destroyed_count(), 0);
    assert_eq!(device.stats().destroys, 1);
    assert!(pipeline.is_disposed());
}

#[test]
fn test_disposed_pipeline_refuses_calls() {
    let registry = TaskRegistry::builtin();
    let device = device();
    let (builder, _) = builder(&registry, &device);
    let mut pipeline = builder.task("text-classification").build().unwrap();
    pipeline.dispose().unwrap();
    let err = pipeline.call(PipelineInput::text("late")).unwrap_err();
    assert!(matches!(err, PipelineError::Disposed));
    assert_eq!(device.stats().compiles, 0);
}

#[test]
fn test_never_called_pipeline_disposes_cleanly() {
    let registry = TaskRegistry::builtin();
    let device = device();
    let (builder, _) = builder(&registry, &device);
    let mut pipeline = builder.task("summarization").build().unwrap();
    let report = pipeline.dispose().unwrap();
    assert!(report.destroyed.is_empty());
    assert!(report.absent.is_empty());
    assert_eq!(device.stats().destroys, 0);
}

#[test]
fn test_drop_releases_everything() {
    let registry = TaskRegistry::builtin();
    let device = device();
    {
        let (builder, _) = builder(&registry, &device);
        let mut pipeline = builder.task("summarization").build().unwrap();
        pipeline.call(PipelineInput::text("a long article")).unwrap();
        assert_eq!(device.stats().live_executables, 2);
    }
    let stats = device.stats();
    assert_eq!(stats.live_executables, 0);
    assert_eq!(stats.destroys, 2);
}

#[test]
fn test_seq2seq_disposal_destroys_decoder_then_encoder() {
    let registry = TaskRegistry::builtin();
    let device = device();
    let (builder, _) = builder(&registry, &device);
    let mut pipeline = builder.task("summarization").build().unwrap();
    pipeline.call(PipelineInput::text("a long article")).unwrap();

    let report = pipeline.dispose().unwrap();
    assert_eq!(report.destroyed, vec!["decoder", "encoder"]);
    assert_eq!(device.stats().destroys, 2);
}

#[test]
fn test_decoder_only_model_has_no_encoder() {
    let registry = TaskRegistry::builtin();
    let device = device();
    let (builder, _) = builder(&registry, &device);
    let mut pipeline = builder
        .task("text-generation")
        .model(GPT2)
        .params(pipelines::CallParams {
            max_length: Some(8),
            ..pipelines::CallParams::default()
        })
        .build()
        .unwrap();
    pipeline.call(PipelineInput::text("hi")).unwrap();

    let report = pipeline.dispose().unwrap();
    assert_eq!(report.destroyed, vec!["decoder"]);
    assert_eq!(report.absent, vec!["encoder"]);
    assert_eq!(device.stats().live_executables, 0);
}

#[test]
fn test_encoder_only_compiled_state_disposes_cleanly() {
    let registry = TaskRegistry::builtin();
    let device = Arc::new(FaultyDevice {
        fail_compile_suffix: Some("/decoder"),
        ..FaultyDevice::new()
    });
    let mut pipeline = faulty_builder(&registry, device.clone())
        .task("summarization")
        .build()
        .unwrap();

    let err = pipeline.call(PipelineInput::text("article")).unwrap_err();
    assert!(matches!(err, PipelineError::Device(DeviceError::CompileFailed { .. })));
    assert_eq!(device.inner.stats().live_executables, 1);

    let report = pipeline.dispose().unwrap();
    assert_eq!(report.destroyed, vec!["encoder"]);
    assert_eq!(device.inner.stats().live_executables, 0);
}

#[test]
fn test_release_continues_past_a_failing_destroy() {
    let registry = TaskRegistry::builtin();
    let device = Arc::new(FaultyDevice {
        fail_destroy_suffix: Some("/decoder"),
        ..FaultyDevice::new()
    });
    let mut pipeline = faulty_builder(&registry, device.clone())
        .task("summarization")
        .build()
        .unwrap();
    pipeline.call(PipelineInput::text("article")).unwrap();

    let err = pipeline.dispose().unwrap_err();
    assert!(matches!(err, PipelineError::Device(DeviceError::UnknownExecutable(_))));
    // the encoder is still released
    assert_eq!(device.inner.stats().destroys, 1);
    assert!(pipeline.is_disposed());
    assert!(pipeline.dispose().unwrap().destroyed.is_empty());
}

#[test]
fn test_failing_destroy_of_bound_executor_is_reported() {
    let registry = TaskRegistry::builtin();
    let device = Arc::new(FaultyDevice {
        fail_destroy_suffix: Some(SST2),
        ..FaultyDevice::new()
    });
    let mut pipeline = faulty_builder(&registry, device.clone())
        .task("text-classification")
        .build()
        .unwrap();
    pipeline.call(PipelineInput::text("hello")).unwrap();

    let err = pipeline.dispose().unwrap_err();
    assert!(matches!(err, PipelineError::Device(DeviceError::UnknownExecutable(_))));
    assert_eq!(device.inner.stats().destroys, 0);
    assert_eq!(pipeline.binding().slots()[0].state_name(), "uncompiled");
    assert!(pipeline.is_disposed());
    assert!(pipeline.dispose().unwrap().destroyed.is_empty());
}
