// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A model wrapped in a directly invocable device executable.

use std::sync::Arc;

use device_runtime::{
    BatchSignature, CompileRequest, DeviceError, DeviceRuntime, ExecutionOptions, Precision,
    ProgramSpec,
};
use model_hub::PretrainedModel;
use tensor_core::{ModelInputs, ModelOutputs};

use super::ExecutableSlot;
use crate::PipelineError;

/// A bound model with one lazily compiled executable.
///
/// The first [`call`](Self::call) compiles for the signature of its inputs.
/// Later calls must use the same signature: the executor never recompiles
/// on its own, that is the recompilation controller's job.
#[derive(Debug)]
pub struct InferenceExecutor {
    runtime: Arc<dyn DeviceRuntime>,
    model: PretrainedModel,
    program: ProgramSpec,
    precision: Precision,
    options: ExecutionOptions,
    slot: ExecutableSlot,
}

impl InferenceExecutor {
    pub fn new(
        runtime: Arc<dyn DeviceRuntime>,
        model: PretrainedModel,
        program: ProgramSpec,
        precision: Precision,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            runtime,
            model,
            program,
            precision,
            options,
            slot: ExecutableSlot::new("executable"),
        }
    }

    pub fn model(&self) -> &PretrainedModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut PretrainedModel {
        &mut self.model
    }

    pub fn program(&self) -> &ProgramSpec {
        &self.program
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn runtime(&self) -> &Arc<dyn DeviceRuntime> {
        &self.runtime
    }

    pub fn slot(&self) -> &ExecutableSlot {
        &self.slot
    }

    pub fn is_compiled(&self) -> bool {
        self.slot.is_compiled()
    }

    /// Signature of the live executable.
    pub fn compiled_signature(&self) -> Option<&BatchSignature> {
        self.slot.signature()
    }

    /// Compiles for `signature` if nothing is compiled yet.
    pub fn compile(&mut self, signature: &BatchSignature) -> Result<bool, DeviceError> {
        let request = CompileRequest {
            program: &self.program,
            signature,
            precision: self.precision,
            options: &self.options,
        };
        self.slot.compile_if_needed(&self.runtime, &request)
    }

    /// Runs the model, compiling on first use.
    pub fn call(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs, PipelineError> {
        let signature = BatchSignature::of(inputs)
            .ok_or_else(|| PipelineError::InvalidInput("inputs contain no tensor".into()))?;
        self.compile(&signature)?;
        let exe = self.slot.executable().ok_or(PipelineError::NotBound)?;
        Ok(exe.run(inputs)?)
    }

    /// Destroys the live executable so the next call recompiles.
    pub fn evict(&mut self) -> Result<bool, DeviceError> {
        self.slot.evict()
    }

    /// Releases the executable; a later call compiles again.
    pub fn destroy(&mut self) -> Result<bool, DeviceError> {
        self.slot.release()
    }
}
