// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII handle for a compiled device executable.
//!
//! [`CompiledExecutable`] owns exactly one device-side executable. It is
//! released either explicitly with [`CompiledExecutable::destroy`], which
//! consumes the handle, or implicitly when the handle is dropped. The
//! ownership rules make a double destroy unrepresentable.

use std::sync::Arc;

use tensor_core::{ModelInputs, ModelOutputs};
use tracing::{debug, warn};

use crate::{
    BatchSignature, CompileRequest, DeviceError, DeviceRuntime, ExecutableId, Precision,
};

/// A device executable compiled for one batch signature and precision.
///
/// # Example
/// ```ignore
/// let exe = CompiledExecutable::compile(runtime, &request)?;
/// let outputs = exe.run(&inputs)?;   // inputs must match exe.signature()
/// exe.destroy()?;                     // device memory released
/// // exe.run(&inputs);               // compile error: moved value
/// ```
pub struct CompiledExecutable {
    id: ExecutableId,
    /// Runtime handle. Wrapped in `Option` so release can `take()` it.
    runtime: Option<Arc<dyn DeviceRuntime>>,
    program: String,
    signature: BatchSignature,
    precision: Precision,
}

impl CompiledExecutable {
    /// Compiles `request` on `runtime` and wraps the resulting executable.
    pub fn compile(
        runtime: Arc<dyn DeviceRuntime>,
        request: &CompileRequest<'_>,
    ) -> Result<Self, DeviceError> {
        let id = runtime.compile(request)?;
        debug!(
            %id,
            program = %request.program.name,
            signature = %request.signature,
            precision = %request.precision,
            "compiled executable"
        );
        Ok(Self {
            id,
            runtime: Some(runtime),
            program: request.program.name.clone(),
            signature: request.signature.clone(),
            precision: request.precision,
        })
    }

    pub fn id(&self) -> ExecutableId {
        self.id
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The batch signature this executable accepts.
    pub fn signature(&self) -> &BatchSignature {
        &self.signature
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Returns `true` if `signature` is the one this executable was built for.
    pub fn accepts(&self, signature: &BatchSignature) -> bool {
        self.signature == *signature
    }

    /// Runs the executable. Inputs with a different signature, auxiliary
    /// input shapes included, are rejected.
    pub fn run(&self, inputs: &ModelInputs) -> Result<ModelOutputs, DeviceError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or(DeviceError::UnknownExecutable(self.id))?;
        let actual = self
            .signature
            .observed(inputs)
            .ok_or(DeviceError::NoTensorInput)?;
        if !self.accepts(&actual) {
            return Err(DeviceError::SignatureMismatch {
                id: self.id,
                expected: self.signature.clone(),
                actual,
            });
        }
        runtime.execute(self.id, inputs)
    }

    /// Releases the device executable, surfacing any runtime error.
    pub fn destroy(mut self) -> Result<(), DeviceError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        match self.runtime.take() {
            Some(runtime) => {
                debug!(id = %self.id, program = %self.program, "destroying executable");
                runtime.destroy(self.id)
            }
            None => Ok(()),
        }
    }
}

impl Drop for CompiledExecutable {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(id = %self.id, error = %e, "failed to destroy executable on drop");
        }
    }
}

impl std::fmt::Debug for CompiledExecutable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExecutable")
            .field("id", &self.id)
            .field("program", &self.program)
            .field("signature", &self.signature)
            .field("precision", &self.precision)
            .field("live", &self.runtime.is_some())
            .finish()
    }
}
