// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A logical executable slot and its compile state machine.
//!
//! ```text
//!              compile(s)                    evict
//!  Uncompiled ───────────► Compiled(s, p) ─────────► Stale
//!                               ▲                      │
//!                               └──────────────────────┘
//!                                      compile(s2)
//! ```
//!
//! A slot holds at most one [`CompiledExecutable`]. Eviction destroys the
//! current executable before anything else is compiled into the slot.

use std::sync::Arc;

use device_runtime::{
    BatchSignature, CompileRequest, CompiledExecutable, DeviceError, DeviceRuntime,
};
use tracing::debug;

/// Compile state of a slot.
#[derive(Debug, Default)]
pub enum SlotState {
    /// Never compiled, or released by disposal.
    #[default]
    Uncompiled,
    Compiled(CompiledExecutable),
    /// The executable was evicted; the next call recompiles.
    Stale,
}

/// One logical executable of a model binding.
#[derive(Debug)]
pub struct ExecutableSlot {
    name: &'static str,
    state: SlotState,
    compiles: u64,
    evictions: u64,
}

impl ExecutableSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: SlotState::Uncompiled,
            compiles: 0,
            evictions: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    /// `"uncompiled"`, `"compiled"` or `"stale"`.
    pub fn state_name(&self) -> &'static str {
        match self.state {
            SlotState::Uncompiled => "uncompiled",
            SlotState::Compiled(_) => "compiled",
            SlotState::Stale => "stale",
        }
    }

    pub fn executable(&self) -> Option<&CompiledExecutable> {
        match &self.state {
            SlotState::Compiled(exe) => Some(exe),
            SlotState::Uncompiled | SlotState::Stale => None,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.executable().is_some()
    }

    /// Signature of the live executable.
    pub fn signature(&self) -> Option<&BatchSignature> {
        self.executable().map(CompiledExecutable::signature)
    }

    /// Successful compilations into this slot.
    pub fn compiles(&self) -> u64 {
        self.compiles
    }

    /// Executables destroyed because of a signature change.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Compiles `request` unless an executable is already live.
    ///
    /// Returns `true` if a compilation happened. A live executable for a
    /// different signature is kept; running it rejects the inputs.
    pub fn compile_if_needed(
        &mut self,
        runtime: &Arc<dyn DeviceRuntime>,
        request: &CompileRequest<'_>,
    ) -> Result<bool, DeviceError> {
        if self.is_compiled() {
            return Ok(false);
        }
        let exe = CompiledExecutable::compile(Arc::clone(runtime), request)?;
        self.compiles += 1;
        self.state = SlotState::Compiled(exe);
        Ok(true)
    }

    /// Destroys the live executable and marks the slot stale.
    ///
    /// Returns `true` if an executable was destroyed. On a destroy error
    /// the slot is still left stale.
    pub fn evict(&mut self) -> Result<bool, DeviceError> {
        match std::mem::replace(&mut self.state, SlotState::Stale) {
            SlotState::Compiled(exe) => {
                self.evictions += 1;
                debug!(slot = self.name, signature = %exe.signature(), "evicting executable");
                exe.destroy()?;
                Ok(true)
            }
            other => {
                self.state = other;
                Ok(false)
            }
        }
    }

    /// Evicts the live executable if it was compiled for another signature.
    pub fn evict_if_mismatched(&mut self, signature: &BatchSignature) -> Result<bool, DeviceError> {
        let mismatched = self.signature().is_some_and(|current| current != signature);
        if mismatched {
            self.evict()
        } else {
            Ok(false)
        }
    }

    /// Destroys the live executable and resets the slot.
    ///
    /// Returns `true` if an executable was destroyed. Releasing an empty
    /// slot is a no-op.
    pub fn release(&mut self) -> Result<bool, DeviceError> {
        match std::mem::take(&mut self.state) {
            SlotState::Compiled(exe) => {
                exe.destroy()?;
                Ok(true)
            }
            SlotState::Uncompiled | SlotState::Stale => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_runtime::{
        ExecutionOptions, MemoryBudget, OutputSpec, Precision, ProgramSpec, SimulatedDevice,
    };

    fn program() -> ProgramSpec {
        ProgramSpec {
            name: "slot-test".into(),
            stage_weight_bytes: vec![256],
            activation_bytes_per_sample: 16,
            outputs: vec![OutputSpec {
                name: "logits".into(),
                width: 2,
                per_token: false,
            }],
        }
    }

    fn compile(slot: &mut ExecutableSlot, runtime: &Arc<dyn DeviceRuntime>, batch: usize) -> bool {
        let program = program();
        let signature = BatchSignature::new(batch, vec![8]);
        let options = ExecutionOptions::default();
        let request = CompileRequest {
            program: &program,
            signature: &signature,
            precision: Precision::Full,
            options: &options,
        };
        slot.compile_if_needed(runtime, &request).unwrap()
    }

    fn device() -> (Arc<SimulatedDevice>, Arc<dyn DeviceRuntime>) {
        let device = Arc::new(SimulatedDevice::new(1, MemoryBudget::from_mb(1)));
        let runtime: Arc<dyn DeviceRuntime> = device.clone();
        (device, runtime)
    }

    #[test]
    fn test_lifecycle() {
        let (device, runtime) = device();
        let mut slot = ExecutableSlot::new("executable");
        assert_eq!(slot.state_name(), "uncompiled");

        assert!(compile(&mut slot, &runtime, 1));
        assert!(!compile(&mut slot, &runtime, 1));
        assert_eq!(slot.state_name(), "compiled");
        assert_eq!(slot.compiles(), 1);

        assert!(slot.evict_if_mismatched(&BatchSignature::new(4, vec![8])).unwrap());
        assert_eq!(slot.state_name(), "stale");
        assert_eq!(device.stats().live_executables, 0);

        assert!(compile(&mut slot, &runtime, 4));
        assert_eq!(slot.signature(), Some(&BatchSignature::new(4, vec![8])));
        assert_eq!((slot.compiles(), slot.evictions()), (2, 1));
        assert_eq!(device.stats().peak_live_executables, 1);
    }

    #[test]
    fn test_matching_signature_is_kept() {
        let (device, runtime) = device();
        let mut slot = ExecutableSlot::new("executable");
        compile(&mut slot, &runtime, 2);
        assert!(!slot.evict_if_mismatched(&BatchSignature::new(2, vec![8])).unwrap());
        assert_eq!(device.stats().destroys, 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (device, runtime) = device();
        let mut slot = ExecutableSlot::new("executable");
        assert!(!slot.release().unwrap());
        compile(&mut slot, &runtime, 1);
        assert!(slot.release().unwrap());
        assert!(!slot.release().unwrap());
        assert_eq!(device.stats().destroys, 1);
        assert_eq!(slot.state_name(), "uncompiled");
    }

    #[test]
    fn test_evict_empty_slot() {
        let mut slot = ExecutableSlot::new("executable");
        assert!(!slot.evict().unwrap());
        assert_eq!(slot.state_name(), "uncompiled");
    }
}
