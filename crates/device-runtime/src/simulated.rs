// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-process accelerator that models fixed-shape executables.
//!
//! [`SimulatedDevice`] behaves like a real accelerator from the caller's
//! point of view:
//!
//! 1. Compilation reserves weight and activation memory on every device a
//!    program spans and fails with `OutOfMemory` when a stage does not fit.
//! 2. Executables accept only the batch signature they were compiled for,
//!    including the shapes of any auxiliary inputs it names.
//! 3. Outputs are deterministic functions of the primary input, in the
//!    precision the executable was compiled for.
//! 4. Every compile, execute and destroy is counted in [`DeviceStats`].
//!
//! # Thread Safety
//! `SimulatedDevice` is `Send + Sync`: all interior state sits behind a
//! `Mutex` or an atomic, so it can be shared as `Arc<dyn DeviceRuntime>`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tensor_core::{DType, ModelInputs, ModelOutputs, Shape, Tensor};
use tracing::debug;

use crate::{
    BatchSignature, CompileRequest, DeviceError, DeviceRuntime, DeviceStats, ExecutableId,
    MemoryBudget, OutputSpec, Precision,
};

/// Modulus of the synthetic output pattern.
const PATTERN_MOD: i64 = 97;

struct LiveExecutable {
    program: String,
    signature: BatchSignature,
    precision: Precision,
    /// Bytes reserved on each device, indexed by device.
    reserved: Vec<usize>,
    outputs: Vec<OutputSpec>,
}

/// A simulated multi-device accelerator.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use device_runtime::{DeviceRuntime, MemoryBudget, SimulatedDevice};
///
/// let device = Arc::new(SimulatedDevice::new(4, MemoryBudget::from_mb(900)));
/// assert_eq!(device.num_devices(), 4);
/// assert_eq!(device.stats().compiles, 0);
/// ```
pub struct SimulatedDevice {
    name: String,
    num_devices: usize,
    budget: MemoryBudget,
    next_id: AtomicU64,
    live: Mutex<BTreeMap<ExecutableId, LiveExecutable>>,
    stats: Mutex<DeviceStats>,
    pending_failure: Mutex<Option<String>>,
    recording: bool,
    recorded: Mutex<Vec<ModelInputs>>,
}

impl SimulatedDevice {
    /// Creates a device group of `num_devices` devices with `budget` each.
    pub fn new(num_devices: usize, budget: MemoryBudget) -> Self {
        Self {
            name: "simulated".into(),
            num_devices,
            budget,
            next_id: AtomicU64::new(1),
            live: Mutex::new(BTreeMap::new()),
            stats: Mutex::new(DeviceStats::default()),
            pending_failure: Mutex::new(None),
            recording: false,
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keeps a copy of every input set passed to `execute`.
    pub fn with_input_recording(mut self) -> Self {
        self.recording = true;
        self
    }

    /// Makes the next `compile` call fail with `reason`.
    pub fn fail_next_compile(&self, reason: impl Into<String>) {
        *lock(&self.pending_failure) = Some(reason.into());
    }

    /// Returns a snapshot of device statistics.
    pub fn stats(&self) -> DeviceStats {
        lock(&self.stats).clone()
    }

    /// Live executables, ordered by id.
    pub fn live_executables(&self) -> Vec<(ExecutableId, BatchSignature, Precision)> {
        lock(&self.live)
            .iter()
            .map(|(id, exe)| (*id, exe.signature.clone(), exe.precision))
            .collect()
    }

    /// Bytes currently reserved on `device`.
    pub fn resident_bytes(&self, device: usize) -> usize {
        lock(&self.live)
            .values()
            .filter_map(|exe| exe.reserved.get(device))
            .sum()
    }

    /// Inputs observed by `execute`, oldest first. Empty unless recording.
    pub fn recorded_inputs(&self) -> Vec<ModelInputs> {
        lock(&self.recorded).clone()
    }

    fn reservation(request: &CompileRequest<'_>) -> Vec<usize> {
        let scale = |bytes: usize| {
            if request.precision.is_half() {
                bytes / 2
            } else {
                bytes
            }
        };
        let activations =
            scale(request.program.activation_bytes_per_sample * request.signature.batch_size());
        request
            .program
            .stage_weight_bytes
            .iter()
            .map(|&w| scale(w) + activations)
            .collect()
    }

    fn fail_compile(&self, err: DeviceError) -> Result<ExecutableId, DeviceError> {
        let oom = matches!(err, DeviceError::OutOfMemory { .. });
        lock(&self.stats).record_compile_failure(oom);
        Err(err)
    }
}

impl DeviceRuntime for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_devices(&self) -> usize {
        self.num_devices
    }

    fn memory_per_device(&self) -> MemoryBudget {
        self.budget
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<ExecutableId, DeviceError> {
        let program = request.program;
        if let Some(reason) = lock(&self.pending_failure).take() {
            return self.fail_compile(DeviceError::CompileFailed {
                program: program.name.clone(),
                reason,
            });
        }
        if program.num_devices() == 0 {
            return self.fail_compile(DeviceError::CompileFailed {
                program: program.name.clone(),
                reason: "program has no stages".into(),
            });
        }
        if program.num_devices() > self.num_devices {
            return self.fail_compile(DeviceError::TooFewDevices {
                requested: program.num_devices(),
                available: self.num_devices,
            });
        }

        let reserved = Self::reservation(request);
        let mut live = lock(&self.live);
        let budget = self.budget.as_bytes();
        for (device, &need) in reserved.iter().enumerate() {
            let used: usize = live
                .values()
                .filter_map(|exe| exe.reserved.get(device))
                .sum();
            if !self.budget.fits(used, need) {
                let available = budget.saturating_sub(used);
                drop(live);
                return self.fail_compile(DeviceError::OutOfMemory {
                    device,
                    requested_bytes: need,
                    available_bytes: available,
                    budget_bytes: budget,
                });
            }
        }

        let id = ExecutableId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            device = %self.name,
            %id,
            program = %program.name,
            signature = %request.signature,
            precision = %request.precision,
            "device compile"
        );
        live.insert(
            id,
            LiveExecutable {
                program: program.name.clone(),
                signature: request.signature.clone(),
                precision: request.precision,
                reserved,
                outputs: program.outputs.clone(),
            },
        );
        lock(&self.stats).record_compile();
        Ok(id)
    }

    fn execute(&self, id: ExecutableId, inputs: &ModelInputs) -> Result<ModelOutputs, DeviceError> {
        let live = lock(&self.live);
        let exe = live.get(&id).ok_or(DeviceError::UnknownExecutable(id))?;

        let (_, primary) = inputs.primary_tensor().ok_or(DeviceError::NoTensorInput)?;
        let actual = exe
            .signature
            .observed(inputs)
            .ok_or(DeviceError::NoTensorInput)?;
        if actual != exe.signature {
            return Err(DeviceError::SignatureMismatch {
                id,
                expected: exe.signature.clone(),
                actual,
            });
        }

        let values = seed_values(primary)?;
        let batch = exe.signature.batch_size();
        let seq = exe.signature.sequence_length();

        let mut outputs = ModelOutputs::new();
        for spec in &exe.outputs {
            let (rows, shape) = if spec.per_token {
                (batch * seq, Shape::new(vec![batch, seq, spec.width]))
            } else {
                (batch, Shape::matrix(batch, spec.width))
            };
            let data: Vec<f32> = row_seeds(&values, rows)
                .into_iter()
                .flat_map(|seed| {
                    (0..spec.width).map(move |j| {
                        let v = (seed.rem_euclid(PATTERN_MOD) + 31 * j as i64) % PATTERN_MOD;
                        v as f32 / PATTERN_MOD as f32
                    })
                })
                .collect();
            let tensor = match exe.precision {
                Precision::Half => Tensor::from_f32_as_half(shape, &data)?,
                Precision::Full => Tensor::from_f32(shape, &data)?,
            };
            outputs.insert(spec.name.clone(), tensor);
        }
        debug!(%id, program = %exe.program, "device execute");
        drop(live);

        if self.recording {
            lock(&self.recorded).push(inputs.clone());
        }
        lock(&self.stats).record_execution();
        Ok(outputs)
    }

    fn destroy(&self, id: ExecutableId) -> Result<(), DeviceError> {
        let removed = lock(&self.live).remove(&id);
        match removed {
            Some(exe) => {
                debug!(device = %self.name, %id, program = %exe.program, "device destroy");
                lock(&self.stats).record_destroy();
                Ok(())
            }
            None => Err(DeviceError::UnknownExecutable(id)),
        }
    }
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("name", &self.name)
            .field("num_devices", &self.num_devices)
            .field("budget", &self.budget)
            .field("live_executables", &lock(&self.live).len())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Integer view of the primary input used to derive outputs.
fn seed_values(t: &Tensor) -> Result<Vec<i64>, DeviceError> {
    if t.dtype() == DType::F32 || t.dtype() == DType::F16 {
        Ok(t.to_f32_vec()?
            .into_iter()
            .map(|x| (x * 1000.0).round() as i64)
            .collect())
    } else {
        Ok(t.to_i64_vec()?)
    }
}

/// Sums `values` into `rows` equally sized chunks.
fn row_seeds(values: &[i64], rows: usize) -> Vec<i64> {
    if rows == 0 {
        return Vec::new();
    }
    let chunk = (values.len() / rows).max(1);
    (0..rows)
        .map(|r| values.iter().skip(r * chunk).take(chunk).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutionOptions, ProgramSpec};

    fn program(stages: Vec<usize>) -> ProgramSpec {
        ProgramSpec {
            name: "test-model".into(),
            stage_weight_bytes: stages,
            activation_bytes_per_sample: 100,
            outputs: vec![
                OutputSpec {
                    name: "logits".into(),
                    width: 3,
                    per_token: false,
                },
                OutputSpec {
                    name: "hidden".into(),
                    width: 2,
                    per_token: true,
                },
            ],
        }
    }

    fn compile(
        device: &SimulatedDevice,
        program: &ProgramSpec,
        batch: usize,
        precision: Precision,
    ) -> Result<ExecutableId, DeviceError> {
        let signature = BatchSignature::new(batch, vec![4]);
        let options = ExecutionOptions::default();
        device.compile(&CompileRequest {
            program,
            signature: &signature,
            precision,
            options: &options,
        })
    }

    fn ids(batch: usize) -> ModelInputs {
        let values: Vec<i64> = (0..batch as i64 * 4).collect();
        ModelInputs::new().with(
            "input_ids",
            Tensor::from_i64(Shape::matrix(batch, 4), &values).unwrap(),
        )
    }

    #[test]
    fn test_compile_execute_destroy() {
        let device = SimulatedDevice::new(2, MemoryBudget::from_mb(1));
        let id = compile(&device, &program(vec![1000, 1000]), 2, Precision::Full).unwrap();

        let out = device.execute(id, &ids(2)).unwrap();
        let logits = out.get("logits").unwrap();
        assert_eq!(logits.shape().dims(), &[2, 3]);
        assert_eq!(logits.dtype(), DType::F32);
        assert_eq!(out.get("hidden").unwrap().shape().dims(), &[2, 4, 2]);

        device.destroy(id).unwrap();
        let stats = device.stats();
        assert_eq!(stats.compiles, 1);
        assert_eq!(stats.executions, 1);
        assert_eq!(stats.destroys, 1);
        assert_eq!(stats.live_executables, 0);
    }

    #[test]
    fn test_half_precision_outputs() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_mb(1));
        let id = compile(&device, &program(vec![1000]), 1, Precision::Half).unwrap();
        let out = device.execute(id, &ids(1)).unwrap();
        assert_eq!(out.get("logits").unwrap().dtype(), DType::F16);
    }

    #[test]
    fn test_outputs_are_deterministic() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_mb(1));
        let id = compile(&device, &program(vec![1000]), 2, Precision::Full).unwrap();
        let a = device.execute(id, &ids(2)).unwrap();
        let b = device.execute(id, &ids(2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_execute_wrong_signature() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_mb(1));
        let id = compile(&device, &program(vec![1000]), 1, Precision::Full).unwrap();
        assert!(matches!(
            device.execute(id, &ids(4)),
            Err(DeviceError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_execute_checks_auxiliary_shapes() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_mb(1));
        let hidden = |len: usize| {
            Tensor::from_f32(Shape::new(vec![1, len, 2]), &vec![0.5; len * 2]).unwrap()
        };
        let signature =
            BatchSignature::new(1, vec![4]).with_input("encoder_hidden_states", hidden(2).shape());
        let options = ExecutionOptions::default();
        let id = device
            .compile(&CompileRequest {
                program: &program(vec![1000]),
                signature: &signature,
                precision: Precision::Full,
                options: &options,
            })
            .unwrap();

        let inputs = |len: usize| ids(1).with("encoder_hidden_states", hidden(len));
        assert!(device.execute(id, &inputs(2)).is_ok());
        assert!(matches!(
            device.execute(id, &inputs(12)),
            Err(DeviceError::SignatureMismatch { .. })
        ));
        assert!(matches!(
            device.execute(id, &ids(1)),
            Err(DeviceError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_destroy_unknown() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_mb(1));
        let id = compile(&device, &program(vec![1000]), 1, Precision::Full).unwrap();
        device.destroy(id).unwrap();
        assert!(matches!(
            device.destroy(id),
            Err(DeviceError::UnknownExecutable(_))
        ));
        assert_eq!(device.stats().destroys, 1);
    }

    #[test]
    fn test_out_of_memory() {
        let device = SimulatedDevice::new(2, MemoryBudget::from_bytes(2000));
        // Device 1 needs 1900 + 100 activations; a second copy will not fit.
        let p = program(vec![500, 1900]);
        let first = compile(&device, &p, 1, Precision::Full).unwrap();
        assert_eq!(device.resident_bytes(1), 2000);
        let err = compile(&device, &p, 1, Precision::Full).unwrap_err();
        assert!(matches!(err, DeviceError::OutOfMemory { device: 1, .. }));
        assert_eq!(device.stats().oom_count, 1);

        device.destroy(first).unwrap();
        assert!(compile(&device, &p, 1, Precision::Full).is_ok());
    }

    #[test]
    fn test_half_precision_halves_reservation() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_bytes(1000));
        let p = program(vec![1800]);
        assert!(compile(&device, &p, 1, Precision::Full).is_err());
        compile(&device, &p, 1, Precision::Half).unwrap();
        assert_eq!(device.resident_bytes(0), 950);
    }

    #[test]
    fn test_too_few_devices() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_mb(1));
        let err = compile(&device, &program(vec![1, 1]), 1, Precision::Full).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::TooFewDevices {
                requested: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn test_fail_next_compile_only_once() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_mb(1));
        device.fail_next_compile("injected");
        let p = program(vec![10]);
        assert!(matches!(
            compile(&device, &p, 1, Precision::Full),
            Err(DeviceError::CompileFailed { .. })
        ));
        assert!(compile(&device, &p, 1, Precision::Full).is_ok());
        assert_eq!(device.stats().compile_failures, 1);
    }

    #[test]
    fn test_input_recording() {
        let device = SimulatedDevice::new(1, MemoryBudget::from_mb(1)).with_input_recording();
        let id = compile(&device, &program(vec![10]), 1, Precision::Full).unwrap();
        device.execute(id, &ids(1)).unwrap();
        assert_eq!(device.recorded_inputs(), vec![ids(1)]);
    }

    #[test]
    fn test_row_seeds() {
        assert_eq!(row_seeds(&[1, 2, 3, 4], 2), vec![3, 7]);
        assert_eq!(row_seeds(&[], 2), vec![0, 0]);
        assert!(row_seeds(&[1], 0).is_empty());
    }
}
