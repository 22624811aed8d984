// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The accelerator runtime interface and the descriptors it consumes.
//!
//! # Compilation Model
//!
//! ```text
//!   ProgramSpec + BatchSignature + Precision + ExecutionOptions
//!                          │
//!                          ▼ DeviceRuntime::compile
//!                    ExecutableId  ──► execute(id, inputs)  (shape must match)
//!                          │
//!                          ▼ DeviceRuntime::destroy
//!                       released
//! ```
//!
//! Compiled executables are fixed-shape: the batch signature they were
//! compiled for is the only one they accept.

use std::fmt;

use tensor_core::{DType, ModelInputs, ModelOutputs, Shape, Tensor};

use crate::{DeviceError, MemoryBudget};

// ── Identifiers and signatures ─────────────────────────────────────────────

/// Opaque handle to a device-side executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutableId(pub u64);

impl fmt::Display for ExecutableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exe#{}", self.0)
    }
}

/// The input shape an executable is compiled for.
///
/// Derived from the primary tensor input (the first tensor-valued entry of
/// the inputs in insertion order): its leading dimension and every trailing
/// dimension. Programs whose shape also depends on other inputs (a decoder
/// reading encoder hidden states) record those inputs' full shapes as
/// auxiliary entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchSignature {
    batch_size: usize,
    trailing: Vec<usize>,
    /// `(input name, dims)`, sorted by name.
    auxiliary: Vec<(String, Vec<usize>)>,
}

impl BatchSignature {
    pub fn new(batch_size: usize, trailing: Vec<usize>) -> Self {
        Self {
            batch_size,
            trailing,
            auxiliary: Vec::new(),
        }
    }

    /// Signature of a single shape. Scalars map to batch size 1.
    pub fn from_shape(shape: &Shape) -> Self {
        Self::new(shape.batch_size().unwrap_or(1), shape.trailing_dims().to_vec())
    }

    /// Signature of a set of inputs, `None` when no input is a tensor.
    pub fn of(inputs: &ModelInputs) -> Option<Self> {
        inputs
            .primary_tensor()
            .map(|(_, t)| Self::from_shape(t.shape()))
    }

    /// Adds the shape of input `name` to the signature.
    pub fn with_input(mut self, name: impl Into<String>, shape: &Shape) -> Self {
        let name = name.into();
        self.auxiliary.retain(|(n, _)| *n != name);
        self.auxiliary.push((name, shape.dims().to_vec()));
        self.auxiliary.sort();
        self
    }

    /// The signature `inputs` present, reading the same auxiliary inputs as
    /// `self`. A missing auxiliary input is recorded with no dimensions.
    pub fn observed(&self, inputs: &ModelInputs) -> Option<Self> {
        let mut observed = Self::of(inputs)?;
        observed.auxiliary = self
            .auxiliary
            .iter()
            .map(|(name, _)| {
                let dims = inputs
                    .get_tensor(name)
                    .map(|t| t.shape().dims().to_vec())
                    .unwrap_or_default();
                (name.clone(), dims)
            })
            .collect();
        Some(observed)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn trailing_dims(&self) -> &[usize] {
        &self.trailing
    }

    /// Auxiliary input shapes, sorted by input name.
    pub fn auxiliary(&self) -> &[(String, Vec<usize>)] {
        &self.auxiliary
    }

    /// Sequence length for `[batch, seq, ..]` inputs, 1 otherwise.
    pub fn sequence_length(&self) -> usize {
        self.trailing.first().copied().unwrap_or(1)
    }

    /// Full shape `[batch, trailing..]` of the primary input.
    pub fn to_shape(&self) -> Shape {
        let mut dims = Vec::with_capacity(self.trailing.len() + 1);
        dims.push(self.batch_size);
        dims.extend_from_slice(&self.trailing);
        Shape::new(dims)
    }
}

impl fmt::Display for BatchSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_shape())?;
        for (name, dims) in &self.auxiliary {
            write!(f, " {name}={}", Shape::new(dims.clone()))?;
        }
        Ok(())
    }
}

// ── Compile options ────────────────────────────────────────────────────────

/// Numeric precision an executable is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// f16 weights and activations.
    Half,
    /// f32 weights and activations.
    #[default]
    Full,
}

impl Precision {
    pub fn from_half_flag(fp16: bool) -> Self {
        if fp16 {
            Precision::Half
        } else {
            Precision::Full
        }
    }

    pub fn is_half(self) -> bool {
        self == Precision::Half
    }

    /// Element type of floating-point weights and activations.
    pub fn float_dtype(self) -> DType {
        match self {
            Precision::Half => DType::F16,
            Precision::Full => DType::F32,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Half => write!(f, "fp16"),
            Precision::Full => write!(f, "fp32"),
        }
    }
}

/// How the stages of a sharded program are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// One stage active at a time; the only mode used for inference.
    #[default]
    Sharded,
    /// Stages overlap on successive micro-batches.
    Pipelined,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Sharded => write!(f, "sharded"),
            ExecutionStrategy::Pipelined => write!(f, "pipelined"),
        }
    }
}

/// Runtime options baked into an executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub strategy: ExecutionStrategy,
    pub device_iterations: usize,
    pub replication_factor: usize,
    pub enable_half_partials: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategy::Sharded,
            device_iterations: 1,
            replication_factor: 1,
            enable_half_partials: false,
        }
    }
}

// ── Program description ────────────────────────────────────────────────────

/// One named output of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: String,
    /// Size of the last output dimension.
    pub width: usize,
    /// `true` for `[batch, seq, width]` outputs, `false` for `[batch, width]`.
    pub per_token: bool,
}

/// A lowered model ready to hand to the device compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    pub name: String,
    /// Weight bytes resident on each device, indexed by device.
    pub stage_weight_bytes: Vec<usize>,
    /// Activation memory needed per sample on every device.
    pub activation_bytes_per_sample: usize,
    pub outputs: Vec<OutputSpec>,
}

impl ProgramSpec {
    /// Number of devices the program spans.
    pub fn num_devices(&self) -> usize {
        self.stage_weight_bytes.len()
    }

    pub fn total_weight_bytes(&self) -> usize {
        self.stage_weight_bytes.iter().sum()
    }
}

/// Everything the device compiler needs for one executable.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub program: &'a ProgramSpec,
    pub signature: &'a BatchSignature,
    pub precision: Precision,
    pub options: &'a ExecutionOptions,
}

// ── Runtime trait ──────────────────────────────────────────────────────────

/// An accelerator runtime.
///
/// Implementations are shared behind `Arc` and use interior mutability.
/// `compile` may be expensive and may fail; `execute` only accepts inputs
/// whose [`BatchSignature`] equals the compiled one.
pub trait DeviceRuntime: Send + Sync + fmt::Debug {
    /// Human-readable runtime name.
    fn name(&self) -> &str;

    /// Number of attached devices.
    fn num_devices(&self) -> usize;

    /// Memory available on each device.
    fn memory_per_device(&self) -> MemoryBudget;

    /// Compiles a program for a fixed input signature and precision.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<ExecutableId, DeviceError>;

    /// Runs a compiled executable.
    fn execute(&self, id: ExecutableId, inputs: &ModelInputs) -> Result<ModelOutputs, DeviceError>;

    /// Releases a compiled executable and its device memory.
    fn destroy(&self, id: ExecutableId) -> Result<(), DeviceError>;

    /// Casts a floating-point tensor to half precision.
    fn cast_half(&self, tensor: &Tensor) -> Result<Tensor, DeviceError> {
        Ok(tensor.to_half()?)
    }
}
