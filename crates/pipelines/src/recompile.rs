// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-call shape check for bound executors.
//!
//! # Decision Table
//!
//! | Binding | Executor state | Signature | Decision |
//! |---|---|---|---|
//! | `Raw`, `Generative` | - | - | `NotApplicable` |
//! | `Bound`, generation task | - | - | `NotApplicable` |
//! | `Bound` | uncompiled / stale | any | `Compile` |
//! | `Bound` | compiled for `s` | `s` | `Reuse` |
//! | `Bound` | compiled for `s` | `s2 != s` | `Evicted { s, s2 }` |
//!
//! `Evicted` destroys the executable before returning, so the forward that
//! follows compiles for the new signature into an empty slot.

use std::fmt;

use device_runtime::BatchSignature;
use tensor_core::ModelInputs;
use tracing::debug;

use crate::binding::ModelBinding;
use crate::PipelineError;

/// What the controller did before a forward call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecompileDecision {
    /// The binding manages its own executables, or none.
    NotApplicable,
    /// Nothing is compiled; the forward compiles lazily.
    Compile,
    /// The live executable matches.
    Reuse,
    /// The live executable was destroyed; the forward recompiles.
    Evicted {
        previous: BatchSignature,
        next: BatchSignature,
    },
}

impl RecompileDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecompileDecision::NotApplicable => "not-applicable",
            RecompileDecision::Compile => "compile",
            RecompileDecision::Reuse => "reuse",
            RecompileDecision::Evicted { .. } => "evicted",
        }
    }

    /// `true` when the next forward compiles.
    pub fn will_compile(&self) -> bool {
        matches!(self, RecompileDecision::Compile | RecompileDecision::Evicted { .. })
    }
}

impl fmt::Display for RecompileDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecompileDecision::Evicted { previous, next } => {
                write!(f, "evicted {previous} -> {next}")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// Stateless recompilation controller.
#[derive(Debug, Clone, Copy)]
pub struct RecompilationController {
    generation_task: bool,
}

impl RecompilationController {
    pub fn new(generation_task: bool) -> Self {
        Self { generation_task }
    }

    /// Compares the signature of `inputs` with the live executable and
    /// evicts it on mismatch.
    pub fn before_forward(
        &self,
        binding: &mut ModelBinding,
        inputs: &ModelInputs,
    ) -> Result<RecompileDecision, PipelineError> {
        let executor = match binding {
            ModelBinding::Bound(executor) if !self.generation_task => executor,
            ModelBinding::Bound(_) | ModelBinding::Raw(_) | ModelBinding::Generative(_) => {
                return Ok(RecompileDecision::NotApplicable)
            }
        };
        let next = BatchSignature::of(inputs)
            .ok_or_else(|| PipelineError::InvalidInput("inputs contain no tensor".into()))?;

        let previous = match executor.compiled_signature() {
            None => return Ok(RecompileDecision::Compile),
            Some(current) if *current == next => return Ok(RecompileDecision::Reuse),
            Some(current) => current.clone(),
        };
        debug!(
            model = executor.model().id(),
            %previous,
            %next,
            "batch signature changed, evicting executable"
        );
        executor.evict()?;
        Ok(RecompileDecision::Evicted { previous, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::fixtures::*;
    use device_runtime::Precision;

    #[test]
    fn test_decisions_for_bound_executor() {
        let device = device();
        let mut binding = bind(&device, classifier(), "text-classification", Precision::Full);
        let controller = RecompilationController::new(false);

        let first = ids(1, 8);
        assert_eq!(
            controller.before_forward(&mut binding, &first).unwrap(),
            RecompileDecision::Compile
        );
        binding.forward(first.clone()).unwrap();
        assert_eq!(
            controller.before_forward(&mut binding, &first).unwrap(),
            RecompileDecision::Reuse
        );

        let decision = controller.before_forward(&mut binding, &ids(4, 8)).unwrap();
        assert_eq!(
            decision,
            RecompileDecision::Evicted {
                previous: BatchSignature::new(1, vec![8]),
                next: BatchSignature::new(4, vec![8]),
            }
        );
        assert!(decision.will_compile());
        assert_eq!(device.stats().live_executables, 0);
        assert_eq!(decision.to_string(), "evicted [1, 8] -> [4, 8]");
    }

    #[test]
    fn test_not_applicable_bindings() {
        let device = device();
        let controller = RecompilationController::new(false);
        let mut raw = ModelBinding::Raw(classifier());
        assert_eq!(
            controller.before_forward(&mut raw, &ids(1, 4)).unwrap(),
            RecompileDecision::NotApplicable
        );
        let mut generative = bind(&device, t5(), "summarization", Precision::Full);
        assert_eq!(
            controller.before_forward(&mut generative, &ids(1, 4)).unwrap(),
            RecompileDecision::NotApplicable
        );
        let mut bound = bind(&device, classifier(), "text-classification", Precision::Full);
        let for_generation = RecompilationController::new(true);
        assert_eq!(
            for_generation.before_forward(&mut bound, &ids(1, 4)).unwrap(),
            RecompileDecision::NotApplicable
        );
    }

    #[test]
    fn test_no_tensor_input_is_rejected() {
        let device = device();
        let mut binding = bind(&device, classifier(), "text-classification", Precision::Full);
        let inputs = ModelInputs::new().with("max_length", 20i64);
        let err = RecompilationController::new(false)
            .before_forward(&mut binding, &inputs)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
