// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline call metrics.
//!
//! [`PipelineMetrics`] counts recompilation decisions and accumulates the
//! time spent in each stage of a call. The compile/reuse ratio is the main
//! signal for whether a pipeline's inputs are shape-stable.

use std::time::Duration;

use crate::RecompileDecision;

/// Counters and timings for one pipeline.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipelineMetrics {
    /// Completed calls.
    pub calls: u64,
    /// Forward dispatches, including direct `forward` calls.
    pub forwards: u64,
    /// Forwards that found nothing compiled.
    pub compiles: u64,
    /// Forwards served by the live executable.
    pub reuses: u64,
    /// Executables destroyed because the batch signature changed.
    pub evictions: u64,
    /// Inputs cast to half precision.
    pub tensors_cast: u64,
    pub preprocess_duration: Duration,
    pub forward_duration: Duration,
    pub postprocess_duration: Duration,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the controller's decision for one forward.
    pub fn record_decision(&mut self, decision: &RecompileDecision) {
        self.forwards += 1;
        match decision {
            RecompileDecision::NotApplicable => {}
            RecompileDecision::Compile => self.compiles += 1,
            RecompileDecision::Reuse => self.reuses += 1,
            RecompileDecision::Evicted { .. } => {
                self.evictions += 1;
                self.compiles += 1;
            }
        }
    }

    pub fn record_cast(&mut self, tensors: usize) {
        self.tensors_cast += tensors as u64;
    }

    pub fn record_forward(&mut self, elapsed: Duration) {
        self.forward_duration += elapsed;
    }

    /// Records a completed call.
    pub fn record_call(&mut self, preprocess: Duration, postprocess: Duration) {
        self.calls += 1;
        self.preprocess_duration += preprocess;
        self.postprocess_duration += postprocess;
    }

    pub fn total_duration(&self) -> Duration {
        self.preprocess_duration + self.forward_duration + self.postprocess_duration
    }

    /// Share of controlled forwards that reused the live executable.
    pub fn reuse_ratio(&self) -> f64 {
        let controlled = self.compiles + self.reuses;
        if controlled == 0 {
            return 0.0;
        }
        self.reuses as f64 / controlled as f64
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "Pipeline: {} calls, {} forwards ({} compiles, {} reuses, {} evictions, {:.0}% reuse), \
             {} tensors cast, {:.2}ms total ({:.2}ms pre, {:.2}ms forward, {:.2}ms post)",
            self.calls,
            self.forwards,
            self.compiles,
            self.reuses,
            self.evictions,
            self.reuse_ratio() * 100.0,
            self.tensors_cast,
            self.total_duration().as_secs_f64() * 1000.0,
            self.preprocess_duration.as_secs_f64() * 1000.0,
            self.forward_duration.as_secs_f64() * 1000.0,
            self.postprocess_duration.as_secs_f64() * 1000.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_runtime::BatchSignature;

    #[test]
    fn test_empty_metrics() {
        let m = PipelineMetrics::new();
        assert_eq!(m.reuse_ratio(), 0.0);
        assert_eq!(m.total_duration(), Duration::ZERO);
    }

    #[test]
    fn test_record_decisions() {
        let mut m = PipelineMetrics::new();
        m.record_decision(&RecompileDecision::Compile);
        m.record_decision(&RecompileDecision::Reuse);
        m.record_decision(&RecompileDecision::Reuse);
        m.record_decision(&RecompileDecision::Evicted {
            previous: BatchSignature::new(1, vec![8]),
            next: BatchSignature::new(4, vec![8]),
        });
        m.record_decision(&RecompileDecision::NotApplicable);
        assert_eq!((m.forwards, m.compiles, m.reuses, m.evictions), (5, 2, 2, 1));
        assert!((m.reuse_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_summary_format() {
        let mut m = PipelineMetrics::new();
        m.record_decision(&RecompileDecision::Compile);
        m.record_cast(2);
        m.record_forward(Duration::from_millis(4));
        m.record_call(Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(m.total_duration(), Duration::from_millis(6));
        let s = m.summary();
        assert!(s.contains("1 calls"));
        assert!(s.contains("1 compiles"));
        assert!(s.contains("2 tensors cast"));
    }
}
