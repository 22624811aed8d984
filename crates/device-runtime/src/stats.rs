// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device usage statistics for diagnostics and tests.
//!
//! [`DeviceStats`] tracks how often a runtime compiled, executed and
//! destroyed executables, plus the live and peak executable counts.
//! Compile and destroy counts are what the recompilation cache is judged by.

/// Cumulative statistics about a device runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeviceStats {
    /// Successful compilations.
    pub compiles: u64,
    /// Compilations rejected by the compiler or for lack of memory.
    pub compile_failures: u64,
    /// Executables released.
    pub destroys: u64,
    /// Forward passes run.
    pub executions: u64,
    /// Executables currently resident.
    pub live_executables: usize,
    /// High-water mark of resident executables.
    pub peak_live_executables: usize,
    /// Compilations that failed for lack of device memory.
    pub oom_count: u64,
}

impl DeviceStats {
    pub(crate) fn record_compile(&mut self) {
        self.compiles += 1;
        self.live_executables += 1;
        if self.live_executables > self.peak_live_executables {
            self.peak_live_executables = self.live_executables;
        }
    }

    pub(crate) fn record_compile_failure(&mut self, oom: bool) {
        self.compile_failures += 1;
        if oom {
            self.oom_count += 1;
        }
    }

    pub(crate) fn record_destroy(&mut self) {
        self.destroys += 1;
        self.live_executables = self.live_executables.saturating_sub(1);
    }

    pub(crate) fn record_execution(&mut self) {
        self.executions += 1;
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Compiles: {} ({} failed, {} OOM), destroys: {}, executions: {}, \
             live: {} (peak {})",
            self.compiles,
            self.compile_failures,
            self.oom_count,
            self.destroys,
            self.executions,
            self.live_executables,
            self.peak_live_executables,
        )
    }
}
