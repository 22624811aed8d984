// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! On-chip memory available to resident executables on one device.

use std::fmt;

use crate::DeviceError;

const UNITS: [(&str, usize); 4] = [
    ("G", 1 << 30),
    ("M", 1 << 20),
    ("K", 1 << 10),
    ("", 1),
];

/// Bytes of executable memory on a single device.
///
/// Parsed from strings such as `"512M"`, `"1GB"`, `"64k"` or a bare byte
/// count. Units are binary and the trailing `B` is optional.
///
/// ```
/// use device_runtime::MemoryBudget;
///
/// assert_eq!(MemoryBudget::parse("1G").unwrap(), MemoryBudget::from_mb(1024));
/// assert_eq!(MemoryBudget::from_mb(900).to_string(), "900 MB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb << 20 }
    }

    pub fn from_gb(gb: usize) -> Self {
        Self { bytes: gb << 30 }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Whether `bytes` more fit on top of `used`.
    pub fn fits(&self, used: usize, bytes: usize) -> bool {
        used.checked_add(bytes).is_some_and(|total| total <= self.bytes)
    }

    /// Parses `"<n>[K|M|G][B]"`, case-insensitively. Zero is rejected.
    pub fn parse(s: &str) -> Result<Self, DeviceError> {
        let invalid = |why: &str| DeviceError::InvalidBudget(format!("'{s}': {why}"));
        let upper = s.trim().to_ascii_uppercase();
        let digits_end = upper
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(upper.len());
        let (number, unit) = upper.split_at(digits_end);
        if number.is_empty() {
            return Err(invalid("expected a number with an optional K, M or G unit"));
        }
        let unit = unit.trim();
        let unit = unit.strip_suffix('B').unwrap_or(unit);
        let multiplier = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, m)| *m)
            .ok_or_else(|| invalid("unknown unit"))?;
        let value: usize = number.parse().map_err(|_| invalid("number out of range"))?;
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("overflows"))?;
        if bytes == 0 {
            return Err(invalid("budget is zero"));
        }
        Ok(Self { bytes })
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LABELS: [&str; 4] = ["GB", "MB", "KB", "B"];
        for ((_, size), label) in UNITS.iter().zip(LABELS) {
            if self.bytes >= *size && self.bytes % size == 0 {
                return write!(f, "{} {label}", self.bytes / size);
            }
        }
        write!(f, "{} B", self.bytes)
    }
}
