//! # Telemetry Records
//!
//! The live accumulation record and immutable staged snapshots of it.

use crc32fast::Hasher;
use serde::Deserialize;

use super::catalogue::{Catalogue, Value};

/// How the accumulation record is reset after each snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearPolicy {
    /// Every slot becomes zero
    #[default]
    Zero,
    /// Every slot becomes all-ones, marking "not received this period"
    Ones,
    /// Slots keep their last decoded value
    Keep,
}

/// Live record of the latest decoded value of every catalogue entry
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationRecord {
    time_since_boot_ms: u32,
    values: Vec<Value>,
}

impl AccumulationRecord {
    /// Zeroed record with one typed slot per catalogue entry
    pub fn new(catalogue: &Catalogue) -> Self {
        let values = catalogue.entries().map(|entry| Value::from_raw(entry.value_type, 0)).collect();
        Self {
            time_since_boot_ms: 0,
            values,
        }
    }

    pub fn time_since_boot_ms(&self) -> u32 {
        self.time_since_boot_ms
    }

    /// Advance time since boot, wrapping at `u32::MAX`
    pub fn advance_time(&mut self, ms: u32) {
        self.time_since_boot_ms = self.time_since_boot_ms.wrapping_add(ms);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// Overwrite one slot. Out-of-range columns are ignored.
    pub fn set(&mut self, column: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(column) {
            *slot = value;
        }
    }

    pub fn clear(&mut self, policy: ClearPolicy) {
        let raw = match policy {
            ClearPolicy::Zero => 0,
            ClearPolicy::Ones => u32::MAX,
            ClearPolicy::Keep => return,
        };
        for slot in &mut self.values {
            *slot = Value::from_raw(slot.value_type(), raw);
        }
    }

    /// Take an immutable snapshot sealed with a checksum
    pub fn seal(&self) -> StagedRecord {
        let checksum = checksum(self.time_since_boot_ms, &self.values);
        StagedRecord {
            time_since_boot_ms: self.time_since_boot_ms,
            values: self.values.clone().into_boxed_slice(),
            checksum,
        }
    }
}

/// Immutable snapshot awaiting persistence
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecord {
    time_since_boot_ms: u32,
    values: Box<[Value]>,
    checksum: u32,
}

impl StagedRecord {
    pub fn time_since_boot_ms(&self) -> u32 {
        self.time_since_boot_ms
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Recompute the checksum and compare with the sealed one
    pub fn verify(&self) -> bool {
        checksum(self.time_since_boot_ms, &self.values) == self.checksum
    }
}

/// CRC-32 over the time word and each slot's raw word, all little-endian
fn checksum(time_since_boot_ms: u32, values: &[Value]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&time_since_boot_ms.to_le_bytes());
    for value in values {
        hasher.update(&value.raw_word().to_le_bytes());
    }
    hasher.finalize()
}
