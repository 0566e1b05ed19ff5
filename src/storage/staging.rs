//! # Staging Ring
//!
//! Bounded FIFO of sealed records waiting to be persisted.
//!
//! Snapshots are refused once the ring is full; the control loop reacts by
//! switching to saving mode and draining the ring in one go.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::telemetry::record::{AccumulationRecord, StagedRecord};

/// Default number of records staged between flushes
pub const DEFAULT_STAGING_DEPTH: usize = 4;

/// Fixed-depth staging FIFO
#[derive(Debug)]
pub struct StagingRing {
    records: VecDeque<StagedRecord>,
    depth: usize,
}

impl Default for StagingRing {
    fn default() -> Self {
        Self::new(DEFAULT_STAGING_DEPTH)
    }
}

impl StagingRing {
    /// Create an empty ring holding at most `depth` records (minimum 1)
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            records: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Seal and append a snapshot of `record`.
    ///
    /// Returns `false` without touching the ring when it is full.
    pub fn snapshot(&mut self, record: &AccumulationRecord) -> bool {
        if self.is_full() {
            warn!("Staging ring full, snapshot at {} ms dropped", record.time_since_boot_ms());
            return false;
        }
        self.records.push_back(record.seal());
        true
    }

    /// Hand every staged record to `sink` in arrival order, leaving the ring
    /// empty. Returns the number of records drained.
    pub fn drain_all<F>(&mut self, mut sink: F) -> usize
    where
        F: FnMut(&StagedRecord),
    {
        let count = self.records.len();
        for record in self.records.drain(..) {
            sink(&record);
        }
        debug!("Drained {} staged record(s)", count);
        count
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::catalogue::{Catalogue, CatalogueEntry, DeviceDescriptor, Value, ValueType};

    static ENTRIES: [CatalogueEntry; 1] = [CatalogueEntry::new("v", 0x180, 0x2000, 1, 0, ValueType::U16, "")];
    static DEVICES: [DeviceDescriptor; 1] = [DeviceDescriptor {
        name: "DEV",
        node_id: 0x10,
        entries: &ENTRIES,
    }];

    fn record_at(time_ms: u32, value: u16) -> AccumulationRecord {
        let mut record = AccumulationRecord::new(&Catalogue::new(&DEVICES));
        record.advance_time(time_ms);
        record.set(0, Value::U16(value));
        record
    }

    #[test]
    fn test_full_ring_refuses_snapshot_without_mutation() {
        let mut ring = StagingRing::new(4);
        for i in 0..4 {
            assert!(ring.snapshot(&record_at(i * 1000, i as u16)));
        }
        assert!(ring.is_full());

        assert!(!ring.snapshot(&record_at(9999, 99)));
        assert_eq!(ring.len(), 4);

        let mut times = Vec::new();
        ring.drain_all(|r| times.push(r.time_since_boot_ms()));
        assert_eq!(times, vec![0, 1000, 2000, 3000]);
    }

    #[test]
    fn test_drain_is_fifo_and_empties_ring() {
        let mut ring = StagingRing::new(3);
        ring.snapshot(&record_at(1, 10));
        ring.snapshot(&record_at(2, 20));
        ring.snapshot(&record_at(3, 30));

        let mut values = Vec::new();
        let drained = ring.drain_all(|r| values.push(r.values()[0]));

        assert_eq!(drained, 3);
        assert_eq!(values, vec![Value::U16(10), Value::U16(20), Value::U16(30)]);
        assert!(ring.is_empty());
        assert!(!ring.is_full());
    }

    #[test]
    fn test_snapshot_is_sealed_copy() {
        let mut ring = StagingRing::default();
        let mut record = record_at(5, 1);
        ring.snapshot(&record);
        record.set(0, Value::U16(2));

        ring.drain_all(|r| {
            assert_eq!(r.values()[0], Value::U16(1));
            assert!(r.verify());
        });
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        let ring = StagingRing::new(0);
        assert_eq!(ring.depth(), 1);
        assert_eq!(StagingRing::default().depth(), DEFAULT_STAGING_DEPTH);
    }
}
