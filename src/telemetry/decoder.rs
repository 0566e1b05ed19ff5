//! # Telemetry Decoder
//!
//! Matches received frames against the catalogue and writes decoded values
//! into the accumulation record.
//!
//! ## Payload Layout
//!
//! ```text
//! byte:  0      1   2     3        4  5  6  7
//!        node   index LE  sub-idx  value (u32 LE)
//! ```
//!
//! The node id and function code come from the frame identifier
//! (`id & 0x7F` and `id & !0x7F`). Nodes `0x04..=0x09` are legacy converters
//! that send two IEEE-754 floats per frame instead; see [`LEGACY_FLOAT_NODES`].

use std::ops::RangeInclusive;

use tracing::trace;

use super::catalogue::{Catalogue, Value, ValueType};
use super::record::AccumulationRecord;
use crate::can::frame::{CanFrame, FrameKind};

/// Node ids decoded with the float path
pub const LEGACY_FLOAT_NODES: RangeInclusive<u8> = 0x04..=0x09;

/// Where a float carried by a legacy frame lands and how it is scaled
#[derive(Debug, Clone, Copy)]
struct FloatField {
    /// Byte offset of the float in the payload
    byte: usize,
    /// Slot relative to the device's first column
    slot: usize,
    scale: Scale,
}

#[derive(Debug, Clone, Copy)]
enum Scale {
    Mul(f32),
    Div(f32),
}

impl Scale {
    fn apply(self, value: f32) -> f32 {
        match self {
            Scale::Mul(factor) => value * factor,
            Scale::Div(divisor) => value / divisor,
        }
    }
}

/// Float layout for function code 0x180: current in, voltage in
const LEGACY_0X180: [FloatField; 2] = [
    FloatField { byte: 0, slot: 1, scale: Scale::Mul(1.0) },
    FloatField { byte: 4, slot: 0, scale: Scale::Mul(1000.0) },
];

/// Float layout for function code 0x280: voltage out, power in
const LEGACY_0X280: [FloatField; 2] = [
    FloatField { byte: 0, slot: 3, scale: Scale::Mul(1000.0) },
    FloatField { byte: 4, slot: 2, scale: Scale::Div(100.0) },
];

/// Address fields extracted from a data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Address {
    node_id: u8,
    function_code: u32,
    index: u16,
    sub_index: u8,
}

impl Address {
    fn from_frame(frame: &CanFrame) -> Self {
        let data = frame.payload();
        Self {
            node_id: frame.node_id(),
            function_code: frame.function_code(),
            index: u16::from_le_bytes([data[1], data[2]]),
            sub_index: data[3],
        }
    }
}

/// Descriptor-driven decoder owning the accumulation record
#[derive(Debug, Clone)]
pub struct TelemetryDecoder {
    catalogue: Catalogue,
    record: AccumulationRecord,
}

impl TelemetryDecoder {
    pub fn new(catalogue: Catalogue) -> Self {
        Self {
            record: AccumulationRecord::new(&catalogue),
            catalogue,
        }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn record(&self) -> &AccumulationRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut AccumulationRecord {
        &mut self.record
    }

    /// Decode one frame into the accumulation record.
    ///
    /// Every matching entry of every matching device is updated; frames
    /// that match nothing are ignored. Remote frames carry no value and are
    /// always ignored.
    pub fn decode(&mut self, frame: &CanFrame) {
        if frame.kind() == FrameKind::Remote {
            return;
        }

        let address = Address::from_frame(frame);
        let data = frame.payload();
        let raw = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let mut matched = false;

        for (start, device) in self.catalogue.devices_with_offsets() {
            if device.node_id != address.node_id {
                continue;
            }

            if LEGACY_FLOAT_NODES.contains(&address.node_id) {
                matched |= decode_legacy_floats(&mut self.record, start, device.entries.len(), address, data);
                continue;
            }

            for (slot, entry) in device.entries.iter().enumerate() {
                let target = entry.address;
                if u32::from(target.function_code) == address.function_code
                    && target.index == address.index
                    && target.sub_index == address.sub_index
                {
                    self.record.set(start + slot, extract(raw, entry.offset, entry.value_type));
                    matched = true;
                }
            }
        }

        if !matched {
            trace!(
                "Unmatched frame id=0x{:X} index=0x{:04X} sub=0x{:02X}",
                frame.raw_id(),
                address.index,
                address.sub_index
            );
        }
    }
}

/// Shift the 32-bit value field right by `offset` bytes and type it
fn extract(raw: u32, offset: u8, value_type: ValueType) -> Value {
    let shifted = (u64::from(raw) >> (u32::from(offset) * 8).min(63)) as u32;
    Value::from_raw(value_type, shifted & value_type.mask())
}

fn decode_legacy_floats(
    record: &mut AccumulationRecord,
    start: usize,
    width: usize,
    address: Address,
    data: &[u8; 8],
) -> bool {
    let fields: &[FloatField] = match address.function_code {
        0x180 => &LEGACY_0X180,
        0x280 => &LEGACY_0X280,
        _ => return false,
    };

    for field in fields {
        if field.slot >= width {
            continue;
        }
        let bits = u32::from_le_bytes([
            data[field.byte],
            data[field.byte + 1],
            data[field.byte + 2],
            data[field.byte + 3],
        ]);
        let scaled = field.scale.apply(f32::from_bits(bits));
        // Truncate toward zero; negative values keep their two's-complement low word
        let word = scaled as i64 as u32;
        record.set(start + field.slot, Value::U32(word));
    }
    true
}
