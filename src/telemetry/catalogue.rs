//! # Telemetry Catalogue Types
//!
//! Compile-time descriptors mapping CANopen-style addresses to named, typed
//! log columns.
//!
//! A [`Catalogue`] is an ordered list of devices, each with an ordered list of
//! entries. The flattened entry order is the column order of every record and
//! every persisted file, so it must never change within a build.

use std::fmt;

/// Maximum length of an entry or device name
pub const MAX_NAME_LEN: usize = 16;

/// Maximum length of a unit label
pub const MAX_UNIT_LEN: usize = 8;

/// Value type tag of a catalogue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    U32,
    I32,
    U16,
    I16,
    U8,
    I8,
    Hex32,
    Hex16,
    Hex8,
}

impl ValueType {
    /// Width of the value in bits
    pub fn width_bits(self) -> u32 {
        match self {
            ValueType::U32 | ValueType::I32 | ValueType::Hex32 => 32,
            ValueType::U16 | ValueType::I16 | ValueType::Hex16 => 16,
            ValueType::U8 | ValueType::I8 | ValueType::Hex8 => 8,
        }
    }

    /// Bit mask covering the value width
    pub fn mask(self) -> u32 {
        match self.width_bits() {
            32 => u32::MAX,
            bits => (1u32 << bits) - 1,
        }
    }
}

/// Typed value held in one record slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    U32(u32),
    I32(i32),
    U16(u16),
    I16(i16),
    U8(u8),
    I8(i8),
    Hex32(u32),
    Hex16(u16),
    Hex8(u8),
}

impl Value {
    /// Build a value of the given type from the low bits of `raw`.
    ///
    /// Signed types are sign-extended from their width.
    ///
    /// # Examples
    ///
    /// ```
    /// use solar_can_logger::telemetry::catalogue::{Value, ValueType};
    ///
    /// assert_eq!(Value::from_raw(ValueType::I16, 0x1234_FFFE), Value::I16(-2));
    /// assert_eq!(Value::from_raw(ValueType::Hex8, 0xABCD), Value::Hex8(0xCD));
    /// ```
    pub fn from_raw(value_type: ValueType, raw: u32) -> Self {
        match value_type {
            ValueType::U32 => Value::U32(raw),
            ValueType::I32 => Value::I32(raw as i32),
            ValueType::U16 => Value::U16(raw as u16),
            ValueType::I16 => Value::I16(raw as u16 as i16),
            ValueType::U8 => Value::U8(raw as u8),
            ValueType::I8 => Value::I8(raw as u8 as i8),
            ValueType::Hex32 => Value::Hex32(raw),
            ValueType::Hex16 => Value::Hex16(raw as u16),
            ValueType::Hex8 => Value::Hex8(raw as u8),
        }
    }

    /// Type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::U32(_) => ValueType::U32,
            Value::I32(_) => ValueType::I32,
            Value::U16(_) => ValueType::U16,
            Value::I16(_) => ValueType::I16,
            Value::U8(_) => ValueType::U8,
            Value::I8(_) => ValueType::I8,
            Value::Hex32(_) => ValueType::Hex32,
            Value::Hex16(_) => ValueType::Hex16,
            Value::Hex8(_) => ValueType::Hex8,
        }
    }

    /// Bit pattern of the value, zero-extended to 32 bits
    pub fn raw_word(&self) -> u32 {
        let raw = match *self {
            Value::U32(v) | Value::Hex32(v) => v,
            Value::I32(v) => v as u32,
            Value::U16(v) | Value::Hex16(v) => v as u32,
            Value::I16(v) => v as u16 as u32,
            Value::U8(v) | Value::Hex8(v) => v as u32,
            Value::I8(v) => v as u8 as u32,
        };
        raw & self.value_type().mask()
    }
}

impl fmt::Display for Value {
    /// Decimal for integer types, upper-case hexadecimal for hex types
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::U32(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::Hex32(v) => write!(f, "{:X}", v),
            Value::Hex16(v) => write!(f, "{:X}", v),
            Value::Hex8(v) => write!(f, "{:X}", v),
        }
    }
}

/// CANopen-style address of one telemetry value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectAddress {
    /// Function code class (COB-ID without node bits)
    pub function_code: u16,
    pub index: u16,
    pub sub_index: u8,
}

/// One named, typed log column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub name: &'static str,
    pub address: ObjectAddress,
    /// Byte offset into the 32-bit value field of the payload
    pub offset: u8,
    pub value_type: ValueType,
    pub unit: &'static str,
}

impl CatalogueEntry {
    pub const fn new(
        name: &'static str,
        function_code: u16,
        index: u16,
        sub_index: u8,
        offset: u8,
        value_type: ValueType,
        unit: &'static str,
    ) -> Self {
        Self {
            name,
            address: ObjectAddress {
                function_code,
                index,
                sub_index,
            },
            offset,
            value_type,
            unit,
        }
    }
}

/// A bus node and the entries logged from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: &'static str,
    pub node_id: u8,
    pub entries: &'static [CatalogueEntry],
}

/// Ordered device list defining the record layout of a logging session
#[derive(Debug, Clone, Copy)]
pub struct Catalogue {
    devices: &'static [DeviceDescriptor],
}

impl Catalogue {
    pub const fn new(devices: &'static [DeviceDescriptor]) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &'static [DeviceDescriptor] {
        self.devices
    }

    /// Total number of entries, i.e. the record width
    pub fn width(&self) -> usize {
        self.devices.iter().map(|d| d.entries.len()).sum()
    }

    /// All entries in column order
    pub fn entries(&self) -> impl Iterator<Item = &'static CatalogueEntry> {
        self.devices.iter().flat_map(|d| d.entries.iter())
    }

    /// Devices paired with the column index of their first entry
    pub fn devices_with_offsets(&self) -> impl Iterator<Item = (usize, &'static DeviceDescriptor)> {
        self.devices.iter().scan(0usize, |offset, device| {
            let start = *offset;
            *offset += device.entries.len();
            Some((start, device))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ENTRIES_A: [CatalogueEntry; 2] = [
        CatalogueEntry::new("a0", 0x180, 0x2000, 1, 0, ValueType::U8, ""),
        CatalogueEntry::new("a1", 0x180, 0x2000, 2, 0, ValueType::I8, ""),
    ];
    static ENTRIES_B: [CatalogueEntry; 1] = [CatalogueEntry::new("b0", 0x280, 0x2000, 1, 0, ValueType::U16, "")];
    static DEVICES: [DeviceDescriptor; 2] = [
        DeviceDescriptor { name: "A", node_id: 1, entries: &ENTRIES_A },
        DeviceDescriptor { name: "B", node_id: 2, entries: &ENTRIES_B },
    ];

    #[test]
    fn test_width_and_offsets() {
        let catalogue = Catalogue::new(&DEVICES);
        assert_eq!(catalogue.width(), 3);

        let offsets: Vec<(usize, &str)> = catalogue
            .devices_with_offsets()
            .map(|(offset, device)| (offset, device.name))
            .collect();
        assert_eq!(offsets, vec![(0, "A"), (2, "B")]);

        let names: Vec<&str> = catalogue.entries().map(|e| e.name).collect();
        assert_eq!(names, vec!["a0", "a1", "b0"]);
    }

    #[test]
    fn test_signed_values_sign_extend() {
        assert_eq!(Value::from_raw(ValueType::I8, 0x80), Value::I8(-128));
        assert_eq!(Value::from_raw(ValueType::I16, 0x8000), Value::I16(-32768));
        assert_eq!(Value::from_raw(ValueType::I32, 0xFFFF_FFFF), Value::I32(-1));
    }

    #[test]
    fn test_raw_word_masks_to_width() {
        assert_eq!(Value::I8(-1).raw_word(), 0xFF);
        assert_eq!(Value::I16(-2).raw_word(), 0xFFFE);
        assert_eq!(Value::Hex32(0xDEAD_BEEF).raw_word(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(Value::I16(-250).to_string(), "-250");
        assert_eq!(Value::U32(4_000_000_000).to_string(), "4000000000");
        assert_eq!(Value::Hex32(0x00AB_CDEF).to_string(), "ABCDEF");
        assert_eq!(Value::Hex8(0).to_string(), "0");
    }

    #[test]
    fn test_masks() {
        assert_eq!(ValueType::U8.mask(), 0xFF);
        assert_eq!(ValueType::Hex16.mask(), 0xFFFF);
        assert_eq!(ValueType::I32.mask(), 0xFFFF_FFFF);
    }
}
