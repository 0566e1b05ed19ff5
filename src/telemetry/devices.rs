//! # Logged Devices
//!
//! The reference vehicle's device list. Column order of every log file
//! follows this list, device by device, entry by entry.

use super::catalogue::{Catalogue, CatalogueEntry, DeviceDescriptor, ValueType::*};

/// Node id of this logger (GPS messages are sent from it)
pub const GPS_NODE_ID: u8 = 0x30;

/// Sunflare maximum power point trackers
pub static SUNFLARE_MPPT_ENTRIES: [CatalogueEntry; 7] = [
    CatalogueEntry::new("mppt status", 0x180, 0x2000, 0x01, 0, Hex32, ""),
    CatalogueEntry::new("solar voltage", 0x280, 0x2000, 0x01, 0, U16, "mV"),
    CatalogueEntry::new("solar current", 0x280, 0x2001, 0x01, 0, U16, "mA"),
    CatalogueEntry::new("ch1 current", 0x280, 0x2002, 0x01, 0, U16, "mA"),
    CatalogueEntry::new("ch2 current", 0x280, 0x2003, 0x01, 0, U16, "mA"),
    CatalogueEntry::new("solar power", 0x280, 0x2004, 0x01, 0, U32, "mW"),
    CatalogueEntry::new("batt voltage", 0x280, 0x2005, 0x01, 0, U16, "mV"),
];

/// Motor controller
pub static MOTOR_CONTROLLER_ENTRIES: [CatalogueEntry; 9] = [
    CatalogueEntry::new("sls status", 0x180, 0x2000, 0x01, 0, Hex32, ""),
    CatalogueEntry::new("temp power", 0x280, 0x2000, 0x01, 0, I16, "100mdegC"),
    CatalogueEntry::new("temp electronics", 0x280, 0x2000, 0x02, 0, I16, "100mdegC"),
    CatalogueEntry::new("temp motor 1", 0x280, 0x2001, 0x01, 0, I16, "100mdegC"),
    CatalogueEntry::new("temp motor 2", 0x280, 0x2001, 0x02, 0, I16, "100mdegC"),
    CatalogueEntry::new("UZK", 0x380, 0x2000, 0x01, 0, U16, "10mV"),
    CatalogueEntry::new("motor current", 0x380, 0x2001, 0x01, 0, I16, "100mA"),
    CatalogueEntry::new("input current", 0x380, 0x2002, 0x01, 0, I16, "100mA"),
    CatalogueEntry::new("rpm", 0x380, 0x2003, 0x01, 0, U16, "rpm"),
];

/// Hydrofoil height controller
pub static HYDROFOIL_CONTROLLER_ENTRIES: [CatalogueEntry; 2] = [
    CatalogueEntry::new("input pos 1", 0x280, 0x2000, 0x01, 0, U16, "raw"),
    CatalogueEntry::new("output pos 1", 0x280, 0x2001, 0x01, 0, U16, "raw"),
];

/// GPS readings, looped back from this logger's own transmissions
pub static GPS_ENTRIES: [CatalogueEntry; 8] = [
    CatalogueEntry::new("time", 0x180, 0x2000, 0x01, 0, U32, ""),
    CatalogueEntry::new("latitude", 0x180, 0x2001, 0x01, 0, U32, "deg"),
    CatalogueEntry::new("latitude", 0x180, 0x2001, 0x02, 0, U32, "10umin"),
    CatalogueEntry::new("longitude", 0x180, 0x2002, 0x01, 0, U32, "deg"),
    CatalogueEntry::new("longitude", 0x180, 0x2002, 0x02, 0, U32, "10umin"),
    CatalogueEntry::new("speed", 0x280, 0x2000, 0x01, 0, U16, "10m/h"),
    CatalogueEntry::new("direction", 0x280, 0x2001, 0x01, 0, U16, "100mdeg"),
    CatalogueEntry::new("satellites", 0x380, 0x2000, 0x01, 0, U16, ""),
];

/// Battery management system
pub static MG_BATTERY_ENTRIES: [CatalogueEntry; 6] = [
    CatalogueEntry::new("voltage", 0x300, 0x2005, 0x01, 0, U16, "mV"),
    CatalogueEntry::new("current", 0x300, 0x2005, 0x02, 0, I16, "10mA"),
    CatalogueEntry::new("discharge amps", 0x300, 0x2005, 0x03, 0, I16, "10mA"),
    CatalogueEntry::new("charge amps", 0x300, 0x2005, 0x04, 0, I16, "10mA"),
    CatalogueEntry::new("soc", 0x300, 0x2005, 0x05, 0, U8, "%"),
    CatalogueEntry::new("time to go", 0x300, 0x2005, 0x07, 0, U16, "min"),
];

/// Legacy converters. These nodes send IEEE floats and are decoded by the
/// float path; the addresses here only serve as column descriptors.
pub static MG_MPPT_ENTRIES: [CatalogueEntry; 4] = [
    CatalogueEntry::new("voltage in", 0x001, 0x0001, 0x01, 0, U32, "mV"),
    CatalogueEntry::new("current in", 0x002, 0x0002, 0x02, 0, U32, "mA"),
    CatalogueEntry::new("power in", 0x003, 0x0003, 0x03, 0, U32, "mW"),
    CatalogueEntry::new("voltage out", 0x004, 0x0004, 0x04, 0, U32, "mV"),
];

/// Device list of the reference vehicle
pub static DEVICE_LIST: [DeviceDescriptor; 11] = [
    DeviceDescriptor { name: "MPPT01", node_id: 0x20, entries: &SUNFLARE_MPPT_ENTRIES },
    DeviceDescriptor { name: "MPPT02", node_id: 0x21, entries: &SUNFLARE_MPPT_ENTRIES },
    DeviceDescriptor { name: "MPPT05", node_id: 0x24, entries: &SUNFLARE_MPPT_ENTRIES },
    DeviceDescriptor { name: "MPPT06", node_id: 0x25, entries: &SUNFLARE_MPPT_ENTRIES },
    DeviceDescriptor { name: "MOTOR", node_id: 0x10, entries: &MOTOR_CONTROLLER_ENTRIES },
    DeviceDescriptor { name: "HYDRO", node_id: 0x11, entries: &HYDROFOIL_CONTROLLER_ENTRIES },
    DeviceDescriptor { name: "GPS", node_id: GPS_NODE_ID, entries: &GPS_ENTRIES },
    DeviceDescriptor { name: "BATT", node_id: 0x02, entries: &MG_BATTERY_ENTRIES },
    DeviceDescriptor { name: "MPPT05", node_id: 0x04, entries: &MG_MPPT_ENTRIES },
    DeviceDescriptor { name: "MPPT06", node_id: 0x05, entries: &MG_MPPT_ENTRIES },
    DeviceDescriptor { name: "MPPT07", node_id: 0x06, entries: &MG_MPPT_ENTRIES },
];

/// Catalogue over [`DEVICE_LIST`]
pub fn vehicle_catalogue() -> Catalogue {
    Catalogue::new(&DEVICE_LIST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::catalogue::{MAX_NAME_LEN, MAX_UNIT_LEN};

    #[test]
    fn test_vehicle_catalogue_width() {
        assert_eq!(vehicle_catalogue().width(), 4 * 7 + 9 + 2 + 8 + 6 + 3 * 4);
    }

    #[test]
    fn test_names_and_units_fit_limits() {
        let catalogue = vehicle_catalogue();
        for device in catalogue.devices() {
            assert!(device.name.len() <= MAX_NAME_LEN, "device name too long: {}", device.name);
            assert!(device.node_id <= 0x7F);
        }
        for entry in catalogue.entries() {
            assert!(entry.name.len() <= MAX_NAME_LEN, "entry name too long: {}", entry.name);
            assert!(entry.unit.len() <= MAX_UNIT_LEN, "unit too long: {}", entry.unit);
            assert!(entry.offset < 4);
        }
    }

    #[test]
    fn test_no_overlapping_addresses_within_a_device() {
        for device in vehicle_catalogue().devices() {
            for (i, a) in device.entries.iter().enumerate() {
                for b in &device.entries[i + 1..] {
                    assert!(
                        a.address != b.address || a.offset != b.offset,
                        "{}: '{}' and '{}' share an address",
                        device.name,
                        a.name,
                        b.name
                    );
                }
            }
        }
    }

    #[test]
    fn test_gps_device_uses_logger_node() {
        let gps = DEVICE_LIST.iter().find(|d| d.name == "GPS").unwrap();
        assert_eq!(gps.node_id, GPS_NODE_ID);
    }
}
