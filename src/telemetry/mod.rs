//! # Telemetry Module
//!
//! Turns received CAN frames into typed, timestamped records.
//!
//! This module handles:
//! - The static catalogue of logged devices and their columns
//! - Decoding CANopen-style and legacy float payloads
//! - The live accumulation record and sealed staged snapshots
//! - CRC-32 checksums over staged records

pub mod catalogue;
pub mod decoder;
pub mod devices;
pub mod record;
