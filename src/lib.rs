//! # Solar CAN Logger Library
//!
//! Unattended CAN bus telemetry logger for solar race vehicles.
//!
//! This library provides the acquisition, decode, staging and persistence
//! pipeline: frames received from the bus (and this logger's own GPS
//! readings) are decoded against a static catalogue, sealed into records
//! once per reporting period and written to numbered CSV files.

pub mod can;
pub mod config;
pub mod error;
pub mod gps;
pub mod pipeline;
pub mod storage;
pub mod telemetry;
pub mod timer;
pub mod watchdog;
