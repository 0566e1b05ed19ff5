//! # Storage Module
//!
//! Staging and persistence of sealed telemetry records.
//!
//! This module handles:
//! - The bounded staging ring between gathering and saving
//! - The removable medium abstraction and its host directory backend
//! - CSV formatting, file numbering and rotation
//! - Escalating repeated write failures to a reset

pub mod csv;
pub mod media;
pub mod staging;
