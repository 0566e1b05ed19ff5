//! # GPS Readings
//!
//! Scalar accessors for the last known GPS fix.
//!
//! Sentence parsing lives outside this crate; a parser publishes decoded
//! fixes through [`SharedGps::publish`] and the transmit scheduler reads them
//! back through [`GpsSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Decoded GPS fix in the integer units put on the bus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpsFix {
    /// Unix time of the fix in seconds
    pub time_stamp: u32,
    pub lat_deg: u32,
    /// Fractional latitude minutes × 10⁵
    pub lat_10u_min: u32,
    pub long_deg: u32,
    /// Fractional longitude minutes × 10⁵
    pub long_10u_min: u32,
    /// Speed over ground in 10 m/h
    pub speed_10m_per_h: u16,
    /// Course over ground in 100 mdeg
    pub direction_100mdeg: u16,
    pub satellites: u16,
}

/// Source of the last known GPS readings
pub trait GpsSource {
    /// Last known fix (all zero before the first fix)
    fn fix(&self) -> GpsFix;

    /// Returns `true` once per newly published fix
    fn take_new_fix(&self) -> bool;

    /// Whether a fix was published since the last [`GpsSource::take_new_fix`],
    /// without clearing the flag
    fn has_new_fix(&self) -> bool;
}

/// Thread-safe last-fix cell shared between a GPS parser and the logger
#[derive(Debug, Clone, Default)]
pub struct SharedGps {
    fix: Arc<RwLock<GpsFix>>,
    new_fix: Arc<AtomicBool>,
}

impl SharedGps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new fix and raise the new-fix flag
    pub fn publish(&self, fix: GpsFix) {
        match self.fix.write() {
            Ok(mut current) => *current = fix,
            Err(poisoned) => *poisoned.into_inner() = fix,
        }
        self.new_fix.store(true, Ordering::Release);
    }
}

impl GpsSource for SharedGps {
    fn fix(&self) -> GpsFix {
        match self.fix.read() {
            Ok(fix) => *fix,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn take_new_fix(&self) -> bool {
        self.new_fix.swap(false, Ordering::AcqRel)
    }

    fn has_new_fix(&self) -> bool {
        self.new_fix.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fix_is_zero() {
        let gps = SharedGps::new();
        assert_eq!(gps.fix(), GpsFix::default());
        assert!(!gps.take_new_fix());
    }

    #[test]
    fn test_publish_is_visible_through_clones() {
        let gps = SharedGps::new();
        let parser_side = gps.clone();

        parser_side.publish(GpsFix {
            satellites: 9,
            ..GpsFix::default()
        });

        assert_eq!(gps.fix().satellites, 9);
        assert!(gps.has_new_fix());
        assert!(gps.has_new_fix());
        assert!(gps.take_new_fix());
        assert!(!gps.has_new_fix());
        assert!(!gps.take_new_fix());
    }
}
