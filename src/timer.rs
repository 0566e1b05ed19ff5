//! # Software Timer Service
//!
//! Cooperative countdown multiplexer driven by a periodic tick (1 ms).
//!
//! The tick context only decrements countdowns and raises expired flags.
//! Everything else (starting, stopping, observing expiry) happens from the
//! polling loop. Each slot is a small set of atomics so the tick and the poll
//! loop never need a shared lock:
//!
//! - the tick is the only writer of the `EXPIRED` bit being set
//! - the poll loop is the only consumer, clearing it with a single `swap`
//!
//! A missed tick is therefore never double counted: an expiry observed late
//! is still observed exactly once.
//!
//! ## Usage
//!
//! ```
//! use solar_can_logger::timer::{TimerMode, TimerService};
//!
//! let timers = TimerService::new();
//! let id = timers.create(TimerMode::Continuous).unwrap();
//! timers.start(id, 2).unwrap();
//!
//! timers.tick();
//! assert!(!timers.take_expired(id));
//! timers.tick();
//! assert!(timers.take_expired(id));
//! assert!(!timers.take_expired(id));
//! ```

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::error::TimerError;

/// Number of timer slots available
pub const MAX_TIMERS: usize = 16;

/// Tick period of the service in milliseconds
pub const TICK_PERIOD_MS: u64 = 1;

const USED: u8 = 1 << 0;
const CONTINUOUS: u8 = 1 << 1;
const RUNNING: u8 = 1 << 2;
const EXPIRED: u8 = 1 << 3;

/// Behaviour of a timer on expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Stops after the first expiry
    Single,
    /// Reloads its period and keeps counting
    Continuous,
}

/// Handle to a created timer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(usize);

impl TimerId {
    /// Slot index of this timer
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Default)]
struct TimerSlot {
    period_ms: AtomicU32,
    remaining_ms: AtomicU32,
    flags: AtomicU8,
}

/// Tick-driven countdown table shared between the tick task and the poll loop
#[derive(Debug, Default)]
pub struct TimerService {
    slots: [TimerSlot; MAX_TIMERS],
}

impl TimerService {
    /// Creates a service with all slots free
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Exhausted`] when all slots are in use.
    pub fn create(&self, mode: TimerMode) -> Result<TimerId, TimerError> {
        let mode_bit = match mode {
            TimerMode::Single => 0,
            TimerMode::Continuous => CONTINUOUS,
        };

        for (index, slot) in self.slots.iter().enumerate() {
            let claimed = slot
                .flags
                .compare_exchange(0, USED | mode_bit, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if claimed {
                slot.period_ms.store(0, Ordering::Relaxed);
                slot.remaining_ms.store(0, Ordering::Relaxed);
                return Ok(TimerId(index));
            }
        }

        Err(TimerError::Exhausted)
    }

    /// Frees a slot so it can be created again
    pub fn delete(&self, id: TimerId) -> Result<(), TimerError> {
        self.slot(id)?.flags.store(0, Ordering::Release);
        Ok(())
    }

    /// Starts (or restarts) a timer with the given period
    pub fn start(&self, id: TimerId, period_ms: u32) -> Result<(), TimerError> {
        let slot = self.used_slot(id)?;
        slot.period_ms.store(period_ms, Ordering::Relaxed);
        slot.remaining_ms.store(period_ms, Ordering::Relaxed);
        slot.flags.fetch_or(RUNNING, Ordering::Release);
        Ok(())
    }

    /// Stops a timer; a pending expired flag is kept
    pub fn stop(&self, id: TimerId) -> Result<(), TimerError> {
        self.used_slot(id)?.flags.fetch_and(!RUNNING, Ordering::Release);
        Ok(())
    }

    /// Returns whether the timer expired since the last call, clearing the flag
    pub fn take_expired(&self, id: TimerId) -> bool {
        match self.slot(id) {
            Ok(slot) => slot.flags.fetch_and(!EXPIRED, Ordering::AcqRel) & EXPIRED != 0,
            Err(_) => false,
        }
    }

    /// Returns whether the timer is currently counting
    pub fn is_running(&self, id: TimerId) -> bool {
        self.slot(id)
            .map(|slot| slot.flags.load(Ordering::Acquire) & RUNNING != 0)
            .unwrap_or(false)
    }

    /// Advances every running timer by one tick.
    ///
    /// This is the only function meant to be called from the tick context.
    pub fn tick(&self) {
        for slot in &self.slots {
            let flags = slot.flags.load(Ordering::Acquire);
            if flags & USED == 0 || flags & RUNNING == 0 {
                continue;
            }

            let remaining = slot
                .remaining_ms
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                    Some(left.saturating_sub(1))
                })
                .map(|previous| previous.saturating_sub(1))
                .unwrap_or(0);

            if remaining == 0 {
                if flags & CONTINUOUS != 0 {
                    let period = slot.period_ms.load(Ordering::Relaxed);
                    slot.remaining_ms.store(period, Ordering::Relaxed);
                    slot.flags.fetch_or(EXPIRED, Ordering::Release);
                } else {
                    slot.flags
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |f| {
                            Some((f | EXPIRED) & !RUNNING)
                        })
                        .ok();
                }
            }
        }
    }

    fn slot(&self, id: TimerId) -> Result<&TimerSlot, TimerError> {
        self.slots.get(id.0).ok_or(TimerError::InvalidTimer(id.0))
    }

    fn used_slot(&self, id: TimerId) -> Result<&TimerSlot, TimerError> {
        let slot = self.slot(id)?;
        if slot.flags.load(Ordering::Acquire) & USED == 0 {
            return Err(TimerError::InvalidTimer(id.0));
        }
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_n(timers: &TimerService, n: u32) {
        for _ in 0..n {
            timers.tick();
        }
    }

    #[test]
    fn test_continuous_timer_expires_every_period() {
        let timers = TimerService::new();
        let id = timers.create(TimerMode::Continuous).unwrap();
        timers.start(id, 10).unwrap();

        tick_n(&timers, 9);
        assert!(!timers.take_expired(id));
        timers.tick();
        assert!(timers.take_expired(id));

        tick_n(&timers, 10);
        assert!(timers.take_expired(id));
        assert!(timers.is_running(id));
    }

    #[test]
    fn test_expired_flag_is_not_double_counted() {
        let timers = TimerService::new();
        let id = timers.create(TimerMode::Continuous).unwrap();
        timers.start(id, 5).unwrap();

        // Three periods pass without the poll loop looking
        tick_n(&timers, 15);
        assert!(timers.take_expired(id));
        assert!(!timers.take_expired(id));
    }

    #[test]
    fn test_single_timer_stops_after_expiry() {
        let timers = TimerService::new();
        let id = timers.create(TimerMode::Single).unwrap();
        timers.start(id, 3).unwrap();

        tick_n(&timers, 3);
        assert!(timers.take_expired(id));
        assert!(!timers.is_running(id));

        tick_n(&timers, 10);
        assert!(!timers.take_expired(id));
    }

    #[test]
    fn test_stop_and_restart() {
        let timers = TimerService::new();
        let id = timers.create(TimerMode::Continuous).unwrap();
        timers.start(id, 4).unwrap();
        tick_n(&timers, 2);
        timers.stop(id).unwrap();

        tick_n(&timers, 10);
        assert!(!timers.take_expired(id));

        timers.start(id, 4).unwrap();
        tick_n(&timers, 4);
        assert!(timers.take_expired(id));
    }

    #[test]
    fn test_exhaustion() {
        let timers = TimerService::new();
        for _ in 0..MAX_TIMERS {
            timers.create(TimerMode::Single).unwrap();
        }
        assert_eq!(timers.create(TimerMode::Single), Err(TimerError::Exhausted));
    }

    #[test]
    fn test_deleted_slot_is_reused() {
        let timers = TimerService::new();
        let first = timers.create(TimerMode::Single).unwrap();
        let _second = timers.create(TimerMode::Single).unwrap();
        timers.delete(first).unwrap();

        let reused = timers.create(TimerMode::Continuous).unwrap();
        assert_eq!(reused.index(), first.index());
        assert_eq!(timers.start(first, 1), Ok(()));
    }

    #[test]
    fn test_start_on_deleted_timer_fails() {
        let timers = TimerService::new();
        let id = timers.create(TimerMode::Single).unwrap();
        timers.delete(id).unwrap();
        assert_eq!(timers.start(id, 10), Err(TimerError::InvalidTimer(id.index())));
    }

    #[test]
    fn test_unused_timers_do_not_expire() {
        let timers = TimerService::new();
        let id = timers.create(TimerMode::Continuous).unwrap();
        // Created but never started
        tick_n(&timers, 100);
        assert!(!timers.take_expired(id));
    }
}
