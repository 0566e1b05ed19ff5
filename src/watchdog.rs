//! # Reset and Watchdog
//!
//! The last line of recovery: a device reset, requested either by the
//! persistence writer after repeated storage failures or by the watchdog
//! when the poll loop stops feeding it.
//!
//! On the host a reset is a process exit with [`RESET_EXIT_CODE`], leaving
//! the restart to the service supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

/// Exit status used for a requested reset (EX_TEMPFAIL)
pub const RESET_EXIT_CODE: i32 = 75;

/// Full device reset
#[cfg_attr(test, mockall::automock)]
pub trait ResetControl {
    fn reset(&mut self);
}

/// Watchdog that must be fed periodically by the control loop
#[cfg_attr(test, mockall::automock)]
pub trait Watchdog {
    fn feed(&mut self);
}

/// Reset by terminating the process
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessReset;

impl ResetControl for ProcessReset {
    fn reset(&mut self) {
        error!("Reset requested, exiting with status {}", RESET_EXIT_CODE);
        std::process::exit(RESET_EXIT_CODE);
    }
}

/// Software watchdog fed from the poll loop and checked by [`monitor`]
#[derive(Debug, Clone, Default)]
pub struct SoftwareWatchdog {
    fed: Arc<AtomicBool>,
}

impl SoftwareWatchdog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Watchdog for SoftwareWatchdog {
    fn feed(&mut self) {
        self.fed.store(true, Ordering::Release);
    }
}

/// Check the watchdog once per `timeout` and reset when it went unfed for a
/// whole period.
///
/// Returns after the reset has been requested.
pub async fn monitor<R>(watchdog: SoftwareWatchdog, timeout: Duration, mut reset: R)
where
    R: ResetControl,
{
    let mut interval = tokio::time::interval(timeout);
    // First tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        if watchdog.fed.swap(false, Ordering::AcqRel) {
            continue;
        }
        error!("Watchdog not fed for {:?}", timeout);
        reset.reset();
        debug!("Watchdog monitor stopped");
        return;
    }
}
