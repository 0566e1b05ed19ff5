//! # Control Loop
//!
//! The gathering/saving state machine driving the logger.
//!
//! ```text
//!            staging ring full
//! Gathering ------------------> Saving
//!     ^                           |
//!     +------- ring drained ------+
//! ```
//!
//! While gathering, each poll sends at most one GPS message, decodes at most
//! one received frame and, once per reporting period, seals the accumulation
//! record into the staging ring. Saving drains the whole ring to the
//! persistence writer in a single poll; no frames are decoded meanwhile.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::can::mailbox::CanBus;
use crate::can::scheduler::{self, TransmitScheduler};
use crate::error::{LoggerError, Result};
use crate::gps::GpsSource;
use crate::storage::csv::CsvWriter;
use crate::storage::media::Media;
use crate::storage::staging::StagingRing;
use crate::telemetry::decoder::TelemetryDecoder;
use crate::telemetry::record::ClearPolicy;
use crate::timer::{TimerId, TimerMode, TimerService};
use crate::watchdog::{ResetControl, Watchdog};

/// Period of the status line in milliseconds
pub const STATUS_PERIOD_MS: u32 = 1000;

/// Operating mode of the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Gathering,
    Saving,
}

/// Tunables of the control loop
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub node_id: u8,
    pub transmit_period_ms: u32,
    pub rate_ms: u32,
    pub staging_depth: usize,
    pub clear_policy: ClearPolicy,
}

/// Acquisition, staging and persistence wired together
pub struct Pipeline<B, G, W, M, R>
where
    B: CanBus,
    G: GpsSource,
    W: Watchdog,
    M: Media,
    R: ResetControl,
{
    bus: B,
    gps: G,
    watchdog: W,
    timers: Arc<TimerService>,
    scheduler: TransmitScheduler,
    decoder: TelemetryDecoder,
    staging: StagingRing,
    writer: CsvWriter<M, R>,
    log_timer: TimerId,
    status_timer: TimerId,
    rate_ms: u32,
    clear_policy: ClearPolicy,
    mode: Mode,
    uptime_s: u64,
}

impl<B, G, W, M, R> Pipeline<B, G, W, M, R>
where
    B: CanBus,
    G: GpsSource,
    W: Watchdog,
    M: Media,
    R: ResetControl,
{
    /// Create the pipeline and start its timers.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Catalogue`] if the GPS messages sent from
    /// `settings.node_id` have no columns in the decoder's catalogue, and
    /// [`LoggerError::Timer`] if the timer service has no free slots left.
    pub fn new(
        timers: Arc<TimerService>,
        bus: B,
        gps: G,
        watchdog: W,
        writer: CsvWriter<M, R>,
        decoder: TelemetryDecoder,
        settings: PipelineSettings,
    ) -> Result<Self> {
        if !scheduler::loops_back_into(decoder.catalogue(), settings.node_id) {
            return Err(LoggerError::Catalogue(format!(
                "no GPS device at node 0x{:02X}",
                settings.node_id
            )));
        }

        let scheduler = TransmitScheduler::new(timers.clone(), settings.node_id, settings.transmit_period_ms)?;

        let log_timer = timers.create(TimerMode::Continuous)?;
        timers.start(log_timer, settings.rate_ms)?;
        let status_timer = timers.create(TimerMode::Continuous)?;
        timers.start(status_timer, STATUS_PERIOD_MS)?;

        info!(
            "Logging {} columns every {} ms, staging depth {}",
            decoder.catalogue().width(),
            settings.rate_ms,
            settings.staging_depth
        );

        Ok(Self {
            bus,
            gps,
            watchdog,
            timers,
            scheduler,
            decoder,
            staging: StagingRing::new(settings.staging_depth),
            writer,
            log_timer,
            status_timer,
            rate_ms: settings.rate_ms,
            clear_policy: settings.clear_policy,
            mode: Mode::Gathering,
            uptime_s: 0,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn decoder(&self) -> &TelemetryDecoder {
        &self.decoder
    }

    pub fn staging(&self) -> &StagingRing {
        &self.staging
    }

    pub fn writer(&self) -> &CsvWriter<M, R> {
        &self.writer
    }

    /// Run one iteration of the control loop. Never blocks on the bus.
    pub fn poll(&mut self) {
        match self.mode {
            Mode::Gathering => self.gather(),
            Mode::Saving => self.save(),
        }

        if self.timers.take_expired(self.status_timer) {
            self.uptime_s += 1;
            self.log_status();
        }

        self.watchdog.feed();
    }

    fn gather(&mut self) {
        self.scheduler.process(&mut self.bus, &self.gps, &mut self.decoder);

        if let Some(frame) = self.bus.receive() {
            self.decoder.decode(&frame);
        }

        if self.timers.take_expired(self.log_timer) {
            let record = self.decoder.record_mut();
            record.advance_time(self.rate_ms);
            self.staging.snapshot(record);
            record.clear(self.clear_policy);
        }

        if self.staging.is_full() {
            debug!("Staging ring full, saving {} record(s)", self.staging.len());
            self.mode = Mode::Saving;
        }
    }

    fn save(&mut self) {
        let writer = &mut self.writer;
        let watchdog = &mut self.watchdog;

        self.staging.drain_all(|record| {
            // Failures are counted and escalated by the writer
            let _ = writer.write(record);
            watchdog.feed();
        });

        self.mode = Mode::Gathering;
    }

    fn log_status(&self) {
        let fix = self.gps.fix();
        let new_fix = self.gps.has_new_fix();
        let gps_time = DateTime::<Utc>::from_timestamp(i64::from(fix.time_stamp), 0)
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());

        debug!(
            "Time since bootup: {} s, GPS time: {} ({} satellites{}), logfile {}",
            self.uptime_s,
            gps_time,
            fix.satellites,
            if new_fix { ", new fix" } else { "" },
            self.writer.current_file_name()
        );
    }
}
