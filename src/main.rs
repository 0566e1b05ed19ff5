//! # Solar CAN Logger
//!
//! Logs CAN bus telemetry of a solar race vehicle to numbered CSV files.
//!
//! This application opens an slcan adapter, publishes the logger's GPS
//! readings on the bus and records every catalogued value once per
//! reporting period.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use solar_can_logger::can::mailbox::Mailbox;
use solar_can_logger::can::slcan::SlcanAdapter;
use solar_can_logger::config::Config;
use solar_can_logger::error::LoggerError;
use solar_can_logger::gps::{GpsSource, SharedGps};
use solar_can_logger::pipeline::{Pipeline, PipelineSettings};
use solar_can_logger::storage::csv::{CsvWriter, WriterLimits};
use solar_can_logger::storage::media::{DirectoryMedia, Media};
use solar_can_logger::telemetry::decoder::TelemetryDecoder;
use solar_can_logger::telemetry::devices::vehicle_catalogue;
use solar_can_logger::timer::{TimerService, TICK_PERIOD_MS};
use solar_can_logger::watchdog::{self, ProcessReset, SoftwareWatchdog};

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Period of the main poll loop in milliseconds
const POLL_PERIOD_MS: u64 = 1;

/// Control loop iterations per poll period
///
/// Each iteration decodes at most one frame, so this bounds the frame rate
/// the logger keeps up with. A saturated 1 Mbit/s bus carries about 9 frames/ms.
const POLLS_PER_PERIOD: usize = 32;

/// Main entry point for the Solar CAN Logger
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up non-blocking logging with tracing subscriber
///    - Load configuration (defaults if the file is missing)
///    - Start the 1 ms timer tick task
///    - Mount the log directory and pick the next free log file
///    - Open the slcan adapter and start its bridge tasks
///    - Start the watchdog monitor
///
/// 2. **Main Loop**
///    - Poll the gathering/saving state machine every millisecond
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if:
/// - The configuration file is invalid
/// - The log directory cannot be mounted
/// - The slcan adapter cannot be opened
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; diagnostic output must never block the poll loop
    let (log_writer, _log_guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_writer(log_writer)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    info!("Solar CAN Logger v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)?;

    // Timer tick
    let timers = Arc::new(TimerService::new());
    let tick_timers = timers.clone();
    let tick_task = tokio::spawn(async move {
        let mut tick = interval(Duration::from_millis(TICK_PERIOD_MS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Burst);
        loop {
            tick.tick().await;
            tick_timers.tick();
        }
    });

    // Storage
    let mut media = DirectoryMedia::new(&config.logging.log_dir);
    media
        .mount()
        .map_err(|e| LoggerError::Storage(format!("cannot mount {}: {}", config.logging.log_dir, e)))?;

    let catalogue = vehicle_catalogue();
    let writer = CsvWriter::new(
        media,
        ProcessReset,
        catalogue,
        WriterLimits {
            records_per_file: config.logging.records_per_file,
            max_write_failures: config.logging.max_write_failures,
        },
    );
    info!("Logging to {}/{}", config.logging.log_dir, writer.current_file_name());

    // CAN adapter
    let adapter = SlcanAdapter::open_with_paths(&[config.can.port.as_str()], config.can.baud_rate)?;
    info!("slcan adapter opened at: {}", adapter.device_path());

    let (mailbox, remote) = Mailbox::new();
    let bridge = adapter
        .start(config.can.bitrate, remote)
        .await
        .context("failed to open CAN channel")?;
    info!("CAN channel open at {} bit/s", config.can.bitrate);

    // Watchdog
    let watchdog = SoftwareWatchdog::new();
    let monitor_task = tokio::spawn(watchdog::monitor(
        watchdog.clone(),
        Duration::from_millis(config.watchdog.timeout_ms),
        ProcessReset,
    ));

    // GPS sentence parsers attach here and publish decoded fixes through
    // `gps_feed`; until one does, the all-zero fix is sent and logged
    let gps = SharedGps::new();
    let gps_feed = gps.clone();
    let mut pipeline = Pipeline::new(
        timers.clone(),
        mailbox,
        gps,
        watchdog,
        writer,
        TelemetryDecoder::new(catalogue),
        PipelineSettings {
            node_id: config.can.node_id,
            transmit_period_ms: config.can.transmit_period_ms,
            rate_ms: config.logging.rate_ms,
            staging_depth: config.logging.staging_depth,
            clear_policy: config.logging.clear_policy,
        },
    )?;

    let mut poll_interval = interval(Duration::from_millis(POLL_PERIOD_MS));
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Logging started");
    info!("Press Ctrl+C to exit");

    // Main control loop
    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                // Saving touches the filesystem synchronously
                tokio::task::block_in_place(|| {
                    for _ in 0..POLLS_PER_PERIOD {
                        pipeline.poll();
                    }
                });
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    monitor_task.abort();
    bridge.reader.abort();
    bridge.writer.abort();
    tick_task.abort();

    info!(
        "Stopped; {} record(s) in {}, last GPS fix at {} with {} satellites",
        pipeline.writer().records_in_file(),
        pipeline.writer().current_file_name(),
        gps_feed.fix().time_stamp,
        gps_feed.fix().satellites
    );

    Ok(())
}

/// Load the configuration file, falling back to defaults when it is missing
fn load_config(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        warn!("Config file {} not found, using defaults", path);
        return Ok(Config::default());
    }

    let config = Config::load(path).with_context(|| format!("invalid configuration in {}", path))?;
    info!("Loaded configuration from {}", path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_budget_covers_full_bus_load() {
        let polls_per_ms = POLLS_PER_PERIOD as u64 / POLL_PERIOD_MS;
        assert!(polls_per_ms >= 10);
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let config = load_config("/nonexistent/solar-can-logger.toml").unwrap();
        assert_eq!(config.logging.records_per_file, 252);
        assert_eq!(config.can.node_id, 0x30);
    }

    #[test]
    fn test_default_config_path_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        assert!(load_config(path).is_ok());
        assert!(DEFAULT_CONFIG_PATH.ends_with("default.toml"));
    }
}
