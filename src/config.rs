//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::can::scheduler::loops_back_into;
use crate::can::slcan::bitrate_command;
use crate::error::{LoggerError, Result};
use crate::telemetry::devices::vehicle_catalogue;
use crate::telemetry::record::ClearPolicy;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub can: CanConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

/// CAN adapter and transmit configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CanConfig {
    /// Serial device of the slcan adapter
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// CAN bus bitrate
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    /// Node id this logger transmits its GPS readings from
    #[serde(default = "default_node_id")]
    pub node_id: u8,

    #[serde(default = "default_transmit_period_ms")]
    pub transmit_period_ms: u32,
}

/// Record logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Reporting period: one record per period
    #[serde(default = "default_rate_ms")]
    pub rate_ms: u32,

    #[serde(default = "default_records_per_file")]
    pub records_per_file: u32,

    /// Records staged in memory before a flush to the medium
    #[serde(default = "default_staging_depth")]
    pub staging_depth: usize,

    /// Consecutive failed writes before the logger resets
    #[serde(default = "default_max_write_failures")]
    pub max_write_failures: u32,

    #[serde(default)]
    pub clear_policy: ClearPolicy,
}

/// Watchdog configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WatchdogConfig {
    #[serde(default = "default_watchdog_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            bitrate: default_bitrate(),
            node_id: default_node_id(),
            transmit_period_ms: default_transmit_period_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            rate_ms: default_rate_ms(),
            records_per_file: default_records_per_file(),
            staging_depth: default_staging_depth(),
            max_write_failures: default_max_write_failures(),
            clear_policy: ClearPolicy::default(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_watchdog_timeout_ms(),
        }
    }
}

/// Serial baud rates accepted for the adapter
pub const VALID_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600, 1000000, 2000000, 3000000];

// Default value functions
fn default_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_bitrate() -> u32 { 250000 }
fn default_node_id() -> u8 { 0x30 }
fn default_transmit_period_ms() -> u32 { 1000 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_rate_ms() -> u32 { 1000 }
fn default_records_per_file() -> u32 { 252 }
fn default_staging_depth() -> usize { 4 }
fn default_max_write_failures() -> u32 { 16 }

fn default_watchdog_timeout_ms() -> u64 { 2000 }

fn invalid(message: impl std::fmt::Display) -> LoggerError {
    LoggerError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use solar_can_logger::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.can.port.is_empty() {
            return Err(invalid("can port cannot be empty"));
        }

        if !VALID_BAUD_RATES.contains(&self.can.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                VALID_BAUD_RATES
                    .iter()
                    .map(|b| b.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        if bitrate_command(self.can.bitrate).is_none() {
            return Err(invalid(format!("bitrate {} is not supported by slcan", self.can.bitrate)));
        }

        if self.can.node_id == 0 || self.can.node_id > 0x7F {
            return Err(invalid("node_id must be between 1 and 127"));
        }

        if !loops_back_into(&vehicle_catalogue(), self.can.node_id) {
            return Err(invalid(format!(
                "node_id 0x{:02X} is not the GPS node of the device list",
                self.can.node_id
            )));
        }

        if self.can.transmit_period_ms == 0 || self.can.transmit_period_ms > 60000 {
            return Err(invalid("transmit_period_ms must be between 1 and 60000"));
        }

        if self.logging.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty"));
        }

        if self.logging.rate_ms == 0 || self.logging.rate_ms > 60000 {
            return Err(invalid("rate_ms must be between 1 and 60000"));
        }

        if self.logging.records_per_file == 0 {
            return Err(invalid("records_per_file must be greater than 0"));
        }

        if self.logging.staging_depth == 0 || self.logging.staging_depth > 64 {
            return Err(invalid("staging_depth must be between 1 and 64"));
        }

        if self.logging.max_write_failures == 0 {
            return Err(invalid("max_write_failures must be greater than 0"));
        }

        if self.watchdog.timeout_ms < 100 || self.watchdog.timeout_ms > 60000 {
            return Err(invalid("watchdog timeout_ms must be between 100 and 60000"));
        }

        Ok(())
    }
}
