//! # CSV Persistence Writer
//!
//! Writes staged records to `;`-delimited log files on the medium.
//!
//! ## File Layout
//!
//! ```text
//! ;MPPT01;;;;;;;MOTOR;;;;;;;;;...          device names, one ';' per column
//! TimeSinceBoot;mppt status;...;          column names
//! ms;;mV;mA;...;                          units
//! 1000;1A;48000;...;                      one line per record
//! ```
//!
//! Every line ends in `\r\n`. Files are named `LOG#####.CSV`; a new file is
//! started after a fixed number of records, and the writer never appends to
//! a file that existed before it started.
//!
//! Text is assembled in a 256 byte line buffer and flushed to the medium
//! whenever fewer than 18 bytes of room remain, so a single catalogue field
//! (at most 16 characters plus separator) always fits. Every flush is a
//! separate open, write and close.
//!
//! A write that fails after part of a line reached the medium leaves that
//! fragment unterminated; the next write ends it with `\r\n` first so the
//! following rows keep their column count.

use std::io::Write;

use bytes::BytesMut;
use tracing::{debug, error, info, warn};

use super::media::{Media, OpenMode};
use crate::error::WriteFailure;
use crate::telemetry::catalogue::Catalogue;
use crate::telemetry::record::StagedRecord;
use crate::watchdog::ResetControl;

/// Size of the line buffer
pub const LINE_BUFFER_SIZE: usize = 256;

/// Buffer fill level that triggers a flush
pub const FLUSH_THRESHOLD: usize = LINE_BUFFER_SIZE - 18;

/// Highest file sequence number
pub const MAX_SEQUENCE: u32 = 99_999;

/// Default number of records per file
pub const DEFAULT_RECORDS_PER_FILE: u32 = 252;

/// Default number of consecutive failed writes before a reset
pub const DEFAULT_MAX_WRITE_FAILURES: u32 = 16;

/// Name of the log file with the given sequence number
///
/// # Examples
///
/// ```
/// use solar_can_logger::storage::csv::file_name;
///
/// assert_eq!(file_name(42), "LOG00042.CSV");
/// ```
pub fn file_name(sequence: u32) -> String {
    format!("LOG{:05}.CSV", sequence)
}

/// Rotation and recovery limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterLimits {
    pub records_per_file: u32,
    pub max_write_failures: u32,
}

impl Default for WriterLimits {
    fn default() -> Self {
        Self {
            records_per_file: DEFAULT_RECORDS_PER_FILE,
            max_write_failures: DEFAULT_MAX_WRITE_FAILURES,
        }
    }
}

/// Persistence writer for staged records
pub struct CsvWriter<M: Media, R: ResetControl> {
    media: M,
    reset: R,
    catalogue: Catalogue,
    limits: WriterLimits,
    sequence: u32,
    records_in_file: u32,
    consecutive_failures: u32,
    line: BytesMut,
    /// The medium ends in an unterminated line
    line_open: bool,
}

impl<M: Media, R: ResetControl> std::fmt::Debug for CsvWriter<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvWriter")
            .field("sequence", &self.sequence)
            .field("records_in_file", &self.records_in_file)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("line_open", &self.line_open)
            .finish_non_exhaustive()
    }
}

impl<M: Media, R: ResetControl> CsvWriter<M, R> {
    /// Create a writer on a mounted medium.
    ///
    /// Probes `LOG00000.CSV` upward and starts at the first file that does
    /// not exist yet.
    pub fn new(mut media: M, reset: R, catalogue: Catalogue, limits: WriterLimits) -> Self {
        let sequence = find_free_sequence(&mut media);
        info!("Using logfile {}", file_name(sequence));

        Self {
            media,
            reset,
            catalogue,
            limits,
            sequence,
            records_in_file: 0,
            consecutive_failures: 0,
            line: BytesMut::with_capacity(LINE_BUFFER_SIZE),
            line_open: false,
        }
    }

    /// Sequence number of the active file
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn current_file_name(&self) -> String {
        file_name(self.sequence)
    }

    /// Records written to the active file
    pub fn records_in_file(&self) -> u32 {
        self.records_in_file
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Persist one staged record, preceded by the header if the active file
    /// is new.
    ///
    /// A failure leaves the file counters untouched and counts towards the
    /// reset threshold; reaching it resets the device once and restarts the
    /// count.
    pub fn write(&mut self, record: &StagedRecord) -> Result<(), WriteFailure> {
        if !record.verify() {
            warn!(
                "Checksum mismatch in staged record at {} ms, writing anyway",
                record.time_since_boot_ms()
            );
        }

        match self.write_record(record) {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.records_in_file += 1;
                if self.records_in_file >= self.limits.records_per_file {
                    self.records_in_file = 0;
                    self.sequence = self.sequence.saturating_add(1).min(MAX_SEQUENCE);
                    info!("Rotating to logfile {}", file_name(self.sequence));
                }
                Ok(())
            }
            Err(e) => {
                self.line.clear();
                self.consecutive_failures += 1;
                warn!("{} (consecutive failures: {})", e, self.consecutive_failures);

                if self.consecutive_failures >= self.limits.max_write_failures {
                    error!("{} consecutive write failures, resetting", self.consecutive_failures);
                    self.consecutive_failures = 0;
                    self.reset.reset();
                }
                Err(e)
            }
        }
    }

    fn write_record(&mut self, record: &StagedRecord) -> Result<(), WriteFailure> {
        if self.line_open {
            debug!("Terminating partial line in {}", self.current_file_name());
            self.push("\r\n")?;
        }

        if self.records_in_file == 0 {
            self.write_header()?;
        }

        self.push(&format!("{};", record.time_since_boot_ms()))?;
        for value in record.values() {
            self.push(&format!("{};", value))?;
        }
        self.push("\r\n")?;
        self.flush()
    }

    fn write_header(&mut self) -> Result<(), WriteFailure> {
        let catalogue = self.catalogue;
        debug!("Writing header to {}", self.current_file_name());

        self.push(";")?;
        for device in catalogue.devices() {
            self.push(device.name)?;
            for _ in device.entries {
                self.push(";")?;
            }
        }

        self.push("\r\nTimeSinceBoot;")?;
        for entry in catalogue.entries() {
            self.push(entry.name)?;
            self.push(";")?;
        }

        self.push("\r\nms;")?;
        for entry in catalogue.entries() {
            self.push(entry.unit)?;
            self.push(";")?;
        }

        self.push("\r\n")?;
        self.flush()
    }

    /// Append text, flushing when the buffer is nearly full
    fn push(&mut self, text: &str) -> Result<(), WriteFailure> {
        self.line.extend_from_slice(text.as_bytes());
        if self.line.len() >= FLUSH_THRESHOLD {
            self.flush()?;
        }
        Ok(())
    }

    /// Open, append the buffered text and close
    fn flush(&mut self) -> Result<(), WriteFailure> {
        if self.line.is_empty() {
            return Ok(());
        }

        let name = file_name(self.sequence);
        let mut file = self
            .media
            .open(&name, OpenMode::AppendCreate)
            .map_err(|source| WriteFailure::Open {
                name: name.clone(),
                source,
            })?;
        file.write_all(&self.line)
            .and_then(|()| file.flush())
            .map_err(|source| WriteFailure::Write { name, source })?;

        self.line_open = !self.line.ends_with(b"\n");
        self.line.clear();
        Ok(())
    }
}

/// First sequence number whose file cannot be read-opened
fn find_free_sequence<M: Media>(media: &mut M) -> u32 {
    (0..MAX_SEQUENCE)
        .find(|&sequence| media.open(&file_name(sequence), OpenMode::Read).is_err())
        .unwrap_or(MAX_SEQUENCE)
}
