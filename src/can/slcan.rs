//! # slcan Serial Adapter
//!
//! Bridges the CAN mailbox to a USB/serial CAN adapter speaking the Lawicel
//! (slcan) ASCII protocol.
//!
//! This module handles:
//! - Opening the adapter's serial port
//! - Opening the CAN channel at the configured bitrate
//! - Translating received `t`/`T`/`r`/`R` lines into the receive FIFO
//! - Writing queued transmit buffers as slcan lines

use embedded_can::{ExtendedId, Frame, Id, StandardId};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use super::codec::{decode_buffer, MessageBuffer};
use super::frame::{CanFrame, CAN_MAX_DLC};
use super::mailbox::{MailboxRemote, RxFifo};
use crate::error::{LoggerError, Result};

/// slcan command terminator
const CR: u8 = b'\r';

/// slcan error response
const BELL: u8 = 0x07;

/// Supported bus bitrates and their `S<n>` setup codes
pub const SLCAN_BITRATES: &[(u32, u8)] = &[
    (10_000, 0),
    (20_000, 1),
    (50_000, 2),
    (100_000, 3),
    (125_000, 4),
    (250_000, 5),
    (500_000, 6),
    (800_000, 7),
    (1_000_000, 8),
];

/// Returns the `S<n>` setup command for a bitrate, if supported
pub fn bitrate_command(bitrate: u32) -> Option<String> {
    SLCAN_BITRATES
        .iter()
        .find(|(rate, _)| *rate == bitrate)
        .map(|(_, code)| format!("S{}\r", code))
}

/// Encode a frame as an slcan line (including the trailing CR)
///
/// # Examples
///
/// ```
/// use solar_can_logger::can::frame::CanFrame;
/// use solar_can_logger::can::slcan::encode_frame;
///
/// let frame = CanFrame::standard(0x1B0, &[0x30, 0x01]).unwrap();
/// assert_eq!(encode_frame(&frame), "t1B023001\r");
/// ```
pub fn encode_frame(frame: &CanFrame) -> String {
    let mut line = match (frame.id(), frame.is_remote_frame()) {
        (Id::Standard(id), false) => format!("t{:03X}", id.as_raw()),
        (Id::Standard(id), true) => format!("r{:03X}", id.as_raw()),
        (Id::Extended(id), false) => format!("T{:08X}", id.as_raw()),
        (Id::Extended(id), true) => format!("R{:08X}", id.as_raw()),
    };

    line.push_str(&frame.dlc().to_string());
    for byte in frame.data() {
        line.push_str(&format!("{:02X}", byte));
    }
    line.push('\r');
    line
}

/// Decode one slcan frame line (without the trailing CR)
///
/// A trailing 4-digit timestamp, if the adapter appends one, is ignored.
///
/// # Errors
///
/// Returns [`LoggerError::Slcan`] if the line is not a valid frame.
pub fn decode_frame(line: &str) -> Result<CanFrame> {
    let kind = line
        .chars()
        .next()
        .ok_or_else(|| LoggerError::Slcan("empty line".to_string()))?;

    let (id_len, remote) = match kind {
        't' => (3, false),
        'r' => (3, true),
        'T' => (8, false),
        'R' => (8, true),
        other => {
            return Err(LoggerError::Slcan(format!("unknown frame type '{}'", other)));
        }
    };

    let id_field = field(line, 1, id_len)?;
    let raw_id = u32::from_str_radix(id_field, 16)
        .map_err(|_| LoggerError::Slcan(format!("invalid identifier '{}'", id_field)))?;

    let id: Id = if id_len == 3 {
        StandardId::new(raw_id as u16)
            .filter(|_| raw_id <= 0x7FF)
            .ok_or_else(|| LoggerError::Slcan(format!("standard id out of range: 0x{:X}", raw_id)))?
            .into()
    } else {
        ExtendedId::new(raw_id)
            .ok_or_else(|| LoggerError::Slcan(format!("extended id out of range: 0x{:X}", raw_id)))?
            .into()
    };

    let dlc_field = field(line, 1 + id_len, 1)?;
    let dlc = dlc_field
        .parse::<usize>()
        .ok()
        .filter(|dlc| *dlc <= CAN_MAX_DLC)
        .ok_or_else(|| LoggerError::Slcan(format!("invalid length '{}'", dlc_field)))?;

    if remote {
        return CanFrame::new_remote(id, dlc)
            .ok_or_else(|| LoggerError::Slcan("invalid remote frame".to_string()));
    }

    let data_start = 2 + id_len;
    let mut data = [0u8; CAN_MAX_DLC];
    for (i, byte) in data.iter_mut().take(dlc).enumerate() {
        let hex = field(line, data_start + 2 * i, 2)?;
        *byte = u8::from_str_radix(hex, 16)
            .map_err(|_| LoggerError::Slcan(format!("invalid data byte '{}'", hex)))?;
    }

    CanFrame::new(id, &data[..dlc]).ok_or_else(|| LoggerError::Slcan("invalid data frame".to_string()))
}

fn field(line: &str, start: usize, len: usize) -> Result<&str> {
    line.get(start..start + len)
        .ok_or_else(|| LoggerError::Slcan(format!("line too short: '{}'", line)))
}

/// Send the channel setup sequence: close, set bitrate, open
pub async fn open_channel<W>(writer: &mut W, bitrate: u32) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let setup = bitrate_command(bitrate)
        .ok_or_else(|| LoggerError::Slcan(format!("unsupported bitrate {}", bitrate)))?;

    for command in ["C\r", setup.as_str(), "O\r"] {
        writer.write_all(command.as_bytes()).await?;
    }
    writer.flush().await?;

    debug!("slcan channel opened at {} bit/s", bitrate);
    Ok(())
}

/// Read slcan lines until end of stream, pushing frames into the receive FIFO
pub async fn run_reader<R>(reader: R, fifo: RxFifo) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(32);

    loop {
        line.clear();
        if reader.read_until(CR, &mut line).await? == 0 {
            debug!("slcan reader reached end of stream");
            return Ok(());
        }

        let errors = line.iter().filter(|&&b| b == BELL).count();
        if errors > 0 {
            warn!("slcan adapter reported {} error(s)", errors);
        }

        let text: String = line
            .iter()
            .filter(|&&b| b != BELL && b != CR && b != b'\n')
            .map(|&b| b as char)
            .collect();

        // Empty lines and z/Z are acknowledgements of our own commands
        if text.is_empty() || text == "z" || text == "Z" {
            continue;
        }

        match decode_frame(&text) {
            Ok(frame) => {
                trace!("slcan rx {}", text);
                fifo.push(&frame);
            }
            Err(e) => debug!("Ignoring slcan line '{}': {}", text, e),
        }
    }
}

/// Write queued transmit buffers to the adapter until the mailbox is dropped
pub async fn run_writer<W>(mut writer: W, mut outgoing: mpsc::Receiver<MessageBuffer>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(buffer) = outgoing.recv().await {
        let Some(frame) = decode_buffer(&buffer) else {
            warn!("Dropping malformed transmit buffer {:04X?}", buffer);
            continue;
        };

        let line = encode_frame(&frame);
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| LoggerError::Serial(format!("Failed to write frame: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| LoggerError::Serial(format!("Failed to flush serial port: {}", e)))?;
    }

    debug!("slcan writer stopped, mailbox closed");
    Ok(())
}

/// slcan adapter connected over a serial port
pub struct SlcanAdapter {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
}

impl std::fmt::Debug for SlcanAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlcanAdapter")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

/// Handles of the running bridge tasks
#[derive(Debug)]
pub struct SlcanTasks {
    pub reader: JoinHandle<Result<()>>,
    pub writer: JoinHandle<Result<()>>,
}

impl SlcanAdapter {
    /// Open the adapter, trying each device path in order
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::SerialPortNotFound`] if no path could be opened
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened slcan adapter at {}", path);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(LoggerError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| LoggerError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Open the CAN channel and spawn the reader and writer tasks
    pub async fn start(mut self, bitrate: u32, remote: MailboxRemote) -> Result<SlcanTasks> {
        open_channel(&mut self.port, bitrate).await?;

        let (read_half, write_half) = tokio::io::split(self.port);
        let MailboxRemote { outgoing, incoming } = remote;

        Ok(SlcanTasks {
            reader: tokio::spawn(run_reader(read_half, incoming)),
            writer: tokio::spawn(run_writer(write_half, outgoing)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::codec::encode_buffer;
    use crate::can::mailbox::{CanBus, Mailbox};

    #[test]
    fn test_encode_standard_data_frame() {
        let frame = CanFrame::standard(0x1B0, &[0x30, 0x00, 0x20, 0x01, 0x34, 0x12, 0x00, 0x00]).unwrap();
        assert_eq!(encode_frame(&frame), "t1B083000200134120000\r");
    }

    #[test]
    fn test_encode_extended_remote_frame() {
        let frame = CanFrame::new_remote(ExtendedId::new(0x18FF50E5).unwrap(), 3).unwrap();
        assert_eq!(encode_frame(&frame), "R18FF50E53\r");
    }

    #[test]
    fn test_decode_standard_data_frame() {
        let frame = decode_frame("t2A42BEEF").unwrap();
        assert_eq!(frame.raw_id(), 0x2A4);
        assert!(!frame.is_extended());
        assert_eq!(frame.data(), &[0xBE, 0xEF]);
    }

    #[test]
    fn test_decode_extended_data_frame() {
        let frame = decode_frame("T1FFFFFFF10A").unwrap();
        assert_eq!(frame.raw_id(), 0x1FFF_FFFF);
        assert!(frame.is_extended());
        assert_eq!(frame.data(), &[0x0A]);
    }

    #[test]
    fn test_decode_ignores_timestamp_suffix() {
        let frame = decode_frame("t1231AAEA60").unwrap();
        assert_eq!(frame.data(), &[0xAA]);
    }

    #[test]
    fn test_decode_remote_frame() {
        let frame = decode_frame("r6018").unwrap();
        assert!(frame.is_remote_frame());
        assert_eq!(frame.dlc(), 8);
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        assert!(decode_frame("").is_err());
        assert!(decode_frame("x123").is_err());
        assert!(decode_frame("t12").is_err());
        assert!(decode_frame("t8001AA").is_err());
        assert!(decode_frame("t1239").is_err());
        assert!(decode_frame("t1232AA").is_err());
        assert!(decode_frame("t1231ZZ").is_err());
    }

    #[test]
    fn test_bitrate_command() {
        assert_eq!(bitrate_command(250_000).as_deref(), Some("S5\r"));
        assert_eq!(bitrate_command(1_000_000).as_deref(), Some("S8\r"));
        assert_eq!(bitrate_command(33_333), None);
    }

    #[tokio::test]
    async fn test_open_channel_sequence() {
        let mut port = tokio_test::io::Builder::new()
            .write(b"C\r")
            .write(b"S5\r")
            .write(b"O\r")
            .build();

        open_channel(&mut port, 250_000).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_channel_rejects_unknown_bitrate() {
        let mut port = tokio_test::io::Builder::new().build();
        assert!(open_channel(&mut port, 42).await.is_err());
    }

    #[tokio::test]
    async fn test_reader_feeds_receive_fifo() {
        let port = tokio_test::io::Builder::new()
            .read(b"t1B0230\x01\r")
            .read(b"\r\x07z\rt1B12AABB\r")
            .read(b"T0000012320102\r")
            .build();

        let (mut mailbox, remote) = Mailbox::new();
        run_reader(port, remote.incoming).await.unwrap();

        // The first line is malformed ("0\x01" is not hex) and skipped
        let first = mailbox.receive().unwrap();
        assert_eq!(first.raw_id(), 0x1B1);
        assert_eq!(first.data(), &[0xAA, 0xBB]);

        let second = mailbox.receive().unwrap();
        assert_eq!(second.raw_id(), 0x123);
        assert!(second.is_extended());

        assert!(mailbox.receive().is_none());
    }

    #[tokio::test]
    async fn test_writer_emits_queued_frames() {
        let port = tokio_test::io::Builder::new()
            .write(b"t1B0130\r")
            .write(b"t2B0201FF\r")
            .build();

        let (tx, rx) = mpsc::channel(8);
        tx.send(encode_buffer(&CanFrame::standard(0x1B0, &[0x30]).unwrap()))
            .await
            .unwrap();
        tx.send(encode_buffer(&CanFrame::standard(0x2B0, &[0x01, 0xFF]).unwrap()))
            .await
            .unwrap();
        drop(tx);

        run_writer(port, rx).await.unwrap();
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let result = SlcanAdapter::open_with_paths(&["/dev/nonexistent_can0"], 115_200);
        match result {
            Err(LoggerError::SerialPortNotFound(msg)) => assert!(msg.contains("/dev/nonexistent_can0")),
            other => panic!("Expected SerialPortNotFound, got: {:?}", other),
        }
    }
}
