//! # CAN Message Buffer Codec
//!
//! Packs frames into the eight 16-bit words of a controller message buffer
//! and unpacks them again.
//!
//! ## Layout
//!
//! ```text
//! word 0  standard: SID[10:0] << 2 | SRR << 1          (bit 0 = 0)
//!         extended: EID[28:18] << 2                    (bit 0 = 1)
//! word 1  extended: EID[17:6]
//! word 2  DLC[3:0] | RTR << 9 | EID[5:0] << 10
//! word 3  data1 << 8 | data0
//! word 4  data3 << 8 | data2
//! word 5  data5 << 8 | data4
//! word 6  data7 << 8 | data6
//! word 7  unused
//! ```

use embedded_can::{ExtendedId, Frame, Id, StandardId};

use super::frame::{CanFrame, CAN_MAX_DLC};

/// Number of 16-bit words per message buffer
pub const MESSAGE_BUFFER_WORDS: usize = 8;

/// Raw message buffer as exchanged with the controller
pub type MessageBuffer = [u16; MESSAGE_BUFFER_WORDS];

const IDE_BIT: u16 = 0x0001;
const SRR_BIT: u16 = 0x0002;
const RTR_BIT: u16 = 0x0200;
const SID_MASK: u16 = 0x1FFC;
const EID_MID_MASK: u16 = 0x0FFF;
const EID_LOW_MASK: u16 = 0xFC00;
const DLC_MASK: u16 = 0x000F;

/// Encode a frame into a message buffer
///
/// # Examples
///
/// ```
/// use solar_can_logger::can::codec::{decode_buffer, encode_buffer};
/// use solar_can_logger::can::frame::CanFrame;
///
/// let frame = CanFrame::extended(0x18FF_50E5, &[0xAA, 0xBB]).unwrap();
/// let buffer = encode_buffer(&frame);
/// assert_eq!(buffer[0] & 1, 1);
/// assert_eq!(decode_buffer(&buffer), Some(frame));
/// ```
pub fn encode_buffer(frame: &CanFrame) -> MessageBuffer {
    let mut buffer = [0u16; MESSAGE_BUFFER_WORDS];
    let dlc = frame.dlc() as u16 & DLC_MASK;
    let remote = frame.is_remote_frame();

    match frame.id() {
        Id::Standard(id) => {
            buffer[0] = (id.as_raw() & 0x07FF) << 2;
            if remote {
                buffer[0] |= SRR_BIT;
            }
            buffer[1] = 0;
            buffer[2] = dlc;
        }
        Id::Extended(id) => {
            let raw = id.as_raw();
            buffer[0] = ((raw >> 16) as u16 & SID_MASK) | IDE_BIT;
            buffer[1] = (raw >> 6) as u16 & EID_MID_MASK;
            buffer[2] = dlc | ((raw << 10) as u16 & EID_LOW_MASK);
            if remote {
                buffer[2] |= RTR_BIT;
            }
        }
    }

    let payload = frame.payload();
    for (word, pair) in buffer[3..7].iter_mut().zip(payload.chunks_exact(2)) {
        *word = u16::from_le_bytes([pair[0], pair[1]]);
    }

    buffer
}

/// Decode a message buffer back into a frame
///
/// Returns `None` if the buffer does not describe a valid frame.
pub fn decode_buffer(buffer: &MessageBuffer) -> Option<CanFrame> {
    let extended = buffer[0] & IDE_BIT != 0;

    let (id, remote): (Id, bool) = if extended {
        let raw = ((buffer[0] & SID_MASK) as u32) << 16
            | ((buffer[1] & EID_MID_MASK) as u32) << 6
            | ((buffer[2] & EID_LOW_MASK) as u32) >> 10;
        (ExtendedId::new(raw)?.into(), buffer[2] & RTR_BIT != 0)
    } else {
        let raw = (buffer[0] & SID_MASK) >> 2;
        (StandardId::new(raw)?.into(), buffer[0] & SRR_BIT != 0)
    };

    let dlc = ((buffer[2] & DLC_MASK) as usize).min(CAN_MAX_DLC);

    if remote {
        return CanFrame::new_remote(id, dlc);
    }

    let mut payload = [0u8; CAN_MAX_DLC];
    for (pair, word) in payload.chunks_exact_mut(2).zip(&buffer[3..7]) {
        pair.copy_from_slice(&word.to_le_bytes());
    }
    CanFrame::new(id, &payload[..dlc])
}
