//! # CAN Frame Model
//!
//! In-memory representation of a classic CAN frame as seen by the logger.

use embedded_can::{ExtendedId, Frame, Id, StandardId};

/// Maximum payload of a classic CAN frame
pub const CAN_MAX_DLC: usize = 8;

/// Mask of the node identifier inside a CANopen-style COB-ID
pub const NODE_ID_MASK: u32 = 0x7F;

/// Data or remote-request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Remote,
}

/// Classic CAN frame (identifier, kind, length and up to 8 payload bytes)
///
/// Payload bytes beyond `dlc` are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: Id,
    kind: FrameKind,
    dlc: u8,
    data: [u8; CAN_MAX_DLC],
}

impl CanFrame {
    /// Creates a data frame with an 11-bit identifier.
    ///
    /// Returns `None` if the identifier does not fit in 11 bits or the
    /// payload is longer than 8 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use solar_can_logger::can::frame::CanFrame;
    ///
    /// let frame = CanFrame::standard(0x1B0, &[0x30, 0x00, 0x20, 0x01]).unwrap();
    /// assert_eq!(frame.raw_id(), 0x1B0);
    /// assert_eq!(frame.node_id(), 0x30);
    /// assert_eq!(frame.function_code(), 0x180);
    /// ```
    pub fn standard(id: u16, data: &[u8]) -> Option<Self> {
        Self::new(StandardId::new(id)?, data)
    }

    /// Creates a data frame with a 29-bit identifier
    pub fn extended(id: u32, data: &[u8]) -> Option<Self> {
        Self::new(ExtendedId::new(id)?, data)
    }

    /// Identifier as a plain integer (11 or 29 significant bits)
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }

    /// Frame kind (data or remote request)
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Low 7 bits of the identifier
    pub fn node_id(&self) -> u8 {
        (self.raw_id() & NODE_ID_MASK) as u8
    }

    /// Identifier with the node bits cleared
    pub fn function_code(&self) -> u32 {
        self.raw_id() & !NODE_ID_MASK
    }

    /// Full 8-byte payload buffer (zero padded past `dlc`)
    pub fn payload(&self) -> &[u8; CAN_MAX_DLC] {
        &self.data
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > CAN_MAX_DLC {
            return None;
        }
        let mut buffer = [0u8; CAN_MAX_DLC];
        buffer[..data.len()].copy_from_slice(data);
        Some(Self {
            id: id.into(),
            kind: FrameKind::Data,
            dlc: data.len() as u8,
            data: buffer,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > CAN_MAX_DLC {
            return None;
        }
        Some(Self {
            id: id.into(),
            kind: FrameKind::Remote,
            dlc: dlc as u8,
            data: [0; CAN_MAX_DLC],
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.kind == FrameKind::Remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        match self.kind {
            FrameKind::Data => &self.data[..self.dlc as usize],
            FrameKind::Remote => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_frame_fields() {
        let frame = CanFrame::standard(0x2A4, &[1, 2, 3]).unwrap();
        assert!(!frame.is_extended());
        assert_eq!(frame.dlc(), 3);
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert_eq!(frame.payload(), &[1, 2, 3, 0, 0, 0, 0, 0]);
        assert_eq!(frame.node_id(), 0x24);
        assert_eq!(frame.function_code(), 0x280);
    }

    #[test]
    fn test_standard_id_out_of_range() {
        assert!(CanFrame::standard(0x800, &[]).is_none());
    }

    #[test]
    fn test_extended_id_out_of_range() {
        assert!(CanFrame::extended(0x2000_0000, &[]).is_none());
        assert!(CanFrame::extended(0x1FFF_FFFF, &[]).is_some());
    }

    #[test]
    fn test_payload_too_long() {
        assert!(CanFrame::standard(0x100, &[0u8; 9]).is_none());
    }

    #[test]
    fn test_remote_frame_has_no_data() {
        let id = StandardId::new(0x123).unwrap();
        let frame = CanFrame::new_remote(id, 4).unwrap();
        assert!(frame.is_remote_frame());
        assert_eq!(frame.kind(), FrameKind::Remote);
        assert_eq!(frame.dlc(), 4);
        assert!(frame.data().is_empty());
    }
}
