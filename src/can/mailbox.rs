//! # CAN Mailbox
//!
//! Non-blocking frame transport between the poll loop and the CAN adapter.
//!
//! The controller side is modelled as two bounded queues of raw message
//! buffers: eight transmit slots and a receive FIFO. The poll loop never
//! waits on either of them.

use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::codec::{decode_buffer, encode_buffer, MessageBuffer};
use super::frame::CanFrame;

/// Number of hardware transmit slots
pub const TX_SLOT_COUNT: usize = 8;

/// Depth of the receive FIFO
pub const RX_FIFO_DEPTH: usize = 24;

/// Contract to send and receive CAN frames without blocking
pub trait CanBus {
    /// Try to hand a frame to a free transmit slot.
    ///
    /// Returns `false` if all slots are busy.
    fn transmit(&mut self, frame: &CanFrame) -> bool;

    /// Take the next received frame, if any
    fn receive(&mut self) -> Option<CanFrame>;
}

/// Poll-loop side of the transport
#[derive(Debug)]
pub struct Mailbox {
    tx: mpsc::Sender<MessageBuffer>,
    rx: mpsc::Receiver<MessageBuffer>,
}

/// Adapter side of the transport, owned by the bridge tasks
#[derive(Debug)]
pub struct MailboxRemote {
    /// Buffers queued for transmission on the bus
    pub outgoing: mpsc::Receiver<MessageBuffer>,
    /// Receive FIFO fed from the bus
    pub incoming: RxFifo,
}

/// Producer end of the receive FIFO
#[derive(Debug, Clone)]
pub struct RxFifo {
    tx: mpsc::Sender<MessageBuffer>,
}

impl RxFifo {
    /// Queue a received frame.
    ///
    /// Returns `false` and drops the frame when the FIFO has overflowed.
    pub fn push(&self, frame: &CanFrame) -> bool {
        match self.tx.try_send(encode_buffer(frame)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("CAN receive FIFO overflow, dropping frame 0x{:X}", frame.raw_id());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl Mailbox {
    /// Create a connected mailbox pair
    pub fn new() -> (Self, MailboxRemote) {
        Self::with_capacity(TX_SLOT_COUNT, RX_FIFO_DEPTH)
    }

    /// Create a mailbox pair with custom queue sizes
    pub fn with_capacity(tx_slots: usize, rx_depth: usize) -> (Self, MailboxRemote) {
        let (tx, outgoing) = mpsc::channel(tx_slots);
        let (incoming, rx) = mpsc::channel(rx_depth);
        (
            Self { tx, rx },
            MailboxRemote {
                outgoing,
                incoming: RxFifo { tx: incoming },
            },
        )
    }
}

impl CanBus for Mailbox {
    fn transmit(&mut self, frame: &CanFrame) -> bool {
        let sent = self.tx.try_send(encode_buffer(frame)).is_ok();
        if !sent {
            trace!("All transmit slots busy");
        }
        sent
    }

    fn receive(&mut self) -> Option<CanFrame> {
        loop {
            let buffer = self.rx.try_recv().ok()?;
            match decode_buffer(&buffer) {
                Some(frame) => return Some(frame),
                None => warn!("Discarding malformed message buffer {:04X?}", buffer),
            }
        }
    }
}
