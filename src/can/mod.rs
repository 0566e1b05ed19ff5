//! # CAN Module
//!
//! Frame model, hardware buffer codec and non-blocking transport.
//!
//! This module handles:
//! - Standard and extended frames with `embedded-can` identifiers
//! - The 8-word controller message buffer layout
//! - Transmit slots and the receive FIFO
//! - An slcan serial adapter bridging the mailbox to a real bus
//! - Periodic transmission of this logger's GPS readings

pub mod codec;
pub mod frame;
pub mod mailbox;
pub mod scheduler;
pub mod slcan;
