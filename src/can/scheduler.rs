//! # Transmit Scheduler
//!
//! Periodically publishes this logger's GPS readings on the bus.
//!
//! A continuous timer marks every GPS message pending once per period. Each
//! call to [`TransmitScheduler::process`] sends at most one pending message,
//! lowest index first, so a busy bus never stalls the poll loop. Every frame
//! that made it into a transmit slot is also decoded locally, which is how
//! the GPS columns of the log get filled.

use std::sync::Arc;

use tracing::{debug, trace};

use super::frame::CanFrame;
use super::mailbox::CanBus;
use crate::error::TimerError;
use crate::gps::{GpsFix, GpsSource};
use crate::telemetry::catalogue::Catalogue;
use crate::telemetry::decoder::TelemetryDecoder;
use crate::timer::{TimerId, TimerMode, TimerService};

/// Number of GPS messages sent per period
pub const GPS_MESSAGE_COUNT: usize = 8;

/// One GPS message: address and the reading it carries
#[derive(Clone, Copy)]
struct GpsMessage {
    function_code: u16,
    index: u16,
    sub_index: u8,
    read: fn(&GpsFix) -> u32,
}

const GPS_MESSAGES: [GpsMessage; GPS_MESSAGE_COUNT] = [
    GpsMessage { function_code: 0x180, index: 0x2000, sub_index: 0x01, read: |fix| fix.time_stamp },
    GpsMessage { function_code: 0x180, index: 0x2001, sub_index: 0x01, read: |fix| fix.lat_deg },
    GpsMessage { function_code: 0x180, index: 0x2001, sub_index: 0x02, read: |fix| fix.lat_10u_min },
    GpsMessage { function_code: 0x180, index: 0x2002, sub_index: 0x01, read: |fix| fix.long_deg },
    GpsMessage { function_code: 0x180, index: 0x2002, sub_index: 0x02, read: |fix| fix.long_10u_min },
    GpsMessage { function_code: 0x280, index: 0x2000, sub_index: 0x01, read: |fix| fix.speed_10m_per_h as u32 },
    GpsMessage { function_code: 0x280, index: 0x2001, sub_index: 0x01, read: |fix| fix.direction_100mdeg as u32 },
    GpsMessage { function_code: 0x380, index: 0x2000, sub_index: 0x01, read: |fix| fix.satellites as u32 },
];

/// Build the data frame for one GPS message
fn gps_frame(node_id: u8, message: &GpsMessage, fix: &GpsFix) -> Option<CanFrame> {
    let index = message.index.to_le_bytes();
    let value = (message.read)(fix).to_le_bytes();
    let data = [
        node_id,
        index[0],
        index[1],
        message.sub_index,
        value[0],
        value[1],
        value[2],
        value[3],
    ];
    CanFrame::standard(message.function_code | u16::from(node_id & 0x7F), &data)
}

/// Whether every GPS message sent from `node_id` has a column in `catalogue`.
///
/// Without one the looped-back readings match no entry and never reach the
/// log.
pub fn loops_back_into(catalogue: &Catalogue, node_id: u8) -> bool {
    let Some(device) = catalogue.devices().iter().find(|d| d.node_id == node_id) else {
        return false;
    };
    GPS_MESSAGES.iter().all(|message| {
        device.entries.iter().any(|entry| {
            entry.address.function_code == message.function_code
                && entry.address.index == message.index
                && entry.address.sub_index == message.sub_index
        })
    })
}

/// Round-robin sender of the GPS messages
#[derive(Debug)]
pub struct TransmitScheduler {
    timers: Arc<TimerService>,
    timer: TimerId,
    node_id: u8,
    pending: [bool; GPS_MESSAGE_COUNT],
}

impl TransmitScheduler {
    /// Create the scheduler and start its refresh timer.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Exhausted`] if no timer slot is free.
    pub fn new(timers: Arc<TimerService>, node_id: u8, period_ms: u32) -> Result<Self, TimerError> {
        let timer = timers.create(TimerMode::Continuous)?;
        timers.start(timer, period_ms)?;
        debug!("GPS transmit scheduler started: node 0x{:02X}, period {} ms", node_id, period_ms);

        Ok(Self {
            timers,
            timer,
            node_id,
            pending: [false; GPS_MESSAGE_COUNT],
        })
    }

    /// Messages still waiting for a free transmit slot
    pub fn pending(&self) -> &[bool; GPS_MESSAGE_COUNT] {
        &self.pending
    }

    /// Attempt to send the lowest pending message.
    ///
    /// Returns `true` if a frame was handed to the bus.
    pub fn process<B, G>(&mut self, bus: &mut B, gps: &G, decoder: &mut TelemetryDecoder) -> bool
    where
        B: CanBus + ?Sized,
        G: GpsSource + ?Sized,
    {
        if self.timers.take_expired(self.timer) {
            self.pending = [true; GPS_MESSAGE_COUNT];
        }

        let Some(next) = self.pending.iter().position(|&p| p) else {
            return false;
        };

        let fix = gps.fix();
        let Some(frame) = gps_frame(self.node_id, &GPS_MESSAGES[next], &fix) else {
            // Unrepresentable identifier; nothing will ever send it
            self.pending[next] = false;
            return false;
        };

        if !bus.transmit(&frame) {
            trace!("GPS message {} deferred, transmit slots busy", next);
            return false;
        }

        self.pending[next] = false;
        decoder.decode(&frame);
        true
    }
}

impl Drop for TransmitScheduler {
    fn drop(&mut self) {
        let _ = self.timers.delete(self.timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::SharedGps;
    use crate::telemetry::catalogue::Value;
    use crate::telemetry::devices::{vehicle_catalogue, GPS_NODE_ID};

    /// Bus that records frames and can be told to refuse them
    #[derive(Default)]
    struct RecordingBus {
        sent: Vec<CanFrame>,
        busy: bool,
    }

    impl CanBus for RecordingBus {
        fn transmit(&mut self, frame: &CanFrame) -> bool {
            if self.busy {
                return false;
            }
            self.sent.push(*frame);
            true
        }

        fn receive(&mut self) -> Option<CanFrame> {
            None
        }
    }

    fn expire(timers: &TimerService, period_ms: u32) {
        for _ in 0..period_ms {
            timers.tick();
        }
    }

    fn sample_fix() -> GpsFix {
        GpsFix {
            time_stamp: 1_700_000_000,
            lat_deg: 52,
            lat_10u_min: 1_234_567,
            long_deg: 4,
            long_10u_min: 7_654_321,
            speed_10m_per_h: 1500,
            direction_100mdeg: 2700,
            satellites: 11,
        }
    }

    #[test]
    fn test_nothing_sent_before_first_period() {
        let timers = Arc::new(TimerService::new());
        let mut scheduler = TransmitScheduler::new(timers, GPS_NODE_ID, 1000).unwrap();
        let mut bus = RecordingBus::default();
        let mut decoder = TelemetryDecoder::new(vehicle_catalogue());

        assert!(!scheduler.process(&mut bus, &SharedGps::new(), &mut decoder));
        assert!(bus.sent.is_empty());
    }

    #[test]
    fn test_one_message_per_call_in_order() {
        let timers = Arc::new(TimerService::new());
        let mut scheduler = TransmitScheduler::new(timers.clone(), GPS_NODE_ID, 10).unwrap();
        let mut bus = RecordingBus::default();
        let mut decoder = TelemetryDecoder::new(vehicle_catalogue());
        let gps = SharedGps::new();
        gps.publish(sample_fix());

        expire(&timers, 10);
        for _ in 0..GPS_MESSAGE_COUNT {
            assert!(scheduler.process(&mut bus, &gps, &mut decoder));
        }
        assert!(!scheduler.process(&mut bus, &gps, &mut decoder));

        let ids: Vec<u32> = bus.sent.iter().map(|f| f.raw_id()).collect();
        assert_eq!(ids, vec![0x1B0, 0x1B0, 0x1B0, 0x1B0, 0x1B0, 0x2B0, 0x2B0, 0x3B0]);

        let first = bus.sent[0].payload();
        assert_eq!(first[..4], [0x30, 0x00, 0x20, 0x01]);
        assert_eq!(first[4..], 1_700_000_000u32.to_le_bytes());
    }

    #[test]
    fn test_busy_bus_keeps_message_pending() {
        let timers = Arc::new(TimerService::new());
        let mut scheduler = TransmitScheduler::new(timers.clone(), GPS_NODE_ID, 10).unwrap();
        let mut bus = RecordingBus {
            busy: true,
            ..Default::default()
        };
        let mut decoder = TelemetryDecoder::new(vehicle_catalogue());
        let gps = SharedGps::new();

        expire(&timers, 10);
        assert!(!scheduler.process(&mut bus, &gps, &mut decoder));
        assert!(scheduler.pending().iter().all(|&p| p));

        bus.busy = false;
        assert!(scheduler.process(&mut bus, &gps, &mut decoder));
        assert!(!scheduler.pending()[0]);
        assert!(scheduler.pending()[1]);
    }

    #[test]
    fn test_sent_frames_loop_back_into_record() {
        let timers = Arc::new(TimerService::new());
        let mut scheduler = TransmitScheduler::new(timers.clone(), GPS_NODE_ID, 10).unwrap();
        let mut bus = RecordingBus::default();
        let catalogue = vehicle_catalogue();
        let mut decoder = TelemetryDecoder::new(catalogue);
        let gps = SharedGps::new();
        gps.publish(sample_fix());

        expire(&timers, 10);
        while scheduler.process(&mut bus, &gps, &mut decoder) {}

        let (start, _) = catalogue
            .devices_with_offsets()
            .find(|(_, d)| d.name == "GPS")
            .unwrap();
        let gps_columns = &decoder.record().values()[start..start + 8];
        assert_eq!(
            gps_columns,
            &[
                Value::U32(1_700_000_000),
                Value::U32(52),
                Value::U32(1_234_567),
                Value::U32(4),
                Value::U32(7_654_321),
                Value::U16(1500),
                Value::U16(2700),
                Value::U16(11),
            ]
        );
    }

    #[test]
    fn test_loops_back_only_into_gps_device() {
        let catalogue = vehicle_catalogue();
        assert!(loops_back_into(&catalogue, GPS_NODE_ID));
        assert!(!loops_back_into(&catalogue, 0x31));
        // Motor controller exists but lacks the GPS addresses
        assert!(!loops_back_into(&catalogue, 0x10));
    }

    #[test]
    fn test_new_fails_when_timers_exhausted() {
        let timers = Arc::new(TimerService::new());
        while timers.create(TimerMode::Single).is_ok() {}
        assert_eq!(
            TransmitScheduler::new(timers, GPS_NODE_ID, 1000).unwrap_err(),
            TimerError::Exhausted
        );
    }
}
