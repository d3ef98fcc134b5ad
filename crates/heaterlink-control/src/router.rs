use std::sync::Arc;

use chrono::{DateTime, Utc};
use heaterlink_frame::{DeviceFault, Frame, Header, Message};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::params::DutyCycles;
use crate::session::SessionStats;

/// A telemetry reading tagged with the duty cycle in force when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub channel: u8,
    pub millivolts: f64,
    pub milliamps: f64,
    /// Controller setpoint at decode time, not reported by the device.
    pub duty_cycle: f64,
    pub time: DateTime<Utc>,
}

/// What the router did with a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Routed {
    /// Sample handed to the persistence queue.
    Queued,
    /// Persistence queue full; sample dropped.
    QueueFull,
    /// Persistence sink gone; sample dropped.
    SinkClosed,
    /// Device reported a missing heater.
    DeviceError(DeviceFault),
    /// Command frame on the inbound side.
    Rejected(Header),
}

/// Dispatches decoded inbound frames.
pub struct TelemetryRouter {
    duty: watch::Receiver<DutyCycles>,
    sink: mpsc::Sender<TelemetrySample>,
    stats: Arc<SessionStats>,
}

impl TelemetryRouter {
    pub fn new(
        duty: watch::Receiver<DutyCycles>,
        sink: mpsc::Sender<TelemetrySample>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self { duty, sink, stats }
    }

    /// Route one frame. Never blocks: a full queue drops the sample.
    pub fn route(&self, frame: &Frame) -> Routed {
        match frame.message() {
            Message::Telemetry(reading) => {
                let duty_cycle = self.duty.borrow().get(reading.channel).unwrap_or(0.0);
                let sample = TelemetrySample {
                    channel: reading.channel,
                    millivolts: reading.millivolts,
                    milliamps: reading.milliamps,
                    duty_cycle,
                    time: Utc::now(),
                };
                debug!(
                    channel = sample.channel,
                    mv = sample.millivolts,
                    ma = sample.milliamps,
                    duty = sample.duty_cycle,
                    "telemetry"
                );
                match self.sink.try_send(sample) {
                    Ok(()) => {
                        self.stats.record_queued();
                        Routed::Queued
                    }
                    Err(mpsc::error::TrySendError::Full(sample)) => {
                        self.stats.record_dropped();
                        warn!(channel = sample.channel, "telemetry queue full; sample dropped");
                        Routed::QueueFull
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        self.stats.record_dropped();
                        debug!("telemetry sink closed; sample dropped");
                        Routed::SinkClosed
                    }
                }
            }
            Message::HeaterNotFound(fault) => {
                self.stats.record_device_error();
                error!(code = fault.code, "device reports heater not found; check wiring");
                Routed::DeviceError(fault)
            }
            Message::Duty(_) => {
                self.stats.record_rejected();
                warn!(header = frame.header().name(), "command frame received from device; dropped");
                Routed::Rejected(frame.header())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use heaterlink_frame::try_decode;

    use super::*;

    fn router(
        capacity: usize,
        duty: DutyCycles,
    ) -> (
        TelemetryRouter,
        mpsc::Receiver<TelemetrySample>,
        watch::Sender<DutyCycles>,
        Arc<SessionStats>,
    ) {
        let (duty_tx, duty_rx) = watch::channel(duty);
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(SessionStats::default());
        (
            TelemetryRouter::new(duty_rx, tx, Arc::clone(&stats)),
            rx,
            duty_tx,
            stats,
        )
    }

    #[test]
    fn telemetry_gets_current_duty_for_its_channel() {
        let duty = DutyCycles {
            heater0: 12.5,
            heater1: 40.0,
        };
        let (router, mut rx, _duty_tx, stats) = router(4, duty);

        let frame = try_decode(&[0x11, 0x00, 0x27, 0x10, 0x00, 0x00, 0x64, 0xFF]).unwrap();
        assert_eq!(router.route(&frame), Routed::Queued);
        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.channel, 0);
        assert!((sample.millivolts - 100.0).abs() < 1e-9);
        assert!((sample.milliamps - 1.0).abs() < 1e-9);
        assert_eq!(sample.duty_cycle, 12.5);

        let frame = try_decode(&[0x12, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x14, 0xFF]).unwrap();
        router.route(&frame);
        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.channel, 1);
        assert_eq!(sample.duty_cycle, 40.0);
        assert_eq!(stats.snapshot().samples_queued, 2);
    }

    #[test]
    fn duty_updates_are_visible() {
        let (router, mut rx, duty_tx, _) = router(4, DutyCycles::ZERO);
        duty_tx.send_replace(DutyCycles {
            heater0: 7.0,
            heater1: 0.0,
        });
        let frame = try_decode(&[0x11, 0, 0, 1, 0, 0, 1, 0xFF]).unwrap();
        router.route(&frame);
        assert_eq!(rx.try_recv().unwrap().duty_cycle, 7.0);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (router, _rx, _duty_tx, stats) = router(1, DutyCycles::ZERO);
        let frame = try_decode(&[0x11, 0, 0, 1, 0, 0, 1, 0xFF]).unwrap();
        assert_eq!(router.route(&frame), Routed::Queued);
        assert_eq!(router.route(&frame), Routed::QueueFull);
        assert_eq!(stats.snapshot().samples_dropped, 1);
    }

    #[test]
    fn closed_sink_drops() {
        let (router, rx, _duty_tx, _) = router(1, DutyCycles::ZERO);
        drop(rx);
        let frame = try_decode(&[0x12, 0, 0, 1, 0, 0, 1, 0xFF]).unwrap();
        assert_eq!(router.route(&frame), Routed::SinkClosed);
    }

    #[test]
    fn device_error_is_reported_not_queued() {
        let (router, mut rx, _duty_tx, stats) = router(4, DutyCycles::ZERO);
        let frame = try_decode(&[0x21, 0, 0, 1, 0, 0, 0, 0xFF]).unwrap();
        assert_eq!(
            router.route(&frame),
            Routed::DeviceError(DeviceFault { code: 1 })
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(stats.snapshot().device_errors, 1);
    }

    #[test]
    fn inbound_command_frames_are_rejected() {
        let (router, mut rx, _duty_tx, stats) = router(4, DutyCycles::ZERO);
        let frame = try_decode(&[0x03, 0, 0, 0, 0, 0, 0, 0xFF]).unwrap();
        assert_eq!(router.route(&frame), Routed::Rejected(Header::DutyBoth));
        assert!(rx.try_recv().is_err());
        assert_eq!(stats.snapshot().frames_rejected, 1);
    }
}
