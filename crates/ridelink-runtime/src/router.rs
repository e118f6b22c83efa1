//! Telemetry router
//!
//! Turns raw notifications into samples for the enabled channels. Malformed
//! frames are counted and skipped; one bad frame never ends the stream.

use ridelink_core::{Channel, DeviceId, Frame, FrameCodec, Sample};
use smallvec::SmallVec;
use tracing::{trace, warn};
use uuid::Uuid;

/// Router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Samples delivered to the bus
    pub routed_samples: u64,
    /// Frames with at least one decode failure
    pub dropped_frames: u64,
    /// Frames carrying no enabled channel
    pub ignored_frames: u64,
}

/// Stateless decoding plus counters
#[derive(Debug, Default)]
pub struct TelemetryRouter {
    stats: RouterStats,
}

impl TelemetryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Decode a notification received on `characteristic`
    pub fn route_notification(
        &mut self,
        device: &DeviceId,
        characteristic: &Uuid,
        payload: Vec<u8>,
        enabled: impl Fn(Channel) -> bool,
    ) -> SmallVec<[Sample; 3]> {
        match Frame::from_characteristic(characteristic, payload) {
            Ok(frame) => self.route(device, &frame, enabled),
            Err(error) => {
                self.stats.ignored_frames += 1;
                trace!(device = %device, %error, "Notification on non-feature characteristic");
                SmallVec::new()
            }
        }
    }

    /// Decode every enabled channel carried by `frame`, in frame order
    pub fn route(
        &mut self,
        device: &DeviceId,
        frame: &Frame,
        enabled: impl Fn(Channel) -> bool,
    ) -> SmallVec<[Sample; 3]> {
        trace!(device = %device, mask = %frame.mask, payload = %frame.payload_hex(), "Frame");

        let wanted: SmallVec<[Channel; 4]> = frame
            .mask
            .channels()
            .into_iter()
            .filter(|channel| enabled(*channel))
            .collect();
        if wanted.is_empty() {
            self.stats.ignored_frames += 1;
            return SmallVec::new();
        }

        let mut samples = SmallVec::new();
        let mut failed = false;
        for channel in wanted {
            match FrameCodec::decode(frame, channel) {
                Ok(sample) => samples.push(sample),
                Err(error) => {
                    failed = true;
                    warn!(device = %device, channel = %channel, %error, "Dropping malformed frame");
                }
            }
        }
        if failed {
            self.stats.dropped_frames += 1;
        }
        self.stats.routed_samples += samples.len() as u64;
        samples
    }
}
