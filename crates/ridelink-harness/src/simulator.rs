//! Sensor simulator
//!
//! Generates deterministic inertial frames for a scripted device and pushes
//! them through a [`MockLink`] on every characteristic the runtime has
//! subscribed to.

use std::time::Duration;

use ridelink_core::{Channel, DeviceId, FeatureMask, Frame, FrameCodec, Sample};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::mock_link::MockLink;

/// Waveform parameters for the simulator
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Interval between frames on each characteristic
    pub period: Duration,
    /// Peak raw value of every axis
    pub amplitude: i16,
    /// Ticks per half wave
    pub half_wave: u16,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(40),
            amplitude: 1000,
            half_wave: 50,
        }
    }
}

/// Streams triangle waves from one simulated device
#[derive(Clone)]
pub struct SensorSimulator {
    link: MockLink,
    device: DeviceId,
    characteristics: Vec<FeatureMask>,
    config: SimulatorConfig,
}

impl SensorSimulator {
    pub fn new(
        link: MockLink,
        device: DeviceId,
        characteristics: impl IntoIterator<Item = FeatureMask>,
        config: SimulatorConfig,
    ) -> Self {
        Self {
            link,
            device,
            characteristics: characteristics.into_iter().collect(),
            config,
        }
    }

    /// The sample `channel` reports at `tick`
    ///
    /// Each axis runs a quarter wave behind the previous one.
    pub fn sample_at(&self, channel: Channel, tick: u16) -> Sample {
        let quarter = self.config.half_wave / 2;
        let axes = (
            self.triangle(tick),
            self.triangle(tick.wrapping_add(quarter)),
            self.triangle(tick.wrapping_add(quarter.wrapping_mul(2))),
        );
        Sample::new(channel, tick, axes)
    }

    /// The frame sent on `mask` at `tick`
    pub fn frame_at(&self, mask: FeatureMask, tick: u16) -> Option<Frame> {
        let samples: Vec<Sample> = mask
            .channels()
            .into_iter()
            .map(|channel| self.sample_at(channel, tick))
            .collect();
        FrameCodec::encode(tick, &samples).ok()
    }

    /// Push one round of frames; returns how many reached the runtime
    pub async fn step(&self, tick: u16) -> usize {
        let mut delivered = 0;
        for mask in &self.characteristics {
            if let Some(frame) = self.frame_at(*mask, tick) {
                if self.link.notify_frame(&self.device, &frame).await {
                    delivered += 1;
                }
            }
        }
        trace!(device = %self.device, tick, delivered, "Simulator step");
        delivered
    }

    /// Stream frames until the returned task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(device = %self.device, "Sensor simulator started");
            let mut interval = tokio::time::interval(self.config.period);
            let mut tick: u16 = 0;
            loop {
                interval.tick().await;
                self.step(tick).await;
                tick = tick.wrapping_add(1);
            }
        })
    }

    fn triangle(&self, tick: u16) -> i16 {
        let half = i32::from(self.config.half_wave.max(1));
        let amplitude = i32::from(self.config.amplitude);
        let phase = i32::from(tick) % (2 * half);
        let distance = (phase - half).abs();
        // distance runs half..0..half, mapped onto -amplitude..amplitude
        let value = 2 * amplitude * (half - distance) / half - amplitude;
        value as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_link::MockDevice;
    use ridelink_core::{create_link_event_channel, LinkAdapter, LinkEvent};

    fn simulator(link: MockLink) -> SensorSimulator {
        SensorSimulator::new(
            link,
            DeviceId::new("AA:01"),
            [FeatureMask::ACCELERATION, FeatureMask::INERTIAL],
            SimulatorConfig::default(),
        )
    }

    #[test]
    fn test_waveform_is_bounded_and_deterministic() {
        let sim = simulator(MockLink::ideal());
        for tick in 0..500u16 {
            let sample = sim.sample_at(Channel::Acceleration, tick);
            for value in sample.axes.as_array() {
                assert!((-1000..=1000).contains(&value));
            }
            assert_eq!(sample, sim.sample_at(Channel::Acceleration, tick));
        }
        assert_eq!(sim.sample_at(Channel::Acceleration, 0).axes.x, -1000);
        assert_eq!(sim.sample_at(Channel::Acceleration, 50).axes.x, 1000);
    }

    #[test]
    fn test_frames_decode() {
        let sim = simulator(MockLink::ideal());
        let frame = sim.frame_at(FeatureMask::INERTIAL, 7).unwrap();
        let samples = FrameCodec::decode_all(&frame).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.timestamp == 7));
    }

    #[tokio::test]
    async fn test_step_only_reaches_subscribed_characteristics() {
        let link = MockLink::ideal();
        let id = DeviceId::new("AA:01");
        link.add_device(MockDevice::sensor_box("AA:01", "BOX-01")).await;
        let (sender, mut receiver) = create_link_event_channel(8);
        link.attach_events(sender).unwrap();
        link.connect(&id).await.unwrap();
        link.subscribe(&id, FeatureMask::ACCELERATION).await.unwrap();

        assert_eq!(simulator(link).step(3).await, 1);
        match receiver.recv().await {
            Some(LinkEvent::Notification { characteristic, payload, .. }) => {
                assert_eq!(characteristic, FeatureMask::ACCELERATION.characteristic_uuid());
                assert_eq!(payload.len(), 8);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
