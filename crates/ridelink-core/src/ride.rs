//! Ride session state machine
//!
//! A [`RideSession`] moves strictly `Idle → Recording → Ended`. While
//! recording it counts one-second ticks and folds incoming samples into a
//! per-channel aggregate; `stop` freezes everything into an immutable
//! [`RideRecord`]. A new ride needs a fresh session.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::Sample;
use crate::errors::SessionError;
use crate::feature::Channel;
use crate::types::{DeviceId, Location, Timestamp};

// ----------------------------------------------------------------------------
// Aggregation
// ----------------------------------------------------------------------------

/// How samples are folded into a ride record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Keep only the most recent sample
    Latest,
    /// Keep every sample in arrival order
    #[default]
    Series,
    /// Keep per-axis running statistics
    Summary,
}

/// Running statistics for one axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSummary {
    pub min: i16,
    pub max: i16,
    pub mean: f64,
}

impl AxisSummary {
    fn first(value: i16) -> Self {
        Self {
            min: value,
            max: value,
            mean: value as f64,
        }
    }

    fn fold(&mut self, value: i16, count: u64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.mean += (value as f64 - self.mean) / count as f64;
    }
}

/// Aggregated samples for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ChannelAggregate {
    Latest {
        count: u64,
        sample: Option<Sample>,
    },
    Series {
        samples: Vec<Sample>,
    },
    Summary {
        count: u64,
        axes: Option<[AxisSummary; 3]>,
    },
}

impl ChannelAggregate {
    pub fn new(policy: AggregationPolicy) -> Self {
        match policy {
            AggregationPolicy::Latest => ChannelAggregate::Latest {
                count: 0,
                sample: None,
            },
            AggregationPolicy::Series => ChannelAggregate::Series {
                samples: Vec::new(),
            },
            AggregationPolicy::Summary => ChannelAggregate::Summary {
                count: 0,
                axes: None,
            },
        }
    }

    /// Number of samples folded so far
    pub fn count(&self) -> u64 {
        match self {
            ChannelAggregate::Latest { count, .. } => *count,
            ChannelAggregate::Series { samples } => samples.len() as u64,
            ChannelAggregate::Summary { count, .. } => *count,
        }
    }

    fn fold(&mut self, sample: Sample) {
        match self {
            ChannelAggregate::Latest { count, sample: last } => {
                *count += 1;
                *last = Some(sample);
            }
            ChannelAggregate::Series { samples } => samples.push(sample),
            ChannelAggregate::Summary { count, axes } => {
                *count += 1;
                let values = sample.axes.as_array();
                match axes {
                    Some(summaries) => {
                        for (summary, value) in summaries.iter_mut().zip(values) {
                            summary.fold(value, *count);
                        }
                    }
                    None => *axes = Some(values.map(AxisSummary::first)),
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Ride Record
// ----------------------------------------------------------------------------

/// Immutable result of a finished ride
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRecord {
    pub id: Uuid,
    pub device: Option<DeviceId>,
    pub started_at: Timestamp,
    pub duration: Duration,
    pub aggregates: BTreeMap<Channel, ChannelAggregate>,
    pub location: Location,
}

impl RideRecord {
    pub fn aggregate(&self, channel: Channel) -> Option<&ChannelAggregate> {
        self.aggregates.get(&channel)
    }

    pub fn sample_count(&self) -> u64 {
        self.aggregates.values().map(ChannelAggregate::count).sum()
    }

    pub fn duration_display(&self) -> String {
        format_elapsed(self.duration.as_secs())
    }
}

/// Format seconds as `HH:MM:SS`
pub fn format_elapsed(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    )
}

// ----------------------------------------------------------------------------
// Ride Session
// ----------------------------------------------------------------------------

/// Lifecycle state of a ride session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideState {
    Idle,
    Recording,
    Ended,
}

/// In-progress aggregation of telemetry and elapsed time
#[derive(Debug, Clone)]
pub struct RideSession {
    state: RideState,
    policy: AggregationPolicy,
    device: Option<DeviceId>,
    started_at: Option<Timestamp>,
    ticks: u64,
    aggregates: BTreeMap<Channel, ChannelAggregate>,
    accepted: BTreeMap<Channel, u64>,
    dropped: u64,
}

impl RideSession {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self {
            state: RideState::Idle,
            policy,
            device: None,
            started_at: None,
            ticks: 0,
            aggregates: BTreeMap::new(),
            accepted: BTreeMap::new(),
            dropped: 0,
        }
    }

    /// Tag the record with the device the telemetry came from
    pub fn for_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn state(&self) -> RideState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RideState::Recording
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    /// Elapsed time as counted by ticks
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs(self.ticks)
    }

    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.ticks)
    }

    /// Samples that arrived outside of `Recording`
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn start(&mut self, now: Timestamp) -> Result<(), SessionError> {
        if self.state != RideState::Idle {
            return Err(SessionError::AlreadyRecording);
        }
        self.state = RideState::Recording;
        self.started_at = Some(now);
        self.ticks = 0;
        self.aggregates.clear();
        self.accepted.clear();
        Ok(())
    }

    /// Advance the elapsed counter by one tick; ignored unless recording
    pub fn tick(&mut self) -> Option<Duration> {
        if !self.is_recording() {
            return None;
        }
        self.ticks += 1;
        Some(self.elapsed())
    }

    /// Fold a sample into its channel aggregate
    ///
    /// Returns `false` when the sample was dropped because the session is not
    /// recording.
    pub fn record(&mut self, sample: Sample) -> bool {
        if !self.is_recording() {
            self.dropped += 1;
            return false;
        }
        let policy = self.policy;
        self.aggregates
            .entry(sample.channel)
            .or_insert_with(|| ChannelAggregate::new(policy))
            .fold(sample);
        *self.accepted.entry(sample.channel).or_insert(0) += 1;
        true
    }

    /// Finish the ride and produce its record
    ///
    /// The duration is the larger of the tick count and the clock distance
    /// between start and stop, so a stop between two ticks is not truncated.
    /// A ride whose aggregates fail verification is discarded: the session
    /// ends without a record.
    pub fn stop(&mut self, now: Timestamp, location: Location) -> Result<RideRecord, SessionError> {
        if self.state != RideState::Recording {
            return Err(SessionError::NotRecording);
        }
        if let Err(error) = self.verify() {
            self.state = RideState::Ended;
            self.aggregates.clear();
            self.accepted.clear();
            return Err(error);
        }

        let started_at = self.started_at.ok_or(SessionError::NotRecording)?;
        let duration = self.elapsed().max(now.duration_since(started_at));
        self.state = RideState::Ended;

        Ok(RideRecord {
            id: Uuid::new_v4(),
            device: self.device.clone(),
            started_at,
            duration,
            aggregates: std::mem::take(&mut self.aggregates),
            location,
        })
    }

    fn verify(&self) -> Result<(), SessionError> {
        for channel in self.accepted.keys().chain(self.aggregates.keys()) {
            let accepted = self.accepted.get(channel).copied().unwrap_or(0);
            let aggregated = self.aggregates.get(channel).map(|a| a.count()).unwrap_or(0);
            if accepted != aggregated {
                return Err(SessionError::InconsistentAggregate {
                    channel: *channel,
                    aggregated,
                    accepted,
                });
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Axes;

    fn acc(t: u16, x: i16, y: i16, z: i16) -> Sample {
        Sample::new(Channel::Acceleration, t, (x, y, z))
    }

    fn run_ride(samples: usize) -> RideRecord {
        let mut session = RideSession::new(AggregationPolicy::Series);
        let start = Timestamp::new(10_000);
        session.start(start).unwrap();
        for i in 0..125 {
            session.tick();
            if samples > 0 && i == 0 {
                for n in 0..samples {
                    session.record(acc(n as u16, 1, 0, 0));
                }
            }
        }
        session.stop(start, Location::Unknown).unwrap()
    }

    #[test]
    fn test_duration_independent_of_sample_count() {
        for samples in [0, 1, 1000] {
            let record = run_ride(samples);
            assert_eq!(record.duration, Duration::from_secs(125));
            assert_eq!(record.sample_count(), samples as u64);
        }
    }

    #[test]
    fn test_duration_covers_wall_clock() {
        let mut session = RideSession::new(AggregationPolicy::Latest);
        let start = Timestamp::new(0);
        session.start(start).unwrap();
        session.tick();
        let record = session
            .stop(Timestamp::new(1_500), Location::Unknown)
            .unwrap();
        assert_eq!(record.duration, Duration::from_millis(1_500));
    }

    #[test]
    fn test_stop_while_idle_fails() {
        let mut session = RideSession::new(AggregationPolicy::Series);
        assert_eq!(
            session.stop(Timestamp::new(0), Location::Unknown),
            Err(SessionError::NotRecording)
        );
        assert_eq!(session.state(), RideState::Idle);
    }

    #[test]
    fn test_transitions_are_one_way() {
        let mut session = RideSession::new(AggregationPolicy::Series);
        session.start(Timestamp::new(0)).unwrap();
        assert_eq!(
            session.start(Timestamp::new(1)),
            Err(SessionError::AlreadyRecording)
        );
        session.stop(Timestamp::new(2), Location::Unknown).unwrap();
        assert_eq!(session.state(), RideState::Ended);
        assert_eq!(
            session.start(Timestamp::new(3)),
            Err(SessionError::AlreadyRecording)
        );
        assert_eq!(
            session.stop(Timestamp::new(4), Location::Unknown),
            Err(SessionError::NotRecording)
        );
    }

    #[test]
    fn test_samples_outside_recording_dropped() {
        let mut session = RideSession::new(AggregationPolicy::Series);
        assert!(!session.record(acc(0, 1, 0, 0)));
        assert_eq!(session.tick(), None);

        session.start(Timestamp::new(0)).unwrap();
        assert!(session.record(acc(1, 1, 0, 1)));
        let record = session.stop(Timestamp::new(0), Location::Unknown).unwrap();

        assert!(!session.record(acc(2, 1, 1, 1)));
        assert_eq!(session.dropped(), 2);
        assert_eq!(record.sample_count(), 1);
    }

    #[test]
    fn test_series_keeps_arrival_order() {
        let mut session = RideSession::new(AggregationPolicy::Series).for_device(DeviceId::new("BOX-01"));
        session.start(Timestamp::new(0)).unwrap();
        let samples = [acc(0, 1, 0, 0), acc(1, 1, 0, 1), acc(2, 1, 1, 1)];
        for s in samples {
            session.record(s);
        }
        let record = session.stop(Timestamp::new(3_000), Location::Unknown).unwrap();
        assert_eq!(record.device, Some(DeviceId::new("BOX-01")));
        match record.aggregate(Channel::Acceleration) {
            Some(ChannelAggregate::Series { samples: got }) => assert_eq!(got.as_slice(), &samples),
            other => panic!("unexpected aggregate {:?}", other),
        }
    }

    #[test]
    fn test_summary_statistics() {
        let mut session = RideSession::new(AggregationPolicy::Summary);
        session.start(Timestamp::new(0)).unwrap();
        session.record(acc(0, 0, 10, -4));
        session.record(acc(1, 4, 20, -2));
        let record = session.stop(Timestamp::new(0), Location::Unknown).unwrap();
        match record.aggregate(Channel::Acceleration) {
            Some(ChannelAggregate::Summary { count, axes: Some(axes) }) => {
                assert_eq!(*count, 2);
                assert_eq!((axes[0].min, axes[0].max), (0, 4));
                assert!((axes[1].mean - 15.0).abs() < f64::EPSILON);
                assert!((axes[2].mean + 3.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected aggregate {:?}", other),
        }
    }

    #[test]
    fn test_latest_policy() {
        let mut session = RideSession::new(AggregationPolicy::Latest);
        session.start(Timestamp::new(0)).unwrap();
        session.record(acc(0, 1, 1, 1));
        session.record(Sample {
            channel: Channel::Acceleration,
            timestamp: 1,
            axes: Axes::new(2, 2, 2),
        });
        let record = session.stop(Timestamp::new(0), Location::Unknown).unwrap();
        assert_eq!(
            record.aggregate(Channel::Acceleration),
            Some(&ChannelAggregate::Latest {
                count: 2,
                sample: Some(acc(1, 2, 2, 2))
            })
        );
    }

    #[test]
    fn test_inconsistent_aggregate_fails_stop() {
        let mut session = RideSession::new(AggregationPolicy::Series);
        session.start(Timestamp::new(0)).unwrap();
        session.record(acc(0, 1, 0, 0));
        *session.accepted.get_mut(&Channel::Acceleration).unwrap() += 1;
        assert_eq!(
            session.stop(Timestamp::new(0), Location::Unknown),
            Err(SessionError::InconsistentAggregate {
                channel: Channel::Acceleration,
                aggregated: 1,
                accepted: 2
            })
        );
        assert_eq!(session.state(), RideState::Ended);
        assert!(!session.record(acc(1, 1, 0, 0)));
        assert_eq!(session.tick(), None);
        assert_eq!(
            session.stop(Timestamp::new(0), Location::Unknown),
            Err(SessionError::NotRecording)
        );
    }

    #[test]
    fn test_elapsed_display() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3_725), "01:02:05");
        let mut session = RideSession::new(AggregationPolicy::Series);
        session.start(Timestamp::new(0)).unwrap();
        for _ in 0..61 {
            session.tick();
        }
        assert_eq!(session.elapsed_display(), "00:01:01");
    }
}
