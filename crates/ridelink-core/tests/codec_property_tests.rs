//! Property-based tests for the frame codec and ride aggregation
//!
//! These tests verify that framing errors are always detected, that samples
//! survive encoding for every in-range value, and that ride duration depends
//! only on elapsed ticks.

use std::time::Duration;

use proptest::prelude::*;
use ridelink_core::{
    codec::{Frame, FrameCodec, Sample},
    errors::DecodeError,
    feature::{Channel, FeatureMask},
    ride::{AggregationPolicy, RideSession},
    types::{Location, Timestamp},
};

/// Generate an in-range raw axis value for a channel
fn arb_axis(channel: Channel) -> BoxedStrategy<i16> {
    match channel.full_scale() {
        Some(limit) => (-limit..=limit).boxed(),
        None => any::<i16>().boxed(),
    }
}

/// Generate a valid sample for a channel
fn arb_sample(channel: Channel) -> impl Strategy<Value = Sample> {
    (any::<u16>(), arb_axis(channel), arb_axis(channel), arb_axis(channel))
        .prop_map(move |(ts, x, y, z)| Sample::new(channel, ts, (x, y, z)))
}

fn arb_channel() -> impl Strategy<Value = Channel> {
    prop::sample::select(Channel::ALL.to_vec())
}

/// Generate a non-empty combination of channels
fn arb_mask() -> impl Strategy<Value = FeatureMask> {
    (1u32..8).prop_map(|bits| FeatureMask::new(bits << 21))
}

fn arb_policy() -> impl Strategy<Value = AggregationPolicy> {
    prop_oneof![
        Just(AggregationPolicy::Latest),
        Just(AggregationPolicy::Series),
        Just(AggregationPolicy::Summary),
    ]
}

proptest! {
    /// Property: a frame one byte short of its tag's layout never decodes
    #[test]
    fn one_byte_short_always_fails(mask in arb_mask(), seed in any::<u8>()) {
        let expected = Frame::new(mask, Vec::new()).expected_len();
        let payload = vec![seed; expected - 1];
        let frame = Frame::new(mask, payload);

        for channel in mask.channels() {
            prop_assert_eq!(
                FrameCodec::decode(&frame, channel),
                Err(DecodeError::WrongLength { expected, actual: expected - 1 })
            );
        }
    }

    /// Property: any length other than the layout length is rejected
    #[test]
    fn wrong_length_rejected(mask in arb_mask(), len in 0usize..40) {
        let frame = Frame::new(mask, vec![0; len]);
        prop_assume!(len != frame.expected_len());
        let channel = mask.channels()[0];
        let rejected = matches!(
            FrameCodec::decode(&frame, channel),
            Err(DecodeError::WrongLength { .. })
        );
        prop_assert!(rejected);
    }

    /// Property: in-range samples decode to exactly what was encoded
    #[test]
    fn encoded_sample_decodes(sample in arb_channel().prop_flat_map(arb_sample)) {
        let frame = FrameCodec::encode(sample.timestamp, &[sample]).unwrap();
        prop_assert_eq!(frame.mask, sample.channel.mask());
        prop_assert_eq!(FrameCodec::decode(&frame, sample.channel).unwrap(), sample);
    }

    /// Property: the channel comes from the tag, so a frame for one channel
    /// never yields a sample for another
    #[test]
    fn channel_never_crosses_tag(
        sample in arb_sample(Channel::Acceleration),
    ) {
        let frame = FrameCodec::encode(sample.timestamp, &[sample]).unwrap();
        let wrong_gyro = matches!(
            FrameCodec::decode(&frame, Channel::AngularRate),
            Err(DecodeError::InvalidChannelTag { .. })
        );
        let wrong_mag = matches!(
            FrameCodec::decode(&frame, Channel::Magnetic),
            Err(DecodeError::InvalidChannelTag { .. })
        );
        prop_assert!(wrong_gyro);
        prop_assert!(wrong_mag);
    }

    /// Property: ride duration equals the tick count, whatever was recorded
    #[test]
    fn duration_ignores_sample_count(
        ticks in 0u64..400,
        samples in prop::collection::vec(arb_channel().prop_flat_map(arb_sample), 0..200),
        policy in arb_policy(),
    ) {
        let mut session = RideSession::new(policy);
        let start = Timestamp::new(1_000);
        session.start(start).unwrap();
        for sample in &samples {
            prop_assert!(session.record(*sample));
        }
        for _ in 0..ticks {
            session.tick();
        }

        let record = session.stop(start, Location::Unknown).unwrap();
        prop_assert_eq!(record.duration, Duration::from_secs(ticks));
        prop_assert_eq!(record.sample_count(), samples.len() as u64);
    }
}
