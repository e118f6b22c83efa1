//! Frame codec for inertial notifications
//!
//! A frame is the raw payload of one characteristic notification together
//! with the feature mask of the characteristic that produced it. The layout is
//! fixed by the mask:
//!
//! ```text
//! | timestamp u16 LE | x i16 LE | y i16 LE | z i16 LE | ... one triple per channel bit
//! ```
//!
//! Channel triples appear from the highest mask bit down, so a combined
//! inertial frame (`0x00E00000`) is `ts, acc xyz, gyro xyz, mag xyz`.
//! The channel is always recovered from the mask, never from the payload
//! contents.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::errors::DecodeError;
use crate::feature::{Channel, FeatureMask};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size of the device timestamp prefix
pub const TIMESTAMP_SIZE: usize = 2;

/// Size of one three-axis triple
pub const AXES_SIZE: usize = 6;

// ----------------------------------------------------------------------------
// Frame and Sample
// ----------------------------------------------------------------------------

/// Raw notification payload tagged with its feature mask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub mask: FeatureMask,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(mask: FeatureMask, payload: Vec<u8>) -> Self {
        Self { mask, payload }
    }

    /// Tag a notification payload using the characteristic it arrived on
    pub fn from_characteristic(characteristic: &Uuid, payload: Vec<u8>) -> Result<Self, DecodeError> {
        let mask = FeatureMask::from_characteristic_uuid(characteristic).ok_or_else(|| {
            DecodeError::UnknownCharacteristic {
                uuid: characteristic.to_string(),
            }
        })?;
        Ok(Self { mask, payload })
    }

    /// Exact payload length required by the frame's tag
    pub fn expected_len(&self) -> usize {
        TIMESTAMP_SIZE + AXES_SIZE * self.mask.channels().len()
    }

    /// Payload as lowercase hex, for trace logs
    pub fn payload_hex(&self) -> String {
        hex::encode(&self.payload)
    }
}

/// Three-axis raw reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Axes {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl Axes {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    pub fn as_array(&self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<(i16, i16, i16)> for Axes {
    fn from((x, y, z): (i16, i16, i16)) -> Self {
        Self { x, y, z }
    }
}

/// One decoded reading for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub channel: Channel,
    /// Device tick counter, wraps at `u16::MAX`
    pub timestamp: u16,
    pub axes: Axes,
}

impl Sample {
    pub fn new(channel: Channel, timestamp: u16, axes: impl Into<Axes>) -> Self {
        Self {
            channel,
            timestamp,
            axes: axes.into(),
        }
    }

    /// Axis values in the channel's physical unit
    pub fn values(&self) -> [f32; 3] {
        let scale = self.channel.scale();
        let [x, y, z] = self.axes.as_array();
        [x as f32 * scale, y as f32 * scale, z as f32 * scale]
    }
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Stateless encoder/decoder for inertial frames
pub struct FrameCodec;

impl FrameCodec {
    /// Decode the sample for `channel` out of `frame`
    pub fn decode(frame: &Frame, channel: Channel) -> Result<Sample, DecodeError> {
        Self::validate_tag(frame.mask)?;
        let slot = frame
            .mask
            .slot_of(channel)
            .ok_or(DecodeError::InvalidChannelTag { mask: frame.mask })?;

        Self::validate_len(frame)?;
        let timestamp = u16::from_le_bytes([frame.payload[0], frame.payload[1]]);
        let offset = TIMESTAMP_SIZE + slot * AXES_SIZE;
        let axes = read_axes(&frame.payload[offset..offset + AXES_SIZE]);
        Self::validate_range(channel, &axes)?;

        Ok(Sample {
            channel,
            timestamp,
            axes,
        })
    }

    /// Decode every sample a frame carries, in frame order
    pub fn decode_all(frame: &Frame) -> Result<SmallVec<[Sample; 3]>, DecodeError> {
        Self::validate_tag(frame.mask)?;
        let channels = frame.mask.channels();
        if channels.is_empty() {
            return Err(DecodeError::InvalidChannelTag { mask: frame.mask });
        }
        channels
            .into_iter()
            .map(|channel| Self::decode(frame, channel))
            .collect()
    }

    /// Build a frame from samples sharing one device timestamp
    ///
    /// The tag is the union of the samples' channels; samples may be given in
    /// any order but each channel at most once.
    pub fn encode(timestamp: u16, samples: &[Sample]) -> Result<Frame, DecodeError> {
        let mask = samples
            .iter()
            .fold(FeatureMask::EMPTY, |mask, s| mask.union(s.channel.mask()));
        let channels = mask.channels();
        if channels.is_empty() || channels.len() != samples.len() {
            return Err(DecodeError::InvalidChannelTag { mask });
        }

        let mut payload = Vec::with_capacity(TIMESTAMP_SIZE + AXES_SIZE * channels.len());
        payload.extend_from_slice(&timestamp.to_le_bytes());
        for channel in channels {
            // Present by construction of the mask
            if let Some(sample) = samples.iter().find(|s| s.channel == channel) {
                Self::validate_range(channel, &sample.axes)?;
                for value in sample.axes.as_array() {
                    payload.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        Ok(Frame { mask, payload })
    }

    fn validate_tag(mask: FeatureMask) -> Result<(), DecodeError> {
        if mask.is_empty() || mask.unknown_bits() != 0 {
            return Err(DecodeError::InvalidChannelTag { mask });
        }
        Ok(())
    }

    fn validate_len(frame: &Frame) -> Result<(), DecodeError> {
        let expected = frame.expected_len();
        if frame.payload.len() != expected {
            return Err(DecodeError::WrongLength {
                expected,
                actual: frame.payload.len(),
            });
        }
        Ok(())
    }

    fn validate_range(channel: Channel, axes: &Axes) -> Result<(), DecodeError> {
        if let Some(limit) = channel.full_scale() {
            if let Some(value) = axes
                .as_array()
                .into_iter()
                .find(|v| v.unsigned_abs() > limit as u16)
            {
                return Err(DecodeError::OutOfRange { channel, value });
            }
        }
        Ok(())
    }
}

fn read_axes(bytes: &[u8]) -> Axes {
    Axes {
        x: i16::from_le_bytes([bytes[0], bytes[1]]),
        y: i16::from_le_bytes([bytes[2], bytes[3]]),
        z: i16::from_le_bytes([bytes[4], bytes[5]]),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(x: i16, y: i16, z: i16) -> Sample {
        Sample::new(Channel::Acceleration, 7, (x, y, z))
    }

    #[test]
    fn test_single_channel_round_trip() {
        let sample = acc(-981, 12, 1003);
        let frame = FrameCodec::encode(7, &[sample]).unwrap();
        assert_eq!(frame.mask, FeatureMask::ACCELERATION);
        assert_eq!(frame.payload.len(), 8);
        assert_eq!(FrameCodec::decode(&frame, Channel::Acceleration).unwrap(), sample);
    }

    #[test]
    fn test_combined_frame_layout() {
        let gyro = Sample::new(Channel::AngularRate, 7, (10, -20, 30));
        let mag = Sample::new(Channel::Magnetic, 7, (400, 500, -600));
        // Given out of order; encoded highest bit first
        let frame = FrameCodec::encode(7, &[mag, gyro, acc(1, 2, 3)]).unwrap();
        assert_eq!(frame.mask, FeatureMask::INERTIAL);
        assert_eq!(&frame.payload[2..4], &1i16.to_le_bytes());
        assert_eq!(&frame.payload[8..10], &10i16.to_le_bytes());

        let all = FrameCodec::decode_all(&frame).unwrap();
        assert_eq!(all.as_slice(), &[acc(1, 2, 3), gyro, mag]);
    }

    #[test]
    fn test_one_byte_short_fails() {
        let frame = FrameCodec::encode(1, &[acc(1, 0, 0)]).unwrap();
        let short = Frame::new(frame.mask, frame.payload[..frame.payload.len() - 1].to_vec());
        assert_eq!(
            FrameCodec::decode(&short, Channel::Acceleration),
            Err(DecodeError::WrongLength {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn test_channel_must_match_tag() {
        let frame = FrameCodec::encode(1, &[acc(1, 0, 0)]).unwrap();
        assert_eq!(
            FrameCodec::decode(&frame, Channel::AngularRate),
            Err(DecodeError::InvalidChannelTag {
                mask: FeatureMask::ACCELERATION
            })
        );
    }

    #[test]
    fn test_unknown_tag_bits_rejected() {
        let frame = Frame::new(FeatureMask::new(0x0080_0001), vec![0; 8]);
        assert!(matches!(
            FrameCodec::decode(&frame, Channel::Acceleration),
            Err(DecodeError::InvalidChannelTag { .. })
        ));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut payload = vec![0u8, 0];
        for v in [0i16, 16_001, 0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let frame = Frame::new(FeatureMask::ACCELERATION, payload);
        assert_eq!(
            FrameCodec::decode(&frame, Channel::Acceleration),
            Err(DecodeError::OutOfRange {
                channel: Channel::Acceleration,
                value: 16_001
            })
        );
        assert!(FrameCodec::encode(0, &[acc(i16::MIN, 0, 0)]).is_err());
    }

    #[test]
    fn test_magnetic_has_no_full_scale() {
        let mag = Sample::new(Channel::Magnetic, 0, (i16::MAX, i16::MIN, 0));
        let frame = FrameCodec::encode(0, &[mag]).unwrap();
        assert_eq!(FrameCodec::decode(&frame, Channel::Magnetic).unwrap(), mag);
    }

    #[test]
    fn test_from_characteristic() {
        let uuid = FeatureMask::ANGULAR_RATE.characteristic_uuid();
        let frame = Frame::from_characteristic(&uuid, vec![0; 8]).unwrap();
        assert_eq!(frame.mask, FeatureMask::ANGULAR_RATE);
        assert_eq!(frame.payload_hex(), "0000000000000000");

        let other = Uuid::from_u128(0x2A19);
        assert!(matches!(
            Frame::from_characteristic(&other, vec![]),
            Err(DecodeError::UnknownCharacteristic { .. })
        ));
    }

    #[test]
    fn test_physical_values() {
        let gyro = Sample::new(Channel::AngularRate, 0, (125, -10, 0));
        assert_eq!(gyro.values(), [12.5, -1.0, 0.0]);
    }

    #[test]
    fn test_duplicate_channel_rejected_on_encode() {
        assert!(FrameCodec::encode(0, &[acc(1, 1, 1), acc(2, 2, 2)]).is_err());
    }
}
