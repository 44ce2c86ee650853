/*!
Frame encoding and validation.

Every frame on the link is exactly 12 bytes:

```text
offset  0      1      2        3         4 .. 11
        SYNC   CLASS  COMMAND  CHECKSUM  PAYLOAD (8 bytes)
```

The checksum is the sum of the other eleven bytes modulo 256. It is a plain
additive checksum: any single bit flip is caught, but two flips of the same
bit weight in opposite directions cancel out.
*/

use crate::protocol::{
    CLASS_COMMAND, CLASS_TELEMETRY, FRAME_SIZE, OFFSET_ANGLE_HIGH, OFFSET_ANGLE_LOW,
    OFFSET_CHECKSUM, OFFSET_CLASS, OFFSET_COMMAND, OFFSET_PAYLOAD, PAYLOAD_SIZE, SYNC_BYTE,
    TELEMETRY_ID,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while validating an inbound frame
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid frame length: expected 12 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Bad sync byte: 0x{0:02X}")]
    BadSync(u8),

    #[error("Framing desync: expected telemetry marker 0x01, got 0x{0:02X}")]
    FramingDesync(u8),

    #[error("Checksum mismatch: frame carries 0x{actual:02X}, computed 0x{expected:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Additive checksum over every byte except the checksum slot
pub const fn checksum(bytes: &[u8; FRAME_SIZE]) -> u8 {
    let mut sum: u8 = 0;
    let mut i = 0;
    while i < FRAME_SIZE {
        if i != OFFSET_CHECKSUM {
            sum = sum.wrapping_add(bytes[i]);
        }
        i += 1;
    }
    sum
}

fn verify_checksum(bytes: &[u8; FRAME_SIZE]) -> Result<(), FrameError> {
    let expected = checksum(bytes);
    let actual = bytes[OFFSET_CHECKSUM];
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// A complete, checksummed 12-byte frame
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_SIZE]);

impl Frame {
    /// Lay out a frame of any class and fill in its checksum
    pub const fn build(class: u8, command_id: u8, payload: [u8; PAYLOAD_SIZE]) -> Self {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0] = SYNC_BYTE;
        bytes[OFFSET_CLASS] = class;
        bytes[OFFSET_COMMAND] = command_id;

        let mut i = 0;
        while i < PAYLOAD_SIZE {
            bytes[OFFSET_PAYLOAD + i] = payload[i];
            i += 1;
        }

        bytes[OFFSET_CHECKSUM] = checksum(&bytes);
        Frame(bytes)
    }

    /// Encode a host-to-MCU command frame
    pub const fn encode(command_id: u8, payload: [u8; PAYLOAD_SIZE]) -> Self {
        Self::build(CLASS_COMMAND, command_id, payload)
    }

    /// Validate sync byte and checksum of a raw frame
    pub fn from_bytes(bytes: &[u8; FRAME_SIZE]) -> Result<Self, FrameError> {
        if bytes[0] != SYNC_BYTE {
            return Err(FrameError::BadSync(bytes[0]));
        }
        verify_checksum(bytes)?;
        Ok(Frame(*bytes))
    }

    /// Validate a frame held in a slice of unknown length
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FrameError> {
        let array: &[u8; FRAME_SIZE] = bytes
            .try_into()
            .map_err(|_| FrameError::InvalidLength(bytes.len()))?;
        Self::from_bytes(array)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; FRAME_SIZE] {
        self.0
    }

    pub fn class(&self) -> u8 {
        self.0[OFFSET_CLASS]
    }

    pub fn command_id(&self) -> u8 {
        self.0[OFFSET_COMMAND]
    }

    pub fn checksum(&self) -> u8 {
        self.0[OFFSET_CHECKSUM]
    }

    /// The 8 payload bytes
    pub fn payload(&self) -> [u8; PAYLOAD_SIZE] {
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&self.0[OFFSET_PAYLOAD..]);
        payload
    }

    /// Interpret payload bytes 0..4 as a little-endian f32
    pub fn payload_f32(&self) -> f32 {
        let p = self.payload();
        f32::from_le_bytes([p[0], p[1], p[2], p[3]])
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&hex::encode_upper([*byte]))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[{}]", self)
    }
}

/// Bit-reinterpret a float as 4 little-endian bytes
pub fn float32_to_le_bytes(value: f32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Payload carrying a float in bytes 0..4, zero padded
pub fn float_payload(value: f32) -> [u8; PAYLOAD_SIZE] {
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload[..4].copy_from_slice(&float32_to_le_bytes(value));
    payload
}

/// Convert the raw int16 heading into degrees
pub fn convert_to_angle(low: u8, high: u8) -> f32 {
    i16::from_le_bytes([low, high]) as f32 / 32768.0 * 180.0
}

/// One decoded IMU report from the MCU
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Heading in degrees, roughly -180..180
    pub angle: f32,
}

impl Telemetry {
    /// Validate and decode an inbound telemetry frame
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Result<Self, FrameError> {
        if bytes[0] != SYNC_BYTE {
            return Err(FrameError::BadSync(bytes[0]));
        }
        if bytes[OFFSET_COMMAND] != TELEMETRY_ID {
            return Err(FrameError::FramingDesync(bytes[OFFSET_COMMAND]));
        }
        verify_checksum(bytes)?;

        Ok(Self {
            angle: convert_to_angle(bytes[OFFSET_ANGLE_LOW], bytes[OFFSET_ANGLE_HIGH]),
        })
    }

    /// Decode an already checksum-validated frame
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        Self::decode(frame.as_bytes())
    }

    /// Build the frame the MCU would send for this heading
    ///
    /// Used by the synthetic IMU source and tests. Headings outside the int16
    /// range saturate.
    pub fn encode(&self) -> Frame {
        let raw = (self.angle / 180.0 * 32768.0)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        let [low, high] = raw.to_le_bytes();

        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[OFFSET_ANGLE_LOW - OFFSET_PAYLOAD] = low;
        payload[OFFSET_ANGLE_HIGH - OFFSET_PAYLOAD] = high;
        Frame::build(CLASS_TELEMETRY, TELEMETRY_ID, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_velocity_frame_layout() {
        let frame = Frame::encode(0x0E, float_payload(-2.5));
        let b = (-2.5f32).to_le_bytes();

        let mut expected = [0x99, 0x02, 0x0E, 0x00, b[0], b[1], b[2], b[3], 0, 0, 0, 0];
        let sum = expected
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 3)
            .fold(0u8, |acc, (_, v)| acc.wrapping_add(*v));
        expected[3] = sum;

        assert_eq!(frame.as_bytes(), &expected);
        assert_eq!(frame.payload_f32(), -2.5);
    }

    #[test]
    fn test_telemetry_decode_example() {
        let mut bytes = [0x99, 0x01, 0x01, 0x00, 0, 0, 0, 0, 0x00, 0x40, 0, 0];
        bytes[3] = checksum(&bytes);

        let telemetry = Telemetry::decode(&bytes).unwrap();
        assert_eq!(telemetry.angle, 90.0);
    }

    #[test]
    fn test_negative_angle() {
        assert_eq!(convert_to_angle(0x00, 0xC0), -90.0);
        assert_eq!(convert_to_angle(0x00, 0x80), -180.0);
    }

    #[test]
    fn test_telemetry_rejects_command_marker() {
        let frame = Frame::encode(0x0E, float_payload(1.0));
        assert_eq!(
            Telemetry::decode(frame.as_bytes()),
            Err(FrameError::FramingDesync(0x0E))
        );
    }

    #[test]
    fn test_bad_sync() {
        let mut bytes = *Frame::encode(0x10, [1, 0, 0, 0, 0, 0, 0, 0]).as_bytes();
        bytes[0] = 0x98;
        assert_eq!(Frame::from_bytes(&bytes), Err(FrameError::BadSync(0x98)));
    }

    #[test]
    fn test_from_slice_length() {
        assert_eq!(
            Frame::from_slice(&[0x99, 0x02]),
            Err(FrameError::InvalidLength(2))
        );
    }

    #[test]
    fn test_single_bit_flips_detected() {
        let frame = Frame::encode(0x0F, float_payload(37.25));

        for byte in 1..FRAME_SIZE {
            for bit in 0..8 {
                let mut bytes = *frame.as_bytes();
                bytes[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        Frame::from_bytes(&bytes),
                        Err(FrameError::ChecksumMismatch { .. })
                    ),
                    "flip of byte {} bit {} went undetected",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_opposite_flips_cancel() {
        // Known weakness of an additive checksum: +4 in one byte and -4 in
        // another leave the sum unchanged.
        let mut bytes = *Frame::encode(0x10, [0x04, 0, 0, 0, 0, 0, 0, 0]).as_bytes();
        bytes[4] ^= 0x04;
        bytes[5] ^= 0x04;
        assert!(Frame::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn test_display_hex() {
        let frame = Frame::encode(0x00, [0; 8]);
        assert_eq!(frame.to_string(), "99 02 00 9B 00 00 00 00 00 00 00 00");
    }

    proptest! {
        #[test]
        fn prop_encode_then_validate(command_id in any::<u8>(), payload in any::<[u8; 8]>()) {
            let frame = Frame::encode(command_id, payload);
            let parsed = Frame::from_bytes(frame.as_bytes()).unwrap();
            prop_assert_eq!(parsed, frame);
            prop_assert_eq!(parsed.command_id(), command_id);
            prop_assert_eq!(parsed.payload(), payload);
        }

        #[test]
        fn prop_telemetry_angle_survives(angle in -179.9f32..179.9f32) {
            let decoded = Telemetry::from_frame(&Telemetry { angle }.encode()).unwrap();
            prop_assert!((decoded.angle - angle).abs() <= 180.0 / 32768.0);
        }
    }
}
