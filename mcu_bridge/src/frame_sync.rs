/*!
Byte-stream frame synchronization state machine.

The MCU link has no delimiters beyond the leading sync byte, so the receive
side hunts for `0x99`, accumulates exactly one frame, and validates it. Any
failure drops back to hunting.

A `0x99` inside the payload window is ordinary data (float payloads contain
it) and does not restart framing. Instead, when a frame is abandoned the
engine rescans the bytes it had buffered after the leading sync byte and
restarts from the next `0x99` found there. That recovers a good frame which
began inside a truncated one, e.g. after the MCU power-cycles mid-frame.
*/

use mcu_link::protocol::{FRAME_SIZE, OFFSET_COMMAND, SYNC_BYTE, TELEMETRY_ID};
use mcu_link::{FrameError, Telemetry};
use tracing::{debug, warn};

/// Frame synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Discarding bytes until a sync byte shows up
    Idle,
    /// Accumulating a frame that started with a sync byte
    Syncing,
}

/// Receive-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub frames_decoded: u64,
    pub checksum_errors: u64,
    pub framing_desyncs: u64,
    pub bytes_discarded: u64,
}

/// Frame synchronization engine
pub struct FrameSyncEngine {
    state: SyncState,
    buffer: Vec<u8>,
    stats: SyncStats,
}

impl FrameSyncEngine {
    /// Create a new frame synchronization engine
    pub fn new() -> Self {
        Self {
            state: SyncState::Idle,
            buffer: Vec::with_capacity(FRAME_SIZE),
            stats: SyncStats::default(),
        }
    }

    /// Get current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Get statistics
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Bytes of the frame currently being accumulated
    pub fn current_buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Feed a chunk of received bytes, calling `on_telemetry` per decoded frame
    pub fn feed(&mut self, bytes: &[u8], mut on_telemetry: impl FnMut(Telemetry)) {
        for &byte in bytes {
            if let Some(telemetry) = self.process_byte(byte) {
                on_telemetry(telemetry);
            }
        }
    }

    /// Advance the state machine by one byte
    pub fn process_byte(&mut self, byte: u8) -> Option<Telemetry> {
        match self.state {
            SyncState::Idle => {
                if byte == SYNC_BYTE {
                    self.buffer.clear();
                    self.buffer.push(byte);
                    self.state = SyncState::Syncing;
                } else {
                    self.stats.bytes_discarded += 1;
                }
                None
            }

            SyncState::Syncing => {
                self.buffer.push(byte);

                if self.buffer.len() == OFFSET_COMMAND + 1 && byte != TELEMETRY_ID {
                    debug!("Framing desync: marker 0x{:02X} is not telemetry", byte);
                    self.stats.framing_desyncs += 1;
                    return self.abandon();
                }

                if self.buffer.len() < FRAME_SIZE {
                    return None;
                }

                let mut frame = [0u8; FRAME_SIZE];
                frame.copy_from_slice(&self.buffer);

                match Telemetry::decode(&frame) {
                    Ok(telemetry) => {
                        self.stats.frames_decoded += 1;
                        self.reset();
                        Some(telemetry)
                    }
                    Err(FrameError::ChecksumMismatch { expected, actual }) => {
                        warn!(
                            "Checksum error (got 0x{:02X}, want 0x{:02X}): [{}]",
                            actual,
                            expected,
                            hex::encode_upper(frame)
                        );
                        self.stats.checksum_errors += 1;
                        self.abandon()
                    }
                    Err(e) => {
                        debug!("Dropping frame: {}", e);
                        self.stats.framing_desyncs += 1;
                        self.abandon()
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.state = SyncState::Idle;
    }

    /// Drop the current frame and replay its tail from the next sync byte
    fn abandon(&mut self) -> Option<Telemetry> {
        let rejected = std::mem::take(&mut self.buffer);
        self.state = SyncState::Idle;

        let restart = rejected
            .iter()
            .skip(1)
            .position(|&b| b == SYNC_BYTE)
            .map(|pos| pos + 1);

        match restart {
            Some(start) => {
                self.stats.bytes_discarded += start as u64;
                // The replayed tail is shorter than a frame, so it can only
                // leave us mid-frame, never emit.
                for &b in &rejected[start..] {
                    self.process_byte(b);
                }
                None
            }
            None => {
                self.stats.bytes_discarded += rejected.len() as u64;
                None
            }
        }
    }
}

impl Default for FrameSyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(angle: f32) -> [u8; FRAME_SIZE] {
        Telemetry { angle }.encode().into_bytes()
    }

    fn collect(engine: &mut FrameSyncEngine, bytes: &[u8]) -> Vec<f32> {
        let mut out = Vec::new();
        engine.feed(bytes, |t| out.push(t.angle));
        out
    }

    #[test]
    fn test_clean_frame() {
        let mut engine = FrameSyncEngine::new();
        assert_eq!(collect(&mut engine, &heading(90.0)), vec![90.0]);
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().frames_decoded, 1);
    }

    #[test]
    fn test_garbage_prefix_then_frame() {
        let mut engine = FrameSyncEngine::new();
        let mut stream = vec![0x00, 0x13, 0x99, 0x02, 0x0E, 0xFF, 0x42];
        stream.extend_from_slice(&heading(-45.0));

        assert_eq!(collect(&mut engine, &stream), vec![-45.0]);
        assert_eq!(engine.stats().frames_decoded, 1);
        assert_eq!(engine.stats().framing_desyncs, 1);
    }

    #[test]
    fn test_checksum_error_discarded() {
        let mut engine = FrameSyncEngine::new();
        let mut bad = heading(10.0);
        bad[9] ^= 0x01;

        assert!(collect(&mut engine, &bad).is_empty());
        assert_eq!(engine.stats().checksum_errors, 1);
        assert_eq!(engine.state(), SyncState::Idle);

        assert_eq!(collect(&mut engine, &heading(20.0)).len(), 1);
    }

    #[test]
    fn test_split_reads() {
        let mut engine = FrameSyncEngine::new();
        let frame = heading(30.0);

        assert!(collect(&mut engine, &frame[..5]).is_empty());
        assert_eq!(engine.current_buffer().len(), 5);
        assert_eq!(collect(&mut engine, &frame[5..]).len(), 1);
    }

    #[test]
    fn test_truncated_frame_recovers_next() {
        let mut engine = FrameSyncEngine::new();
        let mut stream = heading(60.0)[..5].to_vec();
        stream.extend_from_slice(&heading(-135.0));

        assert_eq!(collect(&mut engine, &stream), vec![-135.0]);
        assert_eq!(engine.stats().checksum_errors, 1);
    }

    #[test]
    fn test_sync_byte_inside_payload() {
        let mut bytes = [0x99, 0x01, 0x01, 0x00, 0x99, 0x99, 0, 0, 0x00, 0x20, 0x99, 0];
        bytes[3] = mcu_link::frame::checksum(&bytes);

        let mut engine = FrameSyncEngine::new();
        assert_eq!(collect(&mut engine, &bytes), vec![45.0]);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut engine = FrameSyncEngine::new();
        let mut stream = Vec::new();
        for angle in [22.5f32, 45.0, 67.5] {
            stream.extend_from_slice(&heading(angle));
        }
        assert_eq!(collect(&mut engine, &stream).len(), 3);
    }
}
