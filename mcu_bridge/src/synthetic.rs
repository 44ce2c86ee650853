/*!
Synthetic IMU byte source for running the bridge without hardware.

Produces a slowly sweeping heading as valid telemetry frames, and every so
often a burst of line noise or a corrupted frame so the receive path has
something to resynchronize against.
*/

use mcu_link::Telemetry;
use std::io::{self, Read};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Every Nth frame is preceded by line noise
const NOISE_EVERY: u64 = 25;

/// Every Nth frame has its payload corrupted
const CORRUPT_EVERY: u64 = 40;

pub struct SyntheticImu {
    period: Duration,
    frame_counter: u64,
    pending: Vec<u8>,
}

impl SyntheticImu {
    /// Emit one report per `period`
    pub fn new(period: Duration) -> Self {
        info!("🧪 Starting synthetic IMU source ({:?} per report)", period);
        Self {
            period,
            frame_counter: 0,
            pending: Vec::new(),
        }
    }

    /// Heading for the given report number: one full turn every 720 reports
    pub fn heading(frame_number: u64) -> f32 {
        let turn = (frame_number % 720) as f32 / 2.0;
        if turn >= 180.0 {
            turn - 360.0
        } else {
            turn
        }
    }

    /// Bytes the MCU would put on the wire for one report
    pub fn generate_chunk(frame_number: u64) -> Vec<u8> {
        let mut chunk = Vec::with_capacity(16);

        if frame_number % NOISE_EVERY == NOISE_EVERY - 1 {
            chunk.extend_from_slice(&[0x99, 0x02, 0x7F, 0x13]);
        }

        let mut frame = Telemetry {
            angle: Self::heading(frame_number),
        }
        .encode()
        .into_bytes();

        if frame_number % CORRUPT_EVERY == CORRUPT_EVERY - 1 {
            frame[6] ^= 0x5A;
        }

        chunk.extend_from_slice(&frame);
        chunk
    }
}

impl Read for SyntheticImu {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            thread::sleep(self.period);
            self.pending = Self::generate_chunk(self.frame_counter);
            self.frame_counter += 1;

            if self.frame_counter % 500 == 0 {
                info!("🧪 Generated {} synthetic IMU reports", self.frame_counter);
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
