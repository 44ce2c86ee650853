/*!
# MCU Link

Transport core for the serial link between the host and the motor-control
microcontroller. Every unit on the wire is a fixed 12-byte frame guarded by
an additive checksum.

## Core Types

- [`Frame`] - 12-byte wire frame with checksum
- [`Telemetry`] - decoded inbound IMU heading
- [`PriorityQueue`] - three-tier outbound queue arbitrated by the transmit tick
- [`Commander`] - submission front-end used by application code
- [`ControlFrame`] - registry of the fixed control frames

## Modules

- [`frame`] - frame encoding, validation and telemetry decoding
- [`commands`] - command builders and control-frame registry
- [`queue`] - priority outbound queue
- [`commander`] - high-level command dispatch
- [`error`] - common error types
*/

pub mod commander;
pub mod commands;
pub mod error;
pub mod frame;
pub mod queue;

// Re-export commonly used types
pub use commander::Commander;
pub use commands::{BaseCommand, BaseControl, ControlFrame, ModeToggle};
pub use error::{LinkError, Result};
pub use frame::{Frame, FrameError, Telemetry};
pub use queue::{Priority, PriorityQueue, QueueCapacities, QueueStats};

/// Version information for the link library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    use std::time::Duration;

    /// Size of a frame in bytes
    pub const FRAME_SIZE: usize = 12;

    /// Size of the payload field in bytes
    pub const PAYLOAD_SIZE: usize = 8;

    /// Leading byte of every frame
    pub const SYNC_BYTE: u8 = 0x99;

    /// Class byte of inbound telemetry and MCU configuration frames
    pub const CLASS_TELEMETRY: u8 = 0x01;

    /// Class byte of host-to-MCU command frames
    pub const CLASS_COMMAND: u8 = 0x02;

    /// Command id carried by inbound IMU reports
    pub const TELEMETRY_ID: u8 = 0x01;

    pub const OFFSET_CLASS: usize = 1;
    pub const OFFSET_COMMAND: usize = 2;
    pub const OFFSET_CHECKSUM: usize = 3;
    pub const OFFSET_PAYLOAD: usize = 4;

    /// Heading is an int16 stored little-endian at these offsets
    pub const OFFSET_ANGLE_LOW: usize = 8;
    pub const OFFSET_ANGLE_HIGH: usize = 9;

    /// Line rate of the MCU link
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;

    /// One frame takes ~1.04 ms at 115200 baud, so a 2 ms tick never overlaps
    pub const DEFAULT_TX_INTERVAL: Duration = Duration::from_millis(2);

    /// Back-off when a read returns no data
    pub const DEFAULT_RX_IDLE_SLEEP: Duration = Duration::from_micros(100);
}
