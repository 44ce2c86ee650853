/*!
Command builders and the control-frame registry.

Dynamic commands (velocity, angle, rotate mode) are encoded on demand.
Fixed control operations are constant frames looked up through
[`ControlFrame`], whose checksums are computed at compile time.
*/

use crate::error::{LinkError, Result};
use crate::frame::{float32_to_le_bytes, float_payload, Frame};
use crate::protocol::{CLASS_COMMAND, CLASS_TELEMETRY, PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};

/// Command ids of dynamically encoded commands
pub mod command_id {
    pub const VELOCITY: u8 = 0x0E;
    pub const ANGLE: u8 = 0x0F;
    pub const ROTATE_MODE: u8 = 0x10;
}

/// Mode byte that makes the MCU rotate the base to an absolute angle
pub const ROTATE_TO_ANGLE_MODE: u8 = 0x04;

/// Base velocity command
pub fn velocity(value: f32) -> Frame {
    Frame::encode(command_id::VELOCITY, float_payload(value))
}

/// Base heading command
pub fn angle(value: f32) -> Frame {
    Frame::encode(command_id::ANGLE, float_payload(value))
}

/// Rotate-mode command carrying a single mode byte
pub fn rotate_mode(mode: u8) -> Frame {
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload[0] = mode;
    Frame::encode(command_id::ROTATE_MODE, payload)
}

/// Rotate the base to an absolute angle
///
/// Payload is the rotate-to mode byte followed by the float angle.
pub fn rotate_to(angle: f32) -> Frame {
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload[0] = ROTATE_TO_ANGLE_MODE;
    payload[1..5].copy_from_slice(&float32_to_le_bytes(angle));
    Frame::encode(command_id::ROTATE_MODE, payload)
}

/// Drive command as produced by the gamepad mapper
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BaseCommand {
    pub velocity: f32,
    pub angle: f32,
    pub rotate: u8,
}

impl BaseCommand {
    /// Velocity, angle and rotate-mode frames, in transmit order
    pub fn frames(&self) -> [Frame; 3] {
        [
            velocity(self.velocity),
            angle(self.angle),
            rotate_mode(self.rotate),
        ]
    }
}

const fn op(class: u8, command_id: u8, arg: u8) -> Frame {
    Frame::build(class, command_id, [arg, 0, 0, 0, 0, 0, 0, 0])
}

/// Fixed control frames understood by the MCU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlFrame {
    Idle,
    ClosedLoop,
    Homing,
    ResetImu,
    ResetEncoder,
    ClearErrors,
    ManualMode,
    SemiAutoMode,
    RotateMode,
    EmergencyStop,
    PushBall,
    AutoIdle,
    GoBack,
    GoStraight,
    TurnLeft,
    TurnRight,
    Rotate180,
}

impl ControlFrame {
    pub const ALL: [ControlFrame; 17] = [
        Self::Idle,
        Self::ClosedLoop,
        Self::Homing,
        Self::ResetImu,
        Self::ResetEncoder,
        Self::ClearErrors,
        Self::ManualMode,
        Self::SemiAutoMode,
        Self::RotateMode,
        Self::EmergencyStop,
        Self::PushBall,
        Self::AutoIdle,
        Self::GoBack,
        Self::GoStraight,
        Self::TurnLeft,
        Self::TurnRight,
        Self::Rotate180,
    ];

    /// The wire frame for this operation
    pub const fn frame(self) -> Frame {
        match self {
            Self::Idle => op(CLASS_COMMAND, 0x00, 0x00),
            Self::ClosedLoop => op(CLASS_COMMAND, 0x00, 0x01),
            Self::Homing => op(CLASS_COMMAND, 0x00, 0x02),
            Self::ResetImu => op(CLASS_TELEMETRY, 0x00, 0x01),
            Self::ResetEncoder => op(CLASS_TELEMETRY, 0x02, 0x01),
            Self::ClearErrors => op(CLASS_COMMAND, 0x01, 0x00),
            Self::ManualMode => op(CLASS_COMMAND, 0x00, 0x0A),
            Self::SemiAutoMode => op(CLASS_COMMAND, 0x00, 0x0B),
            Self::RotateMode => op(CLASS_COMMAND, 0x00, 0x0C),
            Self::EmergencyStop => op(CLASS_COMMAND, 0x00, 0x0F),
            Self::PushBall => op(CLASS_COMMAND, 0x00, 0x0D),
            Self::AutoIdle => op(CLASS_COMMAND, 0x11, 0x00),
            Self::GoBack => op(CLASS_COMMAND, 0x11, 0x01),
            Self::GoStraight => op(CLASS_COMMAND, 0x11, 0x02),
            Self::TurnLeft => op(CLASS_COMMAND, 0x11, 0x03),
            Self::TurnRight => op(CLASS_COMMAND, 0x11, 0x04),
            Self::Rotate180 => op(CLASS_COMMAND, 0x11, 0x05),
        }
    }

    /// Parse an operation name (case-insensitive, `-` or `_` separated)
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.to_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|op| op.name() == wanted)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ClosedLoop => "closed_loop",
            Self::Homing => "homing",
            Self::ResetImu => "reset_imu",
            Self::ResetEncoder => "reset_encoder",
            Self::ClearErrors => "clear_errors",
            Self::ManualMode => "manual_mode",
            Self::SemiAutoMode => "semi_auto_mode",
            Self::RotateMode => "rotate_mode",
            Self::EmergencyStop => "emergency_stop",
            Self::PushBall => "push_ball",
            Self::AutoIdle => "auto_idle",
            Self::GoBack => "go_back",
            Self::GoStraight => "go_straight",
            Self::TurnLeft => "turn_left",
            Self::TurnRight => "turn_right",
            Self::Rotate180 => "rotate_180",
        }
    }
}

/// Configuration frames sent to the MCU when the link comes up
pub const INIT_SEQUENCE: [Frame; 4] = [
    Frame::build(CLASS_TELEMETRY, 0x05, [0x64, 0x00, 0x64, 0x00, 0x0A, 0x00, 0x00, 0x00]),
    Frame::build(CLASS_TELEMETRY, 0x00, [0x01, 0, 0, 0, 0, 0, 0, 0]),
    Frame::build(CLASS_TELEMETRY, 0x00, [0x00, 0, 0, 0, 0, 0, 0, 0]),
    Frame::build(CLASS_TELEMETRY, 0x02, [0x00, 0, 0, 0, 0, 0, 0, 0]),
];

/// Alternates between semi-auto and manual drive modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeToggle {
    /// Next toggle selects manual mode
    NextManual,
    /// Next toggle selects semi-auto mode
    NextSemiAuto,
}

impl ModeToggle {
    /// Advance the cycle and return the frame to send
    pub fn toggle(&mut self) -> ControlFrame {
        match *self {
            Self::NextManual => {
                *self = Self::NextSemiAuto;
                ControlFrame::ManualMode
            }
            Self::NextSemiAuto => {
                *self = Self::NextManual;
                ControlFrame::SemiAutoMode
            }
        }
    }

    /// Pushing a ball hands control back, so the next toggle goes manual
    pub fn reset_to_manual(&mut self) {
        *self = Self::NextManual;
    }
}

impl Default for ModeToggle {
    fn default() -> Self {
        Self::NextSemiAuto
    }
}

/// Numbered base-control operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseControl {
    Idle,
    ClosedLoop,
    Homing,
    Reset,
    ClearErrors,
    ToggleMode,
    AutoIdle,
    GoBack,
    GoStraight,
    TurnLeft,
    EmergencyStop,
}

impl BaseControl {
    pub fn from_code(code: u8) -> Result<Self> {
        let op = match code {
            0 => Self::Idle,
            1 => Self::ClosedLoop,
            2 => Self::Homing,
            3 => Self::Reset,
            4 => Self::ClearErrors,
            5 => Self::ToggleMode,
            6 => Self::AutoIdle,
            7 => Self::GoBack,
            8 => Self::GoStraight,
            9 => Self::TurnLeft,
            10 => Self::EmergencyStop,
            other => return Err(LinkError::UnknownControl(other)),
        };
        Ok(op)
    }

    /// Control frames for this operation; mode toggles advance `mode`
    pub fn frames(self, mode: &mut ModeToggle) -> Vec<ControlFrame> {
        match self {
            Self::Idle => vec![ControlFrame::Idle],
            Self::ClosedLoop => vec![ControlFrame::ClosedLoop],
            Self::Homing => vec![ControlFrame::Homing],
            Self::Reset => vec![ControlFrame::ResetImu, ControlFrame::ResetEncoder],
            Self::ClearErrors => vec![ControlFrame::ClearErrors],
            Self::ToggleMode => vec![mode.toggle()],
            Self::AutoIdle => vec![ControlFrame::AutoIdle],
            Self::GoBack => vec![ControlFrame::GoBack],
            Self::GoStraight => vec![ControlFrame::GoStraight],
            Self::TurnLeft => vec![ControlFrame::TurnLeft],
            Self::EmergencyStop => vec![ControlFrame::EmergencyStop],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_frames_match_wire_table() {
        let table: [(ControlFrame, [u8; 12]); 6] = [
            (ControlFrame::Idle, [0x99, 0x02, 0x00, 0x9B, 0x00, 0, 0, 0, 0, 0, 0, 0]),
            (ControlFrame::ClosedLoop, [0x99, 0x02, 0x00, 0x9C, 0x01, 0, 0, 0, 0, 0, 0, 0]),
            (ControlFrame::ResetEncoder, [0x99, 0x01, 0x02, 0x9D, 0x01, 0, 0, 0, 0, 0, 0, 0]),
            (ControlFrame::ClearErrors, [0x99, 0x02, 0x01, 0x9C, 0x00, 0, 0, 0, 0, 0, 0, 0]),
            (ControlFrame::EmergencyStop, [0x99, 0x02, 0x00, 0xAA, 0x0F, 0, 0, 0, 0, 0, 0, 0]),
            (ControlFrame::Rotate180, [0x99, 0x02, 0x11, 0xB1, 0x05, 0, 0, 0, 0, 0, 0, 0]),
        ];

        for (op, bytes) in table {
            assert_eq!(op.frame().as_bytes(), &bytes, "{:?}", op);
        }
    }

    #[test]
    fn test_all_control_frames_valid() {
        for op in ControlFrame::ALL {
            assert!(Frame::from_bytes(op.frame().as_bytes()).is_ok(), "{:?}", op);
        }
    }

    #[test]
    fn test_control_names_roundtrip() {
        for op in ControlFrame::ALL {
            assert_eq!(ControlFrame::from_name(op.name()), Some(op));
        }
        assert_eq!(ControlFrame::from_name("Emergency-Stop"), Some(ControlFrame::EmergencyStop));
        assert_eq!(ControlFrame::from_name("warp_drive"), None);
    }

    #[test]
    fn test_rotate_mode_payload() {
        let frame = rotate_mode(3);
        assert_eq!(frame.command_id(), command_id::ROTATE_MODE);
        assert_eq!(frame.payload(), [3, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_rotate_to_payload() {
        let frame = rotate_to(45.0);
        let b = 45.0f32.to_le_bytes();
        assert_eq!(frame.payload(), [0x04, b[0], b[1], b[2], b[3], 0, 0, 0]);
    }

    #[test]
    fn test_base_command_order() {
        let cmd = BaseCommand { velocity: 1.5, angle: -30.0, rotate: 1 };
        let [v, a, r] = cmd.frames();
        assert_eq!(v.command_id(), command_id::VELOCITY);
        assert_eq!(v.payload_f32(), 1.5);
        assert_eq!(a.command_id(), command_id::ANGLE);
        assert_eq!(a.payload_f32(), -30.0);
        assert_eq!(r.payload()[0], 1);
    }

    #[test]
    fn test_init_sequence_checksums() {
        assert_eq!(INIT_SEQUENCE[0].checksum(), 0x71);
        for frame in INIT_SEQUENCE {
            assert!(Frame::from_bytes(frame.as_bytes()).is_ok());
        }
    }

    #[test]
    fn test_mode_toggle_cycle() {
        let mut mode = ModeToggle::default();
        assert_eq!(mode.toggle(), ControlFrame::SemiAutoMode);
        assert_eq!(mode.toggle(), ControlFrame::ManualMode);
        assert_eq!(mode.toggle(), ControlFrame::SemiAutoMode);

        mode.reset_to_manual();
        assert_eq!(mode.toggle(), ControlFrame::ManualMode);
    }

    #[test]
    fn test_base_control_codes() {
        let mut mode = ModeToggle::default();
        assert_eq!(
            BaseControl::from_code(3).unwrap().frames(&mut mode),
            vec![ControlFrame::ResetImu, ControlFrame::ResetEncoder]
        );
        assert_eq!(
            BaseControl::from_code(10).unwrap().frames(&mut mode),
            vec![ControlFrame::EmergencyStop]
        );
        assert!(matches!(
            BaseControl::from_code(11),
            Err(LinkError::UnknownControl(11))
        ));
    }
}
