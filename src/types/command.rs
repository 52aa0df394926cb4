//! Outbound setpoint command streamed by the command loop

use serde::{Deserialize, Serialize};

/// Type-mask bits for `SET_POSITION_TARGET_LOCAL_NED`.
///
/// Each mask sets the "ignore" bits of every field group except the one it
/// names, so combining two of them with `&` keeps both groups active.
pub mod type_mask {
    /// Use position, ignore everything else.
    pub const POSITION: u16 = 0b0000_1101_1111_1000;
    /// Use velocity, ignore everything else.
    pub const VELOCITY: u16 = 0b0000_1101_1100_0111;
    /// Use acceleration, ignore everything else.
    pub const ACCELERATION: u16 = 0b0000_1100_0011_1111;
    /// Use force setpoint, ignore everything else.
    pub const FORCE: u16 = 0b0000_1110_0011_1111;
    /// Use yaw angle, ignore everything else.
    pub const YAW_ANGLE: u16 = 0b0000_1001_1111_1111;
    /// Use yaw rate, ignore everything else.
    pub const YAW_RATE: u16 = 0b0000_0101_1111_1111;

    pub const TAKEOFF: u16 = 0x1000;
    pub const LAND: u16 = 0x2000;
    pub const LOITER: u16 = 0x3000;
    pub const IDLE: u16 = 0x4000;
}

/// Coordinate frame a setpoint is expressed in (`MAV_FRAME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CoordinateFrame {
    Global = 0,
    #[default]
    LocalNed = 1,
    GlobalRelativeAlt = 3,
    LocalEnu = 4,
    LocalOffsetNed = 7,
    BodyNed = 8,
    BodyOffsetNed = 9,
    BodyFrd = 12,
}

impl CoordinateFrame {
    /// Wire value of the frame.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Position/velocity/acceleration setpoint in a local frame.
///
/// Which groups the vehicle acts on is selected by `type_mask`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SetpointCommand {
    pub time_boot_ms: u32,
    pub type_mask: u16,
    pub coordinate_frame: CoordinateFrame,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub afx: f32,
    pub afy: f32,
    pub afz: f32,
    pub yaw: f32,
    pub yaw_rate: f32,
}

impl SetpointCommand {
    /// Hold still: zero velocity and yaw rate in the local NED frame.
    ///
    /// The mask is `VELOCITY & YAW_RATE`.
    pub fn neutral() -> Self {
        Self {
            type_mask: type_mask::VELOCITY & type_mask::YAW_RATE,
            coordinate_frame: CoordinateFrame::LocalNed,
            ..Self::default()
        }
    }

    /// Velocity setpoint in the local NED frame, m/s.
    pub fn velocity(vx: f32, vy: f32, vz: f32) -> Self {
        Self {
            type_mask: type_mask::VELOCITY,
            coordinate_frame: CoordinateFrame::LocalNed,
            vx,
            vy,
            vz,
            ..Self::default()
        }
    }

    /// Position setpoint in the local NED frame, metres.
    pub fn position(x: f32, y: f32, z: f32) -> Self {
        Self {
            type_mask: type_mask::POSITION,
            coordinate_frame: CoordinateFrame::LocalNed,
            x,
            y,
            z,
            ..Self::default()
        }
    }

    /// Add a yaw rate (rad/s) to this setpoint and enable the yaw-rate group.
    pub fn with_yaw_rate(mut self, yaw_rate: f32) -> Self {
        self.type_mask &= type_mask::YAW_RATE;
        self.yaw_rate = yaw_rate;
        self
    }

    /// Add a yaw angle (rad) to this setpoint and enable the yaw group.
    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.type_mask &= type_mask::YAW_ANGLE;
        self.yaw = yaw;
        self
    }

    /// Express this setpoint in a different frame.
    pub fn in_frame(mut self, frame: CoordinateFrame) -> Self {
        self.coordinate_frame = frame;
        self
    }

    /// Whether every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        [
            self.x,
            self.y,
            self.z,
            self.vx,
            self.vy,
            self.vz,
            self.afx,
            self.afy,
            self.afz,
            self.yaw,
            self.yaw_rate,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}
