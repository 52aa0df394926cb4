//! Telemetry message kinds tracked by the snapshot

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of telemetry categories the bridge understands.
///
/// Each kind maps to exactly one MAVLink message id. Frames carrying any other
/// id are ignored by the ingest loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Heartbeat,
    SysStatus,
    GpsRawInt,
    Attitude,
    LocalPositionNed,
    GlobalPositionInt,
    GpsGlobalOrigin,
    HighresImu,
    Altitude,
    BatteryStatus,
    Vibration,
    Odometry,
}

impl MessageKind {
    /// Every kind, in MAVLink message id order.
    pub const ALL: [MessageKind; 12] = [
        MessageKind::Heartbeat,
        MessageKind::SysStatus,
        MessageKind::GpsRawInt,
        MessageKind::Attitude,
        MessageKind::LocalPositionNed,
        MessageKind::GlobalPositionInt,
        MessageKind::GpsGlobalOrigin,
        MessageKind::HighresImu,
        MessageKind::Altitude,
        MessageKind::BatteryStatus,
        MessageKind::Vibration,
        MessageKind::Odometry,
    ];

    /// MAVLink message id carried on the wire.
    pub const fn message_id(self) -> u32 {
        match self {
            MessageKind::Heartbeat => 0,
            MessageKind::SysStatus => 1,
            MessageKind::GpsRawInt => 24,
            MessageKind::Attitude => 30,
            MessageKind::LocalPositionNed => 32,
            MessageKind::GlobalPositionInt => 33,
            MessageKind::GpsGlobalOrigin => 49,
            MessageKind::HighresImu => 105,
            MessageKind::Altitude => 141,
            MessageKind::BatteryStatus => 147,
            MessageKind::Vibration => 241,
            MessageKind::Odometry => 331,
        }
    }

    /// Map a wire message id back to a kind. Unknown ids return `None`.
    pub fn from_message_id(message_id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.message_id() == message_id)
    }

    /// Lowercase name used in logs and metric tags.
    pub const fn name(self) -> &'static str {
        match self {
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::SysStatus => "sys_status",
            MessageKind::GpsRawInt => "gps_raw_int",
            MessageKind::Attitude => "attitude",
            MessageKind::LocalPositionNed => "local_position_ned",
            MessageKind::GlobalPositionInt => "global_position_int",
            MessageKind::GpsGlobalOrigin => "gps_global_origin",
            MessageKind::HighresImu => "highres_imu",
            MessageKind::Altitude => "altitude",
            MessageKind::BatteryStatus => "battery_status",
            MessageKind::Vibration => "vibration",
            MessageKind::Odometry => "odometry",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// System and component id pair identifying one end of a MAVLink link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Identity {
    pub system_id: u8,
    pub component_id: u8,
}

impl Identity {
    pub const fn new(system_id: u8, component_id: u8) -> Self {
        Self { system_id, component_id }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.system_id, self.component_id)
    }
}
