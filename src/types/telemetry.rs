//! Decoded telemetry payloads, one struct per message kind

use serde::{Deserialize, Serialize};

use super::MessageKind;

/// Vehicle heartbeat (type, autopilot, mode and state).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Heartbeat {
    pub custom_mode: u32,
    pub vehicle_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub system_status: u8,
    pub mavlink_version: u8,
}

/// Onboard sensor health, battery summary and link error counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SysStatus {
    pub sensors_present: u32,
    pub sensors_enabled: u32,
    pub sensors_health: u32,
    /// Main loop load, in 0.1 %.
    pub load: u16,
    /// Battery voltage, mV.
    pub voltage_battery: u16,
    /// Battery current, cA (-1 if unknown).
    pub current_battery: i16,
    pub drop_rate_comm: u16,
    pub errors_comm: u16,
    /// Remaining battery, % (-1 if unknown).
    pub battery_remaining: i8,
}

/// Raw GPS fix as reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsRawInt {
    pub time_usec: u64,
    /// Latitude, degE7.
    pub lat: i32,
    /// Longitude, degE7.
    pub lon: i32,
    /// Altitude (MSL), mm.
    pub alt: i32,
    pub eph: u16,
    pub epv: u16,
    pub vel: u16,
    pub cog: u16,
    pub fix_type: u8,
    pub satellites_visible: u8,
}

impl GpsRawInt {
    /// Latitude in degrees.
    pub fn latitude_deg(&self) -> f64 {
        self.lat as f64 / 1e7
    }

    /// Longitude in degrees.
    pub fn longitude_deg(&self) -> f64 {
        self.lon as f64 / 1e7
    }

    /// Altitude in metres.
    pub fn altitude_m(&self) -> f64 {
        self.alt as f64 / 1000.0
    }
}

/// Attitude in the aeronautical frame (radians, rad/s).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub time_boot_ms: u32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
}

/// Filtered local position in the NED frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalPositionNed {
    pub time_boot_ms: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
}

/// Filtered global position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalPositionInt {
    pub time_boot_ms: u32,
    pub lat: i32,
    pub lon: i32,
    pub alt: i32,
    pub relative_alt: i32,
    pub vx: i16,
    pub vy: i16,
    pub vz: i16,
    pub hdg: u16,
}

/// Local frame origin in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsGlobalOrigin {
    pub latitude: i32,
    pub longitude: i32,
    pub altitude: i32,
    /// Only present when the sender includes the extension field.
    pub time_usec: u64,
}

/// High resolution IMU sample (SI units).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HighresImu {
    pub time_usec: u64,
    pub xacc: f32,
    pub yacc: f32,
    pub zacc: f32,
    pub xgyro: f32,
    pub ygyro: f32,
    pub zgyro: f32,
    pub xmag: f32,
    pub ymag: f32,
    pub zmag: f32,
    pub abs_pressure: f32,
    pub diff_pressure: f32,
    pub pressure_alt: f32,
    pub temperature: f32,
    pub fields_updated: u16,
}

/// Altitude estimates from the various sources, metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Altitude {
    pub time_usec: u64,
    pub altitude_monotonic: f32,
    pub altitude_amsl: f32,
    pub altitude_local: f32,
    pub altitude_relative: f32,
    pub altitude_terrain: f32,
    pub bottom_clearance: f32,
}

/// Battery pack status.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub current_consumed: i32,
    pub energy_consumed: i32,
    /// Temperature, cdegC.
    pub temperature: i16,
    pub voltages: [u16; 10],
    /// Current, cA.
    pub current_battery: i16,
    pub id: u8,
    pub battery_function: u8,
    pub battery_type: u8,
    pub battery_remaining: i8,
    /// Extension field, zero when not sent.
    pub time_remaining: i32,
    /// Extension field, zero when not sent.
    pub charge_state: u8,
}

/// Vibration levels and accelerometer clipping counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vibration {
    pub time_usec: u64,
    pub vibration_x: f32,
    pub vibration_y: f32,
    pub vibration_z: f32,
    pub clipping_0: u32,
    pub clipping_1: u32,
    pub clipping_2: u32,
}

/// Odometry estimate. Covariance matrices are not retained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Odometry {
    pub time_usec: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub q: [f32; 4],
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
    pub frame_id: u8,
    pub child_frame_id: u8,
}

/// A decoded telemetry message; exactly one payload per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum TelemetryMessage {
    Heartbeat(Heartbeat),
    SysStatus(SysStatus),
    GpsRawInt(GpsRawInt),
    Attitude(Attitude),
    LocalPositionNed(LocalPositionNed),
    GlobalPositionInt(GlobalPositionInt),
    GpsGlobalOrigin(GpsGlobalOrigin),
    HighresImu(HighresImu),
    Altitude(Altitude),
    BatteryStatus(BatteryStatus),
    Vibration(Vibration),
    Odometry(Odometry),
}

impl TelemetryMessage {
    /// Kind tag of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            TelemetryMessage::Heartbeat(_) => MessageKind::Heartbeat,
            TelemetryMessage::SysStatus(_) => MessageKind::SysStatus,
            TelemetryMessage::GpsRawInt(_) => MessageKind::GpsRawInt,
            TelemetryMessage::Attitude(_) => MessageKind::Attitude,
            TelemetryMessage::LocalPositionNed(_) => MessageKind::LocalPositionNed,
            TelemetryMessage::GlobalPositionInt(_) => MessageKind::GlobalPositionInt,
            TelemetryMessage::GpsGlobalOrigin(_) => MessageKind::GpsGlobalOrigin,
            TelemetryMessage::HighresImu(_) => MessageKind::HighresImu,
            TelemetryMessage::Altitude(_) => MessageKind::Altitude,
            TelemetryMessage::BatteryStatus(_) => MessageKind::BatteryStatus,
            TelemetryMessage::Vibration(_) => MessageKind::Vibration,
            TelemetryMessage::Odometry(_) => MessageKind::Odometry,
        }
    }
}

/// Typed extraction of a payload from a [`TelemetryMessage`].
///
/// Lets snapshot readers ask for `view.get::<Attitude>()` instead of matching.
pub trait Payload: Sized {
    const KIND: MessageKind;

    fn from_message(message: &TelemetryMessage) -> Option<Self>;
}

macro_rules! impl_payload {
    ($($variant:ident),* $(,)?) => {
        $(
            impl Payload for $variant {
                const KIND: MessageKind = MessageKind::$variant;

                fn from_message(message: &TelemetryMessage) -> Option<Self> {
                    match message {
                        TelemetryMessage::$variant(payload) => Some(*payload),
                        _ => None,
                    }
                }
            }

            impl From<$variant> for TelemetryMessage {
                fn from(payload: $variant) -> Self {
                    TelemetryMessage::$variant(payload)
                }
            }
        )*
    };
}

impl_payload!(
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
);
