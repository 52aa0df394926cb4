//! Frame codec: raw MAVLink frames to typed telemetry and back
//!
//! The session treats the codec as a pure function pair. [`MavlinkCodec`] is the
//! built-in implementation covering the telemetry kinds in [`MessageKind`] and
//! the `SET_POSITION_TARGET_LOCAL_NED` setpoint.

use tracing::trace;

use crate::framing::crc::x25_checksum;
use crate::types::{
    Altitude, Attitude, BatteryStatus, CoordinateFrame, Frame, GlobalPositionInt, GpsGlobalOrigin,
    GpsRawInt, Heartbeat, HighresImu, Identity, LocalPositionNed, MessageKind, Odometry,
    ProtocolVersion, SetpointCommand, SysStatus, TelemetryMessage, Vibration,
};
use crate::{BridgeError, Result};

/// Message id of `SET_POSITION_TARGET_LOCAL_NED`.
pub const SET_POSITION_TARGET_LOCAL_NED_ID: u32 = 84;
const SET_POSITION_TARGET_LOCAL_NED_CRC: u8 = 143;
const SET_POSITION_TARGET_LOCAL_NED_LEN: usize = 53;

/// A decoded inbound message together with who sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    pub sender: Identity,
    pub sequence: u8,
    pub message: TelemetryMessage,
}

impl Telemetry {
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}

/// Addressing for an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub sequence: u8,
    /// Identity the frame is sent from
    pub source: Identity,
    /// Vehicle the command is addressed to
    pub target: Identity,
}

/// Decode/encode boundary between frames and typed values.
///
/// Implementations hold no per-session state; the session supplies sequence
/// numbers and addressing through [`Route`].
pub trait Codec: Send + Sync + 'static {
    /// Decode a frame.
    ///
    /// Returns:
    /// - `Ok(Some(telemetry))` - Recognized message
    /// - `Ok(None)` - Message id outside the supported set
    /// - `Err(e)` - Recognized id but the frame is corrupt
    fn decode(&self, frame: &Frame) -> Result<Option<Telemetry>>;

    /// Encode the outbound setpoint into a frame.
    fn encode(&self, command: &SetpointCommand, route: Route) -> Result<Frame>;
}

/// Wire properties of a supported message.
#[derive(Debug, Clone, Copy)]
struct WireSpec {
    crc_extra: u8,
    /// Length without extension fields
    base_len: usize,
    /// Bytes read when decoding, extensions included
    decoded_len: usize,
}

const fn wire_spec(kind: MessageKind) -> WireSpec {
    let (crc_extra, base_len, decoded_len) = match kind {
        MessageKind::Heartbeat => (50, 9, 9),
        MessageKind::SysStatus => (124, 31, 31),
        MessageKind::GpsRawInt => (24, 30, 30),
        MessageKind::Attitude => (39, 28, 28),
        MessageKind::LocalPositionNed => (185, 28, 28),
        MessageKind::GlobalPositionInt => (104, 28, 28),
        MessageKind::GpsGlobalOrigin => (39, 12, 20),
        MessageKind::HighresImu => (93, 62, 62),
        MessageKind::Altitude => (47, 32, 32),
        MessageKind::BatteryStatus => (154, 36, 41),
        MessageKind::Vibration => (90, 32, 32),
        MessageKind::Odometry => (91, 230, 230),
    };
    WireSpec { crc_extra, base_len, decoded_len }
}

/// CRC extra byte for a message id this crate knows how to frame.
pub fn crc_extra(message_id: u32) -> Option<u8> {
    if message_id == SET_POSITION_TARGET_LOCAL_NED_ID {
        return Some(SET_POSITION_TARGET_LOCAL_NED_CRC);
    }
    MessageKind::from_message_id(message_id).map(|kind| wire_spec(kind).crc_extra)
}

/// Full payload length (extensions included) of a supported telemetry kind.
pub fn payload_len(kind: MessageKind) -> usize {
    wire_spec(kind).decoded_len
}

/// Built-in MAVLink codec (common dialect subset).
#[derive(Debug, Clone, Copy, Default)]
pub struct MavlinkCodec;

impl MavlinkCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode a `SET_POSITION_TARGET_LOCAL_NED` frame back into the command and
    /// its target. Used to inspect what the command loop sent.
    pub fn decode_setpoint(&self, frame: &Frame) -> Result<(SetpointCommand, Identity)> {
        if frame.message_id != SET_POSITION_TARGET_LOCAL_NED_ID {
            return Err(BridgeError::decode_error(frame.message_id, "not a setpoint frame"));
        }
        verify_checksum(frame, SET_POSITION_TARGET_LOCAL_NED_CRC)?;

        let mut r = FieldReader::new(frame.payload());
        let time_boot_ms = r.u32();
        let [x, y, z, vx, vy, vz, afx, afy, afz, yaw, yaw_rate] = r.f32s::<11>();
        let type_mask = r.u16();
        let target = Identity::new(r.u8(), r.u8());
        let coordinate_frame = coordinate_frame_from_u8(r.u8()).ok_or_else(|| {
            BridgeError::decode_error(frame.message_id, "unsupported coordinate frame")
        })?;

        let command = SetpointCommand {
            time_boot_ms,
            type_mask,
            coordinate_frame,
            x,
            y,
            z,
            vx,
            vy,
            vz,
            afx,
            afy,
            afz,
            yaw,
            yaw_rate,
        };
        Ok((command, target))
    }
}

impl Codec for MavlinkCodec {
    fn decode(&self, frame: &Frame) -> Result<Option<Telemetry>> {
        let Some(kind) = MessageKind::from_message_id(frame.message_id) else {
            trace!(message_id = frame.message_id, "Unrecognized message id");
            return Ok(None);
        };
        let spec = wire_spec(kind);
        verify_checksum(frame, spec.crc_extra)?;

        let payload = frame.payload();
        // MAVLink 2 trims trailing zeros; MAVLink 1 always sends the base fields
        if frame.version == ProtocolVersion::V1 && payload.len() < spec.base_len {
            return Err(BridgeError::decode_error(
                frame.message_id,
                format!("{} payload too short: {} < {}", kind, payload.len(), spec.base_len),
            ));
        }

        let message = decode_payload(kind, payload);
        Ok(Some(Telemetry { sender: frame.sender(), sequence: frame.sequence, message }))
    }

    fn encode(&self, command: &SetpointCommand, route: Route) -> Result<Frame> {
        let mut payload = Vec::with_capacity(SET_POSITION_TARGET_LOCAL_NED_LEN);
        payload.extend_from_slice(&command.time_boot_ms.to_le_bytes());
        for value in [
            command.x,
            command.y,
            command.z,
            command.vx,
            command.vy,
            command.vz,
            command.afx,
            command.afy,
            command.afz,
            command.yaw,
            command.yaw_rate,
        ] {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        payload.extend_from_slice(&command.type_mask.to_le_bytes());
        payload.push(route.target.system_id);
        payload.push(route.target.component_id);
        payload.push(command.coordinate_frame.as_u8());
        debug_assert_eq!(payload.len(), SET_POSITION_TARGET_LOCAL_NED_LEN);

        Frame::build_v2(
            route.sequence,
            route.source,
            SET_POSITION_TARGET_LOCAL_NED_ID,
            &payload,
            SET_POSITION_TARGET_LOCAL_NED_CRC,
        )
    }
}

fn verify_checksum(frame: &Frame, crc_extra: u8) -> Result<()> {
    let expected = x25_checksum(frame.checksummed_bytes(), crc_extra);
    let actual = frame.checksum();
    if expected != actual {
        return Err(BridgeError::Checksum { message_id: frame.message_id, expected, actual });
    }
    Ok(())
}

fn coordinate_frame_from_u8(value: u8) -> Option<CoordinateFrame> {
    let frame = match value {
        0 => CoordinateFrame::Global,
        1 => CoordinateFrame::LocalNed,
        3 => CoordinateFrame::GlobalRelativeAlt,
        4 => CoordinateFrame::LocalEnu,
        7 => CoordinateFrame::LocalOffsetNed,
        8 => CoordinateFrame::BodyNed,
        9 => CoordinateFrame::BodyOffsetNed,
        12 => CoordinateFrame::BodyFrd,
        _ => return None,
    };
    Some(frame)
}

fn decode_payload(kind: MessageKind, payload: &[u8]) -> TelemetryMessage {
    let mut r = FieldReader::new(payload);
    match kind {
        MessageKind::Heartbeat => Heartbeat {
            custom_mode: r.u32(),
            vehicle_type: r.u8(),
            autopilot: r.u8(),
            base_mode: r.u8(),
            system_status: r.u8(),
            mavlink_version: r.u8(),
        }
        .into(),
        MessageKind::SysStatus => {
            let sensors_present = r.u32();
            let sensors_enabled = r.u32();
            let sensors_health = r.u32();
            let load = r.u16();
            let voltage_battery = r.u16();
            let current_battery = r.i16();
            let drop_rate_comm = r.u16();
            let errors_comm = r.u16();
            // errors_count1..4
            r.skip(8);
            SysStatus {
                sensors_present,
                sensors_enabled,
                sensors_health,
                load,
                voltage_battery,
                current_battery,
                drop_rate_comm,
                errors_comm,
                battery_remaining: r.i8(),
            }
            .into()
        }
        MessageKind::GpsRawInt => GpsRawInt {
            time_usec: r.u64(),
            lat: r.i32(),
            lon: r.i32(),
            alt: r.i32(),
            eph: r.u16(),
            epv: r.u16(),
            vel: r.u16(),
            cog: r.u16(),
            fix_type: r.u8(),
            satellites_visible: r.u8(),
        }
        .into(),
        MessageKind::Attitude => {
            let time_boot_ms = r.u32();
            let [roll, pitch, yaw, rollspeed, pitchspeed, yawspeed] = r.f32s::<6>();
            Attitude { time_boot_ms, roll, pitch, yaw, rollspeed, pitchspeed, yawspeed }.into()
        }
        MessageKind::LocalPositionNed => {
            let time_boot_ms = r.u32();
            let [x, y, z, vx, vy, vz] = r.f32s::<6>();
            LocalPositionNed { time_boot_ms, x, y, z, vx, vy, vz }.into()
        }
        MessageKind::GlobalPositionInt => GlobalPositionInt {
            time_boot_ms: r.u32(),
            lat: r.i32(),
            lon: r.i32(),
            alt: r.i32(),
            relative_alt: r.i32(),
            vx: r.i16(),
            vy: r.i16(),
            vz: r.i16(),
            hdg: r.u16(),
        }
        .into(),
        MessageKind::GpsGlobalOrigin => GpsGlobalOrigin {
            latitude: r.i32(),
            longitude: r.i32(),
            altitude: r.i32(),
            time_usec: r.u64(),
        }
        .into(),
        MessageKind::HighresImu => {
            let time_usec = r.u64();
            let [
                xacc,
                yacc,
                zacc,
                xgyro,
                ygyro,
                zgyro,
                xmag,
                ymag,
                zmag,
                abs_pressure,
                diff_pressure,
                pressure_alt,
                temperature,
            ] = r.f32s::<13>();
            HighresImu {
                time_usec,
                xacc,
                yacc,
                zacc,
                xgyro,
                ygyro,
                zgyro,
                xmag,
                ymag,
                zmag,
                abs_pressure,
                diff_pressure,
                pressure_alt,
                temperature,
                fields_updated: r.u16(),
            }
            .into()
        }
        MessageKind::Altitude => {
            let time_usec = r.u64();
            let [
                altitude_monotonic,
                altitude_amsl,
                altitude_local,
                altitude_relative,
                altitude_terrain,
                bottom_clearance,
            ] = r.f32s::<6>();
            Altitude {
                time_usec,
                altitude_monotonic,
                altitude_amsl,
                altitude_local,
                altitude_relative,
                altitude_terrain,
                bottom_clearance,
            }
            .into()
        }
        MessageKind::BatteryStatus => {
            let current_consumed = r.i32();
            let energy_consumed = r.i32();
            let temperature = r.i16();
            let mut voltages = [0u16; 10];
            for v in &mut voltages {
                *v = r.u16();
            }
            BatteryStatus {
                current_consumed,
                energy_consumed,
                temperature,
                voltages,
                current_battery: r.i16(),
                id: r.u8(),
                battery_function: r.u8(),
                battery_type: r.u8(),
                battery_remaining: r.i8(),
                time_remaining: r.i32(),
                charge_state: r.u8(),
            }
            .into()
        }
        MessageKind::Vibration => {
            let time_usec = r.u64();
            let [vibration_x, vibration_y, vibration_z] = r.f32s::<3>();
            Vibration {
                time_usec,
                vibration_x,
                vibration_y,
                vibration_z,
                clipping_0: r.u32(),
                clipping_1: r.u32(),
                clipping_2: r.u32(),
            }
            .into()
        }
        MessageKind::Odometry => {
            let time_usec = r.u64();
            let [x, y, z] = r.f32s::<3>();
            let q = r.f32s::<4>();
            let [vx, vy, vz, rollspeed, pitchspeed, yawspeed] = r.f32s::<6>();
            // pose and velocity covariance
            r.skip(2 * 21 * 4);
            Odometry {
                time_usec,
                x,
                y,
                z,
                q,
                vx,
                vy,
                vz,
                rollspeed,
                pitchspeed,
                yawspeed,
                frame_id: r.u8(),
                child_frame_id: r.u8(),
            }
            .into()
        }
    }
}

/// Little-endian cursor over a payload. Reads past the end yield zeros, which
/// is how MAVLink 2 payload truncation is undone.
struct FieldReader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let start = self.at.min(self.bytes.len());
        let end = (self.at + N).min(self.bytes.len());
        out[..end - start].copy_from_slice(&self.bytes[start..end]);
        self.at += N;
        out
    }

    fn skip(&mut self, n: usize) {
        self.at += n;
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i8(&mut self) -> i8 {
        i8::from_le_bytes(self.take())
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn f32s<const N: usize>(&mut self) -> [f32; N] {
        std::array::from_fn(|_| self.f32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{PayloadWriter, telemetry_frame};
    use crate::types::type_mask;

    const AUTOPILOT: Identity = Identity { system_id: 42, component_id: 7 };

    #[test]
    fn decodes_heartbeat_and_sender() {
        let mut w = PayloadWriter::new();
        w.u32(4).u8(2).u8(12).u8(81).u8(4).u8(3);
        let frame = telemetry_frame(MessageKind::Heartbeat, AUTOPILOT, 5, &w.finish()).expect("build");

        let telemetry = MavlinkCodec.decode(&frame).expect("decode").expect("recognized");

        assert_eq!(telemetry.sender, AUTOPILOT);
        assert_eq!(telemetry.sequence, 5);
        assert_eq!(
            telemetry.message,
            TelemetryMessage::Heartbeat(Heartbeat {
                custom_mode: 4,
                vehicle_type: 2,
                autopilot: 12,
                base_mode: 81,
                system_status: 4,
                mavlink_version: 3,
            })
        );
    }

    #[test]
    fn truncated_v2_payload_is_zero_extended() {
        let mut w = PayloadWriter::new();
        w.u32(1000).f32(0.5).f32(0.0).f32(0.0).f32(0.0).f32(0.0).f32(0.0);
        // Trailing zeros are trimmed when the frame is built
        let frame = telemetry_frame(MessageKind::Attitude, AUTOPILOT, 0, &w.finish()).expect("build");
        assert!(frame.payload().len() < 28);

        let telemetry = MavlinkCodec.decode(&frame).expect("decode").expect("recognized");
        let TelemetryMessage::Attitude(attitude) = telemetry.message else {
            panic!("expected attitude, got {:?}", telemetry.message);
        };
        assert_eq!(attitude.time_boot_ms, 1000);
        assert_eq!(attitude.roll, 0.5);
        assert_eq!(attitude.yawspeed, 0.0);
    }

    #[test]
    fn battery_extensions_are_read() {
        let mut w = PayloadWriter::new();
        w.i32(1200).i32(-1).i16(2500);
        for cell in [4100u16, 4095, 4090, 4098, u16::MAX, u16::MAX, u16::MAX, u16::MAX, u16::MAX, u16::MAX] {
            w.u16(cell);
        }
        w.i16(-150).u8(0).u8(1).u8(3).i8(76).i32(1800).u8(2);
        let frame = telemetry_frame(MessageKind::BatteryStatus, AUTOPILOT, 0, &w.finish()).expect("build");

        let telemetry = MavlinkCodec.decode(&frame).expect("decode").expect("recognized");
        let TelemetryMessage::BatteryStatus(battery) = telemetry.message else {
            panic!("expected battery, got {:?}", telemetry.message);
        };
        assert_eq!(battery.temperature, 2500);
        assert_eq!(battery.voltages[3], 4098);
        assert_eq!(battery.current_battery, -150);
        assert_eq!(battery.battery_remaining, 76);
        assert_eq!(battery.time_remaining, 1800);
        assert_eq!(battery.charge_state, 2);
    }

    #[test]
    fn odometry_skips_covariance() {
        let mut w = PayloadWriter::new();
        w.u64(99).f32(1.0).f32(2.0).f32(3.0);
        w.f32(1.0).f32(0.0).f32(0.0).f32(0.0);
        w.f32(0.1).f32(0.2).f32(0.3).f32(0.4).f32(0.5).f32(0.6);
        for _ in 0..42 {
            w.f32(f32::NAN);
        }
        w.u8(1).u8(8);
        let frame = telemetry_frame(MessageKind::Odometry, AUTOPILOT, 0, &w.finish()).expect("build");

        let telemetry = MavlinkCodec.decode(&frame).expect("decode").expect("recognized");
        let TelemetryMessage::Odometry(odometry) = telemetry.message else {
            panic!("expected odometry, got {:?}", telemetry.message);
        };
        assert_eq!((odometry.x, odometry.y, odometry.z), (1.0, 2.0, 3.0));
        assert_eq!(odometry.q, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(odometry.yawspeed, 0.6);
        assert_eq!((odometry.frame_id, odometry.child_frame_id), (1, 8));
    }

    #[test]
    fn unknown_message_id_is_not_an_error() {
        let frame = Frame::build_v2(0, AUTOPILOT, 253, &[1, 2, 3], 83).expect("build");
        assert_eq!(MavlinkCodec.decode(&frame).expect("decode"), None);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let frame = telemetry_frame(MessageKind::Heartbeat, AUTOPILOT, 0, &[0, 0, 0, 0, 2, 3, 81, 4, 3]).expect("build");
        let mut bytes = frame.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let corrupted = Frame::parse(bytes).expect("parse");

        let err = MavlinkCodec.decode(&corrupted).unwrap_err();
        assert!(matches!(err, BridgeError::Checksum { message_id: 0, .. }));
    }

    #[test]
    fn short_v1_payload_is_rejected() {
        let frame = Frame::build_v1(0, AUTOPILOT, 30, &[0; 10], 39).expect("build");
        let err = MavlinkCodec.decode(&frame).unwrap_err();
        assert!(matches!(err, BridgeError::Decode { message_id: 30, .. }));
    }

    #[test]
    fn setpoint_encoding_layout() {
        let command = SetpointCommand::velocity(1.5, -0.5, 0.25).with_yaw_rate(0.1);
        let route = Route {
            sequence: 9,
            source: Identity::new(42, 0),
            target: AUTOPILOT,
        };

        let frame = MavlinkCodec.encode(&command, route).expect("encode");

        assert_eq!(frame.message_id, SET_POSITION_TARGET_LOCAL_NED_ID);
        assert_eq!(frame.sequence, 9);
        assert_eq!(frame.sender(), Identity::new(42, 0));
        let payload = frame.payload();
        assert_eq!(payload.len(), SET_POSITION_TARGET_LOCAL_NED_LEN);
        assert_eq!(&payload[16..20], &1.5f32.to_le_bytes());
        assert_eq!(u16::from_le_bytes([payload[48], payload[49]]), command.type_mask);
        assert_eq!(&payload[50..53], &[42, 7, CoordinateFrame::LocalNed.as_u8()]);

        let (decoded, target) = MavlinkCodec.decode_setpoint(&frame).expect("decode");
        assert_eq!(decoded, command);
        assert_eq!(target, AUTOPILOT);
    }

    #[test]
    fn neutral_setpoint_survives_trailing_zero_trim() {
        let mut command = SetpointCommand::neutral();
        command.coordinate_frame = CoordinateFrame::Global;
        let route = Route { sequence: 0, source: Identity::new(1, 0), target: Identity::new(0, 0) };

        let frame = MavlinkCodec.encode(&command, route).expect("encode");
        let (decoded, _) = MavlinkCodec.decode_setpoint(&frame).expect("decode");

        assert_eq!(decoded.type_mask, type_mask::VELOCITY & type_mask::YAW_RATE);
        assert_eq!(decoded.coordinate_frame, CoordinateFrame::Global);
    }

    #[test]
    fn crc_extra_lookup() {
        assert_eq!(crc_extra(0), Some(50));
        assert_eq!(crc_extra(331), Some(91));
        assert_eq!(crc_extra(SET_POSITION_TARGET_LOCAL_NED_ID), Some(143));
        assert_eq!(crc_extra(253), None);
    }
}
