//! Frame builders for tests, benchmarks and simulations
//!
//! Pair these with [`crate::transport::MockTransport`] to drive a session
//! without hardware:
//!
//! ```rust
//! use mavbridge::test_utils::heartbeat_frame;
//! use mavbridge::transport::MockTransport;
//! use mavbridge::types::Identity;
//!
//! let transport = MockTransport::new();
//! transport.inject_frame(heartbeat_frame(Identity::new(42, 7), 0).unwrap());
//! assert_eq!(transport.pending_reads(), 1);
//! ```

use crate::codec::{crc_extra, payload_len};
use crate::types::{Frame, Identity, MessageKind};
use crate::{BridgeError, Result};

/// Little-endian payload builder, fields appended in wire order.
#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    bytes: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn finish(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

/// MAVLink 2 frame of a supported telemetry kind. `payload` may be shorter
/// than the full message; missing trailing fields read as zero.
pub fn telemetry_frame(
    kind: MessageKind,
    sender: Identity,
    sequence: u8,
    payload: &[u8],
) -> Result<Frame> {
    let full_len = payload_len(kind);
    if payload.len() > full_len {
        return Err(BridgeError::Encode {
            details: format!("{} payload is {} bytes, at most {}", kind, payload.len(), full_len),
        });
    }
    let extra = crc_extra(kind.message_id()).ok_or_else(|| BridgeError::Encode {
        details: format!("no CRC extra for {}", kind),
    })?;
    Frame::build_v2(sequence, sender, kind.message_id(), payload, extra)
}

/// Heartbeat from a quadrotor running PX4.
pub fn heartbeat_frame(sender: Identity, sequence: u8) -> Result<Frame> {
    let mut w = PayloadWriter::new();
    // custom_mode, MAV_TYPE_QUADROTOR, MAV_AUTOPILOT_PX4, base_mode, MAV_STATE_ACTIVE, version
    w.u32(0).u8(2).u8(12).u8(81).u8(4).u8(3);
    telemetry_frame(MessageKind::Heartbeat, sender, sequence, &w.finish())
}

/// Attitude sample.
pub fn attitude_frame(
    sender: Identity,
    sequence: u8,
    time_boot_ms: u32,
    roll: f32,
    pitch: f32,
    yaw: f32,
) -> Result<Frame> {
    let mut w = PayloadWriter::new();
    w.u32(time_boot_ms).f32(roll).f32(pitch).f32(yaw).f32(0.0).f32(0.0).f32(0.0);
    telemetry_frame(MessageKind::Attitude, sender, sequence, &w.finish())
}

/// Well-formed frame whose message id no codec in this crate recognizes.
pub fn unrecognized_frame(sender: Identity, sequence: u8) -> Result<Frame> {
    // DEBUG_FLOAT_ARRAY
    Frame::build_v2(sequence, sender, 350, &[1, 2, 3, 4], 232)
}
