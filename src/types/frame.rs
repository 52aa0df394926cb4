//! MAVLink frame type shared by transports and codecs

use std::sync::Arc;

use super::Identity;
use crate::framing::crc::x25_checksum;
use crate::{BridgeError, Result};

/// Start marker of a MAVLink 1 frame.
pub const STX_V1: u8 = 0xFE;
/// Start marker of a MAVLink 2 frame.
pub const STX_V2: u8 = 0xFD;
/// Header bytes of a MAVLink 1 frame, start marker included.
pub const HEADER_LEN_V1: usize = 6;
/// Header bytes of a MAVLink 2 frame, start marker included.
pub const HEADER_LEN_V2: usize = 10;
pub const CHECKSUM_LEN: usize = 2;
pub const SIGNATURE_LEN: usize = 13;
/// Incompatibility flag: frame carries a signature block.
pub const IFLAG_SIGNED: u8 = 0x01;
/// Largest frame on the wire (signed MAVLink 2 with a full payload).
pub const MAX_FRAME_LEN: usize = HEADER_LEN_V2 + 255 + CHECKSUM_LEN + SIGNATURE_LEN;

/// MAVLink protocol generation of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl ProtocolVersion {
    /// Version implied by a start marker.
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            STX_V1 => Some(ProtocolVersion::V1),
            STX_V2 => Some(ProtocolVersion::V2),
            _ => None,
        }
    }

    pub const fn header_len(self) -> usize {
        match self {
            ProtocolVersion::V1 => HEADER_LEN_V1,
            ProtocolVersion::V2 => HEADER_LEN_V2,
        }
    }
}

/// One transport-level MAVLink packet.
///
/// The header is parsed eagerly; the payload stays as raw bytes (zero-copy via
/// `Arc`) until a codec decodes it. The checksum is not verified here because
/// that needs the per-message CRC extra, which only the codec knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Complete frame bytes as received or to be sent
    data: Arc<[u8]>,
    pub version: ProtocolVersion,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message_id: u32,
    pub incompat_flags: u8,
}

impl Frame {
    /// Parse a complete frame. `bytes` must hold exactly one frame.
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        let version = bytes
            .first()
            .and_then(|&b| ProtocolVersion::from_marker(b))
            .ok_or_else(|| BridgeError::transport_read("frame does not start with a MAVLink marker"))?;

        let expected = frame_len(&bytes).ok_or_else(|| {
            BridgeError::transport_read(format!("truncated {:?} header ({} bytes)", version, bytes.len()))
        })?;
        if bytes.len() != expected {
            return Err(BridgeError::transport_read(format!(
                "frame length {} does not match header ({} expected)",
                bytes.len(),
                expected
            )));
        }

        let frame = match version {
            ProtocolVersion::V1 => Self {
                version,
                sequence: bytes[2],
                system_id: bytes[3],
                component_id: bytes[4],
                message_id: bytes[5] as u32,
                incompat_flags: 0,
                data: bytes.into(),
            },
            ProtocolVersion::V2 => Self {
                version,
                incompat_flags: bytes[2],
                sequence: bytes[4],
                system_id: bytes[5],
                component_id: bytes[6],
                message_id: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], 0]),
                data: bytes.into(),
            },
        };

        Ok(frame)
    }

    /// Build a MAVLink 2 frame, trimming trailing zero payload bytes.
    pub fn build_v2(
        sequence: u8,
        sender: Identity,
        message_id: u32,
        payload: &[u8],
        crc_extra: u8,
    ) -> Result<Self> {
        if message_id > 0x00FF_FFFF {
            return Err(BridgeError::Encode {
                details: format!("message id {} does not fit in 24 bits", message_id),
            });
        }
        let trimmed_len = payload.iter().rposition(|&b| b != 0).map_or(1, |i| i + 1);
        let payload = &payload[..trimmed_len.min(payload.len())];
        if payload.len() > 255 {
            return Err(BridgeError::Encode {
                details: format!("payload of {} bytes exceeds 255", payload.len()),
            });
        }

        let id = message_id.to_le_bytes();
        let mut bytes = Vec::with_capacity(HEADER_LEN_V2 + payload.len() + CHECKSUM_LEN);
        bytes.extend_from_slice(&[
            STX_V2,
            payload.len() as u8,
            0,
            0,
            sequence,
            sender.system_id,
            sender.component_id,
            id[0],
            id[1],
            id[2],
        ]);
        bytes.extend_from_slice(payload);
        let crc = x25_checksum(&bytes[1..], crc_extra);
        bytes.extend_from_slice(&crc.to_le_bytes());

        Self::parse(bytes)
    }

    /// Build a MAVLink 1 frame. Only message ids below 256 fit.
    pub fn build_v1(
        sequence: u8,
        sender: Identity,
        message_id: u32,
        payload: &[u8],
        crc_extra: u8,
    ) -> Result<Self> {
        let id = u8::try_from(message_id).map_err(|_| BridgeError::Encode {
            details: format!("message id {} requires MAVLink 2", message_id),
        })?;
        if payload.len() > 255 {
            return Err(BridgeError::Encode {
                details: format!("payload of {} bytes exceeds 255", payload.len()),
            });
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN_V1 + payload.len() + CHECKSUM_LEN);
        bytes.extend_from_slice(&[
            STX_V1,
            payload.len() as u8,
            sequence,
            sender.system_id,
            sender.component_id,
            id,
        ]);
        bytes.extend_from_slice(payload);
        let crc = x25_checksum(&bytes[1..], crc_extra);
        bytes.extend_from_slice(&crc.to_le_bytes());

        Self::parse(bytes)
    }

    /// Raw frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Total frame length on the wire.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload as sent (MAVLink 2 payloads may be truncated).
    pub fn payload(&self) -> &[u8] {
        let start = self.version.header_len();
        &self.data[start..start + self.data[1] as usize]
    }

    /// Checksum carried on the wire.
    pub fn checksum(&self) -> u16 {
        let at = self.version.header_len() + self.data[1] as usize;
        u16::from_le_bytes([self.data[at], self.data[at + 1]])
    }

    /// Bytes covered by the checksum (header after the marker, plus payload).
    pub fn checksummed_bytes(&self) -> &[u8] {
        &self.data[1..self.version.header_len() + self.data[1] as usize]
    }

    /// Whether the frame carries a MAVLink 2 signature block.
    pub fn is_signed(&self) -> bool {
        self.incompat_flags & IFLAG_SIGNED != 0
    }

    /// Sender of the frame.
    pub fn sender(&self) -> Identity {
        Identity::new(self.system_id, self.component_id)
    }
}

/// Full length of the frame starting at `bytes[0]`, if enough header is present.
pub(crate) fn frame_len(bytes: &[u8]) -> Option<usize> {
    match ProtocolVersion::from_marker(*bytes.first()?)? {
        ProtocolVersion::V1 => {
            let payload_len = *bytes.get(1)? as usize;
            Some(HEADER_LEN_V1 + payload_len + CHECKSUM_LEN)
        }
        ProtocolVersion::V2 => {
            let payload_len = *bytes.get(1)? as usize;
            let flags = *bytes.get(2)?;
            let signature = if flags & IFLAG_SIGNED != 0 { SIGNATURE_LEN } else { 0 };
            Some(HEADER_LEN_V2 + payload_len + CHECKSUM_LEN + signature)
        }
    }
}
