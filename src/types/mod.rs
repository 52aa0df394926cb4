//! Core types for the telemetry snapshot and the outbound command.
//!
//! ## Architecture
//!
//! - [`MessageKind`] is the closed set of telemetry categories the snapshot tracks
//! - [`TelemetryMessage`] is a tagged variant holding exactly one decoded payload
//! - [`Payload`] gives typed access to a payload (`view.get::<Attitude>()`)
//! - [`SetpointCommand`] is the single outstanding command the command loop streams
//! - [`Identity`] is a MAVLink system/component id pair
//! - [`Frame`] is one MAVLink packet with its header parsed and payload kept raw
//!
//! ## Usage Example
//!
//! ```rust
//! use mavbridge::types::{Attitude, MessageKind, Payload, TelemetryMessage};
//!
//! let message = TelemetryMessage::from(Attitude { roll: 0.1, ..Default::default() });
//! assert_eq!(message.kind(), MessageKind::Attitude);
//! assert_eq!(MessageKind::from_message_id(30), Some(MessageKind::Attitude));
//!
//! let attitude = Attitude::from_message(&message).unwrap();
//! assert_eq!(attitude.roll, 0.1);
//! ```

mod command;
pub mod frame;
mod kind;
mod telemetry;

pub use command::{CoordinateFrame, SetpointCommand, type_mask};
pub use frame::{Frame, ProtocolVersion};
pub use kind::{Identity, MessageKind};
pub use telemetry::{
    Altitude, Attitude, BatteryStatus, GlobalPositionInt, GpsGlobalOrigin, GpsRawInt, Heartbeat,
    HighresImu, LocalPositionNed, Odometry, Payload, SysStatus, TelemetryMessage, Vibration,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn message_ids_are_unique() {
        let mut ids: Vec<u32> = MessageKind::ALL.iter().map(|k| k.message_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), MessageKind::ALL.len());
    }

    #[test]
    fn every_kind_maps_back_from_its_id() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_message_id(kind.message_id()), Some(kind));
        }
    }

    #[test]
    fn typed_payload_extraction_rejects_other_kinds() {
        let message = TelemetryMessage::from(Heartbeat::default());
        assert!(Heartbeat::from_message(&message).is_some());
        assert!(Attitude::from_message(&message).is_none());
        assert_eq!(<Heartbeat as Payload>::KIND, message.kind());
    }

    #[test]
    fn gps_scaling() {
        let gps = GpsRawInt { lat: 473_977_418, lon: 85_455_938, alt: 488_120, ..Default::default() };
        assert!((gps.latitude_deg() - 47.3977418).abs() < 1e-9);
        assert!((gps.longitude_deg() - 8.5455938).abs() < 1e-9);
        assert!((gps.altitude_m() - 488.12).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn unknown_message_ids_have_no_kind(id in 0u32..0x00FF_FFFF) {
            let known = MessageKind::ALL.iter().any(|k| k.message_id() == id);
            prop_assert_eq!(MessageKind::from_message_id(id).is_some(), known);
        }
    }
}
