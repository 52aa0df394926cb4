//! MAVLink telemetry and offboard-command bridge.
//!
//! mavbridge keeps a bidirectional session with a vehicle over an unreliable
//! byte link: inbound telemetry frames are decoded into a live snapshot, and
//! the current setpoint is streamed back often enough that the autopilot does
//! not fall back to its failsafe.
//!
//! # Features
//!
//! - **Transports**: serial port or UDP, behind one [`Transport`] trait
//! - **Snapshot**: latest value and arrival time per [`MessageKind`], readable
//!   from any task without blocking ingestion
//! - **Keep-alive**: setpoints sent on a fixed period regardless of failures
//! - **Metrics**: optional InfluxDB line-protocol export of the snapshot
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mavbridge::{MavlinkCodec, Session, SessionConfig, SetpointCommand, UdpTransport};
//! use mavbridge::types::Attitude;
//! use mavbridge::transport::Transport;
//!
//! #[tokio::main]
//! async fn main() -> mavbridge::Result<()> {
//!     let transport = Arc::new(UdpTransport::new("0.0.0.0:14540".parse().unwrap()));
//!     transport.open().await?;
//!
//!     let session = Session::new(transport, Arc::new(MavlinkCodec), SessionConfig::default());
//!     session.start().await?;
//!
//!     if let Some(attitude) = session.latest::<Attitude>() {
//!         println!("roll: {}", attitude.roll);
//!     }
//!     session.update_command(SetpointCommand::velocity(1.0, 0.0, 0.0));
//!
//!     session.stop().await
//! }
//! ```

// Core types and error handling
pub mod codec;
pub mod config;
mod error;
pub mod framing;
pub mod test_utils;
pub mod types;

// Session and its collaborators
pub mod metrics;
pub mod session;
pub mod snapshot;
pub mod stream;
pub mod transport;

pub use codec::{Codec, MavlinkCodec, Route, Telemetry};
pub use config::{BridgeConfig, MetricsConfig, SessionConfig, TransportConfig};
pub use error::*;
pub use session::{Session, SessionStatus};
pub use snapshot::{Snapshot, SnapshotEntry, SnapshotView};
pub use transport::{MockTransport, SerialTransport, Transport, TransportKind, UdpTransport};
pub use types::{Frame, Identity, MessageKind, SetpointCommand, TelemetryMessage};
