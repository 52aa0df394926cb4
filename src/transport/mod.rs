//! Transport port: frame-level duplex channel to the vehicle
//!
//! Every implementation bounds `read_frame` by a read timeout so the ingest
//! loop can observe cancellation, and serializes its own read and write access
//! to the underlying handle. Reads and writes may run concurrently from the
//! ingest and command loops.

use std::fmt;
use std::sync::Arc;

use crate::Result;
use crate::config::TransportConfig;
use crate::types::Frame;

mod mock;
mod serial;
mod udp;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use udp::UdpTransport;

/// Which kind of link a transport drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Serial,
    Udp,
    Mock,
}

impl TransportKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportKind::Serial => "serial",
            TransportKind::Udp => "udp",
            TransportKind::Mock => "mock",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for frame transports
///
/// Methods take `&self` so one transport can be shared (`Arc<dyn Transport>`)
/// between the ingest loop, the command loop and the caller who opens and
/// closes it.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    fn kind(&self) -> TransportKind;

    /// Acquire the underlying OS resource. Failure is fatal to session startup.
    async fn open(&self) -> Result<()>;

    /// Release the underlying resource. Closing a closed transport is a no-op.
    async fn close(&self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Read the next frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - A complete frame arrived
    /// - `Ok(None)` - Read timeout elapsed with no complete frame
    /// - `Err(e)` - Read failed; the caller decides whether to continue
    async fn read_frame(&self) -> Result<Option<Frame>>;

    /// Write one frame, returning the number of bytes written.
    async fn write_frame(&self, frame: &Frame) -> Result<usize>;
}

/// Build the transport selected by configuration. The transport is not opened.
pub fn from_config(config: &TransportConfig) -> Result<Arc<dyn Transport>> {
    config.validate()?;
    let transport: Arc<dyn Transport> = match config {
        TransportConfig::Serial { device, baud_rate, read_timeout_ms } => Arc::new(
            SerialTransport::new(device.clone(), *baud_rate)
                .with_read_timeout(std::time::Duration::from_millis(*read_timeout_ms)),
        ),
        TransportConfig::Udp { bind_address, remote_ip, remote_port, read_timeout_ms } => {
            Arc::new(
                UdpTransport::new(*bind_address)
                    .with_remote_ip(*remote_ip)
                    .with_remote_port(*remote_port)
                    .with_read_timeout(std::time::Duration::from_millis(*read_timeout_ms)),
            )
        }
    };
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_from_config_is_not_opened() {
        let udp = from_config(&TransportConfig::default_udp()).expect("udp transport");
        assert_eq!(udp.kind(), TransportKind::Udp);
        assert!(!udp.is_running());

        let serial = from_config(&TransportConfig::default()).expect("serial transport");
        assert_eq!(serial.kind(), TransportKind::Serial);
        assert!(!serial.is_running());
    }

    #[test]
    fn kind_names() {
        assert_eq!(TransportKind::Serial.to_string(), "serial");
        assert_eq!(TransportKind::Udp.as_str(), "udp");
    }
}
