//! Bridge configuration loaded from YAML
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```yaml
//! transport:
//!   type: udp
//!   bind_address: 0.0.0.0:14540
//!   remote_ip: 127.0.0.1
//! session:
//!   keep_alive_ms: 250
//! metrics:
//!   address: 127.0.0.1:8089
//!   tags:
//!     vehicle: x500
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::Identity;
use crate::{BridgeError, Result};

/// Keep-alive period above which the autopilot's offboard failsafe (2 Hz) trips.
pub const MAX_SAFE_KEEP_ALIVE: Duration = Duration::from_millis(500);

pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 921_600;
pub const DEFAULT_UDP_PORT: u16 = 14540;

/// Full bridge configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Metrics export; disabled when absent
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl BridgeConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        self.session.validate()?;
        if let Some(metrics) = &self.metrics {
            metrics.validate()?;
        }
        Ok(())
    }
}

/// Link to the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    Serial {
        #[serde(default = "default_device")]
        device: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_read_timeout_ms")]
        read_timeout_ms: u64,
    },
    Udp {
        #[serde(default = "default_bind_address")]
        bind_address: SocketAddr,
        /// Only accept datagrams from (and reply to) this host
        #[serde(default)]
        remote_ip: Option<IpAddr>,
        /// Reply port; learned from the first datagram when absent
        #[serde(default)]
        remote_port: Option<u16>,
        #[serde(default = "default_read_timeout_ms")]
        read_timeout_ms: u64,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Serial {
            device: default_device(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl TransportConfig {
    /// UDP transport listening on the default offboard port.
    pub fn default_udp() -> Self {
        TransportConfig::Udp {
            bind_address: default_bind_address(),
            remote_ip: None,
            remote_port: None,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TransportConfig::Serial { device, baud_rate, read_timeout_ms } => {
                if device.trim().is_empty() {
                    return Err(BridgeError::config("serial device path is empty"));
                }
                if *baud_rate == 0 {
                    return Err(BridgeError::config("serial baud rate must be positive"));
                }
                validate_read_timeout(*read_timeout_ms)
            }
            TransportConfig::Udp { read_timeout_ms, .. } => validate_read_timeout(*read_timeout_ms),
        }
    }
}

fn validate_read_timeout(read_timeout_ms: u64) -> Result<()> {
    if read_timeout_ms == 0 {
        return Err(BridgeError::config("read_timeout_ms must be positive"));
    }
    Ok(())
}

/// Session timing and identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Period between setpoint sends
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,

    /// Pause after a read returns no frame
    #[serde(default = "default_read_idle_sleep_ms")]
    pub read_idle_sleep_ms: u64,

    /// Vehicle system id; discovered from the first message when absent
    #[serde(default)]
    pub system_id: Option<u8>,

    /// Autopilot component id; discovered from the first message when absent
    #[serde(default)]
    pub component_id: Option<u8>,

    /// Component id this bridge sends from
    #[serde(default)]
    pub companion_component_id: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_ms: default_keep_alive_ms(),
            read_idle_sleep_ms: default_read_idle_sleep_ms(),
            system_id: None,
            component_id: None,
            companion_component_id: 0,
        }
    }
}

impl SessionConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn read_idle_sleep(&self) -> Duration {
        Duration::from_millis(self.read_idle_sleep_ms)
    }

    /// Pre-configure the remote identity instead of discovering it.
    pub fn with_remote_identity(mut self, identity: Identity) -> Self {
        self.system_id = Some(identity.system_id);
        self.component_id = Some(identity.component_id);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.keep_alive_ms == 0 {
            return Err(BridgeError::config("keep_alive_ms must be positive"));
        }
        if self.keep_alive() > MAX_SAFE_KEEP_ALIVE {
            warn!(
                keep_alive_ms = self.keep_alive_ms,
                "Keep-alive period exceeds {:?}; the vehicle may leave offboard mode",
                MAX_SAFE_KEEP_ALIVE
            );
        }
        Ok(())
    }
}

/// InfluxDB line-protocol export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// InfluxDB UDP listener
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Publish period
    #[serde(default = "default_metrics_interval_ms")]
    pub interval_ms: u64,

    /// Extra tags added to every point
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            address: default_metrics_address(),
            interval_ms: default_metrics_interval_ms(),
            tags: BTreeMap::new(),
        }
    }
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(BridgeError::config("metrics interval_ms must be positive"));
        }
        Ok(())
    }
}

fn default_device() -> String {
    DEFAULT_SERIAL_DEVICE.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_UDP_PORT)
}

fn default_keep_alive_ms() -> u64 {
    250
}

fn default_read_idle_sleep_ms() -> u64 {
    10
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8089)
}

fn default_metrics_interval_ms() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = BridgeConfig::from_yaml_str("").expect("defaults");

        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.session.keep_alive(), Duration::from_millis(250));
        assert_eq!(config.session.read_idle_sleep(), Duration::from_millis(10));
        assert_eq!(config.session.companion_component_id, 0);
        assert!(config.metrics.is_none());
        assert!(matches!(
            config.transport,
            TransportConfig::Serial { baud_rate: 921_600, ref device, .. } if device == "/dev/ttyUSB0"
        ));
    }

    #[test]
    fn udp_transport_with_partial_fields() {
        let yaml = r#"
transport:
  type: udp
  remote_ip: 192.168.1.20
session:
  system_id: 1
  component_id: 1
metrics:
  tags:
    vehicle: x500
"#;
        let config = BridgeConfig::from_yaml_str(yaml).expect("parse");

        let TransportConfig::Udp { bind_address, remote_ip, remote_port, read_timeout_ms } =
            config.transport
        else {
            panic!("expected udp transport, got {:?}", config.transport);
        };
        assert_eq!(bind_address.port(), 14540);
        assert_eq!(remote_ip, Some("192.168.1.20".parse().expect("ip")));
        assert_eq!(remote_port, None);
        assert_eq!(read_timeout_ms, 100);
        assert_eq!(config.session.system_id, Some(1));

        let metrics = config.metrics.expect("metrics section");
        assert_eq!(metrics.address.port(), 8089);
        assert_eq!(metrics.interval(), Duration::from_millis(10));
        assert_eq!(metrics.tags.get("vehicle").map(String::as_str), Some("x500"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = BridgeConfig::from_yaml_str("session:\n  keep_alive_ms: 0\n").unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));

        let err = BridgeConfig::from_yaml_str("transport:\n  type: serial\n  baud_rate: 0\n")
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));

        let err = BridgeConfig::from_yaml_str("transport:\n  type: carrier_pigeon\n").unwrap_err();
        assert!(err.is_fatal_to_startup());
    }

    #[test]
    fn yaml_round_trip() {
        let config = BridgeConfig {
            transport: TransportConfig::default_udp(),
            session: SessionConfig::default().with_remote_identity(Identity::new(42, 7)),
            metrics: Some(MetricsConfig::default()),
        };

        let yaml = config.to_yaml_string().expect("serialize");
        let parsed = BridgeConfig::from_yaml_str(&yaml).expect("parse");

        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = BridgeConfig::load("/nonexistent/mavbridge.yaml").unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }
}
