//! mavbridge daemon
//!
//! Opens a link to the vehicle, keeps the offboard setpoint stream alive and
//! optionally exports the telemetry snapshot to InfluxDB until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Serial link with defaults (/dev/ttyUSB0 at 921600 baud)
//! mavbridge
//!
//! # UDP link to SITL, exporting metrics
//! mavbridge --udp-ip 127.0.0.1 --port 14540 --influx 127.0.0.1:8089
//!
//! # Configuration file with command line overrides
//! mavbridge --config mavbridge.yaml --baud 57600
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mavbridge::config::{DEFAULT_BAUD_RATE, DEFAULT_SERIAL_DEVICE, DEFAULT_UDP_PORT};
use mavbridge::metrics::{MetricsPublisher, UdpLineSink};
use mavbridge::transport::{self, Transport};
use mavbridge::{BridgeConfig, MavlinkCodec, MetricsConfig, Session, TransportConfig};

/// MAVLink telemetry and offboard-command bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device path
    #[arg(short, long)]
    device: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Vehicle IP address; selects the UDP link
    #[arg(short, long)]
    udp_ip: Option<IpAddr>,

    /// Local UDP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Request automatic takeoff (reported only)
    #[arg(short, long)]
    autotakeoff: bool,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// InfluxDB UDP listener, e.g. 127.0.0.1:8089
    #[arg(long)]
    influx: Option<SocketAddr>,
}

impl Args {
    /// Layer the flags over the file configuration (or the defaults).
    fn into_config(self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if self.udp_ip.is_some() || matches!(config.transport, TransportConfig::Udp { .. }) {
            if self.device.is_some() || self.baud.is_some() {
                warn!("UDP link selected; serial options ignored");
            }
            let (mut bind_address, mut remote_ip, remote_port, read_timeout_ms) =
                match config.transport {
                    TransportConfig::Udp { bind_address, remote_ip, remote_port, read_timeout_ms } => {
                        (bind_address, remote_ip, remote_port, read_timeout_ms)
                    }
                    TransportConfig::Serial { read_timeout_ms, .. } => (
                        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_UDP_PORT),
                        None,
                        None,
                        read_timeout_ms,
                    ),
                };
            if let Some(port) = self.port {
                bind_address.set_port(port);
            }
            if self.udp_ip.is_some() {
                remote_ip = self.udp_ip;
            }
            config.transport =
                TransportConfig::Udp { bind_address, remote_ip, remote_port, read_timeout_ms };
        } else if let TransportConfig::Serial { device, baud_rate, .. } = &mut config.transport {
            if let Some(d) = self.device {
                *device = d;
            }
            if let Some(b) = self.baud {
                *baud_rate = b;
            }
            if self.port.is_some() {
                warn!("Serial link selected; --port ignored");
            }
        }

        if let Some(address) = self.influx {
            let metrics = config.metrics.get_or_insert_with(MetricsConfig::default);
            metrics.address = address;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Stop the loops and release the link after a failed startup. The startup
/// error is what gets reported, so a close failure is only logged.
async fn abort_startup(session: &Session, link: &Arc<dyn Transport>) {
    session.handle_quit().await;
    if let Err(e) = link.close().await {
        warn!("Failed to close {} link: {}", link.kind(), e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let autotakeoff = args.autotakeoff;
    let config = args.into_config()?;

    info!("mavbridge v{}", env!("CARGO_PKG_VERSION"));
    match &config.transport {
        TransportConfig::Serial { device, baud_rate, .. } => {
            info!(
                "Serial link {} at {} baud (defaults {} / {})",
                device, baud_rate, DEFAULT_SERIAL_DEVICE, DEFAULT_BAUD_RATE
            );
        }
        TransportConfig::Udp { bind_address, remote_ip, .. } => match remote_ip {
            Some(ip) => info!("UDP link on {} with vehicle {}", bind_address, ip),
            None => info!("UDP link on {} accepting any vehicle", bind_address),
        },
    }
    if autotakeoff {
        info!("Autotakeoff requested; flight control is left to the operator");
    }

    let link = transport::from_config(&config.transport).context("building transport")?;
    link.open().await.with_context(|| format!("opening {} link", link.kind()))?;

    let session = Arc::new(Session::new(
        Arc::clone(&link),
        Arc::new(MavlinkCodec),
        config.session.clone(),
    ));

    let interrupted = tokio::select! {
        result = session.start() => {
            if let Err(e) = result {
                abort_startup(&session, &link).await;
                return Err(e).context("starting session");
            }
            false
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            true
        }
    };

    let publisher = if interrupted {
        None
    } else {
        info!("Session running; press Ctrl-C to stop");
        match &config.metrics {
            Some(metrics) => {
                let sink = match UdpLineSink::connect(metrics.address).await {
                    Ok(sink) => sink,
                    Err(e) => {
                        abort_startup(&session, &link).await;
                        return Err(e).context("connecting metrics sink");
                    }
                };
                info!("Exporting metrics to {} every {:?}", sink.address(), metrics.interval());
                Some(MetricsPublisher::new(sink, metrics).spawn(&session))
            }
            None => None,
        }
    };

    if !interrupted {
        tokio::signal::ctrl_c().await.context("listening for Ctrl-C")?;
    }

    session.handle_quit().await;
    if let Some(publisher) = publisher {
        match publisher.await {
            Ok(stats) => info!(
                batches = stats.batches,
                points = stats.points,
                failed = stats.failed_batches,
                "Metrics publisher finished"
            ),
            Err(e) => warn!("Metrics publisher ended abnormally: {}", e),
        }
    }
    link.close().await.context("closing link")?;

    let status = session.status();
    info!(
        writes = status.write_count,
        write_failures = status.write_failures,
        frames = status.frames_received,
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavbridge::MockTransport;
    use std::time::Duration;

    fn args(flags: &[&str]) -> Args {
        Args::parse_from(std::iter::once("mavbridge").chain(flags.iter().copied()))
    }

    #[test]
    fn udp_ip_selects_the_udp_link() {
        let config = args(&["-u", "10.0.0.2", "-p", "14550"]).into_config().expect("config");

        match config.transport {
            TransportConfig::Udp { bind_address, remote_ip, .. } => {
                assert_eq!(bind_address.port(), 14550);
                assert_eq!(remote_ip, Some(IpAddr::from([10, 0, 0, 2])));
            }
            other => panic!("expected UDP, got {other:?}"),
        }
    }

    #[test]
    fn serial_flags_override_defaults() {
        let config =
            args(&["-d", "/dev/ttyACM0", "-b", "57600", "--influx", "127.0.0.1:9000"])
                .into_config()
                .expect("config");

        assert_eq!(
            config.transport,
            TransportConfig::Serial {
                device: "/dev/ttyACM0".to_string(),
                baud_rate: 57600,
                read_timeout_ms: 100,
            }
        );
        let metrics = config.metrics.expect("metrics enabled");
        assert_eq!(metrics.address, "127.0.0.1:9000".parse().expect("addr"));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_startup_stops_ingest_and_closes_the_link() {
        let mock = MockTransport::new();
        mock.open().await.expect("open");
        let link: Arc<dyn Transport> = Arc::new(mock.clone());
        let session = Arc::new(Session::new(
            Arc::clone(&link),
            Arc::new(MavlinkCodec),
            mavbridge::SessionConfig::default(),
        ));
        let starting = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.start().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.status().reading_active);

        abort_startup(&session, &link).await;

        starting.await.expect("start task").expect("start");
        let status = session.status();
        assert!(status.exit_requested);
        assert!(!status.reading_active);
        assert!(!link.is_running());
    }
}
