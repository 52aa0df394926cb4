//! Destinations for metric points

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::debug;

use super::Point;
use crate::{BridgeError, Result};

/// Keeps datagrams under a typical Ethernet MTU.
const MAX_DATAGRAM: usize = 1400;

/// Something that stores metric points.
#[async_trait::async_trait]
pub trait MetricsSink: Send + Sync + 'static {
    /// Write one batch. A failed batch is dropped by the caller, not retried.
    async fn write(&self, points: &[Point]) -> Result<()>;
}

/// Writes line protocol to an InfluxDB UDP listener.
pub struct UdpLineSink {
    socket: UdpSocket,
    address: SocketAddr,
}

impl UdpLineSink {
    /// Bind an ephemeral local port and target `address`.
    pub async fn connect(address: SocketAddr) -> Result<Self> {
        let local = match address.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local).await.map_err(|e| {
            BridgeError::metrics(format!("cannot bind metrics socket {}", local), Some(Box::new(e)))
        })?;
        socket.connect(address).await.map_err(|e| {
            BridgeError::metrics(format!("cannot reach metrics sink {}", address), Some(Box::new(e)))
        })?;
        debug!("Metrics sink targeting {}", address);
        Ok(Self { socket, address })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

/// Pack rendered lines into datagrams of at most `MAX_DATAGRAM` bytes. A line
/// longer than that gets a datagram of its own.
pub(crate) fn pack_datagrams(points: &[Point]) -> Vec<String> {
    let mut datagrams = Vec::new();
    let mut current = String::new();
    for line in points.iter().filter_map(Point::to_line_protocol) {
        if !current.is_empty() && current.len() + 1 + line.len() > MAX_DATAGRAM {
            datagrams.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        datagrams.push(current);
    }
    datagrams
}

#[async_trait::async_trait]
impl MetricsSink for UdpLineSink {
    async fn write(&self, points: &[Point]) -> Result<()> {
        for datagram in pack_datagrams(points) {
            self.socket.send(datagram.as_bytes()).await.map_err(|e| {
                BridgeError::metrics(
                    format!("send to {} failed", self.address),
                    Some(Box::new(e)),
                )
            })?;
        }
        Ok(())
    }
}
