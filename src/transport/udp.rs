//! UDP transport (e.g. PX4 SITL or a telemetry radio bridge)

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info};

use super::{Transport, TransportKind};
use crate::framing::FrameParser;
use crate::types::Frame;
use crate::{BridgeError, Result};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Largest datagram accepted; several frames may share one datagram.
const DATAGRAM_LEN: usize = 2048;

/// Datagram transport bound to a local address.
///
/// The remote port is learned from the first datagram received unless it is
/// configured. When a remote IP is configured, datagrams from other hosts are
/// ignored.
pub struct UdpTransport {
    bind_address: SocketAddr,
    remote_ip: Option<IpAddr>,
    remote_port: Option<u16>,
    read_timeout: Duration,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    peer: Mutex<Option<SocketAddr>>,
    parser: tokio::sync::Mutex<FrameParser>,
    running: AtomicBool,
}

impl UdpTransport {
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            remote_ip: None,
            remote_port: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            socket: Mutex::new(None),
            peer: Mutex::new(None),
            parser: tokio::sync::Mutex::new(FrameParser::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_remote_ip(mut self, remote_ip: Option<IpAddr>) -> Self {
        self.remote_ip = remote_ip;
        self
    }

    pub fn with_remote_port(mut self, remote_port: Option<u16>) -> Self {
        self.remote_port = remote_port;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Address the socket is bound to, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.current_socket().and_then(|socket| socket.local_addr().ok())
    }

    /// Remote endpoint writes go to, once known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.learned_peer().or_else(|| self.configured_peer())
    }

    fn configured_peer(&self) -> Option<SocketAddr> {
        match (self.remote_ip, self.remote_port) {
            (Some(ip), Some(port)) => Some(SocketAddr::new(ip, port)),
            _ => None,
        }
    }

    fn learned_peer(&self) -> Option<SocketAddr> {
        self.peer.lock().ok().and_then(|peer| *peer)
    }

    fn current_socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.lock().ok().and_then(|socket| socket.clone())
    }

    fn socket_or_not_ready(&self) -> Result<Arc<UdpSocket>> {
        self.current_socket().ok_or(BridgeError::TransportNotReady)
    }

    /// Accept a datagram source, learning the peer on first contact.
    fn accept_source(&self, source: SocketAddr) -> bool {
        if self.remote_ip.is_some_and(|ip| ip != source.ip()) {
            return false;
        }
        if let Ok(mut peer) = self.peer.lock() {
            if peer.is_none() {
                let learned = SocketAddr::new(
                    self.remote_ip.unwrap_or(source.ip()),
                    self.remote_port.unwrap_or(source.port()),
                );
                info!("Learned UDP peer {}", learned);
                *peer = Some(learned);
            }
        }
        true
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    async fn open(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let socket = UdpSocket::bind(self.bind_address).await.map_err(|e| {
            BridgeError::transport_open(
                "udp",
                format!("cannot bind {}", self.bind_address),
                Some(Box::new(e)),
            )
        })?;
        info!("Opened UDP transport on {}", socket.local_addr().unwrap_or(self.bind_address));

        if let Ok(mut slot) = self.socket.lock() {
            *slot = Some(Arc::new(socket));
        }
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        let socket = self.socket.lock().ok().and_then(|mut slot| slot.take());
        if socket.is_some() {
            self.parser.lock().await.reset();
            info!("Closed UDP transport on {}", self.bind_address);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn read_frame(&self) -> Result<Option<Frame>> {
        let socket = self.socket_or_not_ready()?;
        let mut parser = self.parser.lock().await;
        if let Some(frame) = parser.next_frame() {
            return Ok(Some(frame));
        }

        let deadline = tokio::time::Instant::now() + self.read_timeout;
        let mut datagram = [0u8; DATAGRAM_LEN];
        loop {
            let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut datagram)).await;
            let (len, source) = match received {
                Err(_elapsed) => return Ok(None),
                Ok(Err(e)) => {
                    return Err(BridgeError::transport_read_with_source(
                        "UDP receive failed",
                        Box::new(e),
                    ));
                }
                Ok(Ok(received)) => received,
            };

            if !self.accept_source(source) {
                debug!("Ignoring datagram from {}", source);
                continue;
            }
            parser.push(&datagram[..len]);
            if let Some(frame) = parser.next_frame() {
                return Ok(Some(frame));
            }
        }
    }

    async fn write_frame(&self, frame: &Frame) -> Result<usize> {
        let socket = self.socket_or_not_ready()?;
        let peer = self
            .peer()
            .ok_or_else(|| BridgeError::transport_write("UDP peer not known yet"))?;
        socket.send_to(frame.as_bytes(), peer).await.map_err(|e| {
            BridgeError::transport_write_with_source(
                format!("UDP send to {} failed", peer),
                Box::new(e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    fn heartbeat(seq: u8) -> Frame {
        Frame::build_v2(seq, Identity::new(1, 1), 0, &[0, 0, 0, 0, 2, 3, 81, 4, 3], 50)
            .expect("build")
    }

    #[tokio::test]
    async fn read_before_open_is_not_ready() {
        let transport = UdpTransport::new(loopback());
        assert!(!transport.is_running());
        assert!(matches!(transport.read_frame().await, Err(BridgeError::TransportNotReady)));
    }

    #[tokio::test]
    async fn learns_peer_and_replies() {
        let transport = UdpTransport::new(loopback()).with_read_timeout(Duration::from_secs(2));
        transport.open().await.expect("open");
        let local = transport.local_addr().expect("bound");

        // No peer yet, so writes fail
        assert!(transport.write_frame(&heartbeat(0)).await.is_err());

        let vehicle = UdpSocket::bind(loopback()).await.expect("bind vehicle");
        let first = heartbeat(1);
        let second = heartbeat(2);
        let mut datagram = first.as_bytes().to_vec();
        datagram.extend_from_slice(second.as_bytes());
        vehicle.send_to(&datagram, local).await.expect("send");

        assert_eq!(transport.read_frame().await.expect("read"), Some(first));
        assert_eq!(transport.read_frame().await.expect("read"), Some(second));
        assert_eq!(transport.peer(), vehicle.local_addr().ok());

        let reply = heartbeat(3);
        let written = transport.write_frame(&reply).await.expect("write");
        assert_eq!(written, reply.len());

        let mut buf = [0u8; 64];
        let (len, _) = vehicle.recv_from(&mut buf).await.expect("recv");
        assert_eq!(&buf[..len], reply.as_bytes());

        transport.close().await.expect("close");
        assert!(!transport.is_running());
    }

    #[tokio::test]
    async fn read_times_out_without_data() {
        let transport = UdpTransport::new(loopback()).with_read_timeout(Duration::from_millis(20));
        transport.open().await.expect("open");

        assert_eq!(transport.read_frame().await.expect("read"), None);
    }
}
