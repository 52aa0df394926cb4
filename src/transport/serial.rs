//! Serial transport (UART or USB telemetry radio)

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{info, trace};

use super::{Transport, TransportKind};
use crate::framing::FrameParser;
use crate::types::Frame;
use crate::{BridgeError, Result};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 512;

type PortSlot = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// Serial port transport.
///
/// The port handle is cloned on open so reads and writes use separate handles,
/// each behind its own lock. Blocking I/O runs on the blocking thread pool.
pub struct SerialTransport {
    device: String,
    baud_rate: u32,
    read_timeout: Duration,
    reader: PortSlot,
    writer: PortSlot,
    parser: Arc<Mutex<FrameParser>>,
    running: AtomicBool,
}

impl SerialTransport {
    /// Transport for `device` (e.g. `/dev/ttyUSB0`) at `baud_rate`, 8N1 without
    /// flow control.
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reader: Arc::new(Mutex::new(None)),
            writer: Arc::new(Mutex::new(None)),
            parser: Arc::new(Mutex::new(FrameParser::new())),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

/// Read from the port until a frame completes or the deadline passes.
fn read_blocking(
    reader: &PortSlot,
    parser: &Mutex<FrameParser>,
    read_timeout: Duration,
) -> Result<Option<Frame>> {
    let mut reader = reader
        .lock()
        .map_err(|_| BridgeError::transport_read("serial reader lock poisoned"))?;
    let port = reader.as_mut().ok_or(BridgeError::TransportNotReady)?;
    let mut parser =
        parser.lock().map_err(|_| BridgeError::transport_read("frame parser lock poisoned"))?;

    if let Some(frame) = parser.next_frame() {
        return Ok(Some(frame));
    }

    let deadline = Instant::now() + read_timeout;
    let mut chunk = [0u8; READ_CHUNK];
    while Instant::now() < deadline {
        match port.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                parser.push(&chunk[..n]);
                if let Some(frame) = parser.next_frame() {
                    return Ok(Some(frame));
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                return Err(BridgeError::transport_read_with_source(
                    "serial read failed",
                    Box::new(e),
                ));
            }
        }
    }
    Ok(None)
}

/// Drop both port handles, returning whether the port was open.
fn release_ports(reader: &PortSlot, writer: &PortSlot, parser: &Mutex<FrameParser>) -> bool {
    let reader = reader.lock().ok().and_then(|mut slot| slot.take());
    let writer = writer.lock().ok().and_then(|mut slot| slot.take());
    let released = reader.is_some() || writer.is_some();
    if released {
        if let Ok(mut parser) = parser.lock() {
            parser.reset();
        }
    }
    released
}

fn write_blocking(writer: &PortSlot, bytes: &[u8]) -> Result<usize> {
    let mut writer = writer
        .lock()
        .map_err(|_| BridgeError::transport_write("serial writer lock poisoned"))?;
    let port = writer.as_mut().ok_or(BridgeError::TransportNotReady)?;
    port.write_all(bytes).and_then(|()| port.flush()).map_err(|e| {
        BridgeError::transport_write_with_source("serial write failed", Box::new(e))
    })?;
    Ok(bytes.len())
}

#[async_trait::async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn open(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let port = serialport::new(&self.device, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()?;
        let write_port = port.try_clone()?;

        if let (Ok(mut reader), Ok(mut writer)) = (self.reader.lock(), self.writer.lock()) {
            *reader = Some(port);
            *writer = Some(write_port);
        } else {
            return Err(BridgeError::transport_open("serial", "port lock poisoned", None));
        }
        self.running.store(true, Ordering::Release);
        info!("Opened serial port: {} at {} baud", self.device, self.baud_rate);
        Ok(())
    }

    /// Release both handles. A read still in flight on the blocking pool holds
    /// the reader lock for up to the read timeout, so the handles are taken on
    /// the blocking pool too.
    async fn close(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        let reader = Arc::clone(&self.reader);
        let writer = Arc::clone(&self.writer);
        let parser = Arc::clone(&self.parser);

        let released = tokio::task::spawn_blocking(move || release_ports(&reader, &writer, &parser))
            .await
            .map_err(|source| BridgeError::TaskJoin { task: "serial close", source })?;
        if released {
            info!("Closed serial port: {}", self.device);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn read_frame(&self) -> Result<Option<Frame>> {
        if !self.is_running() {
            return Err(BridgeError::TransportNotReady);
        }
        let reader = Arc::clone(&self.reader);
        let parser = Arc::clone(&self.parser);
        let read_timeout = self.read_timeout;

        tokio::task::spawn_blocking(move || read_blocking(&reader, &parser, read_timeout))
            .await
            .map_err(|source| BridgeError::TaskJoin { task: "serial read", source })?
    }

    async fn write_frame(&self, frame: &Frame) -> Result<usize> {
        if !self.is_running() {
            return Err(BridgeError::TransportNotReady);
        }
        let writer = Arc::clone(&self.writer);
        let bytes = frame.as_bytes().to_vec();
        trace!(len = bytes.len(), message_id = frame.message_id, "Writing serial frame");

        tokio::task::spawn_blocking(move || write_blocking(&writer, &bytes))
            .await
            .map_err(|source| BridgeError::TaskJoin { task: "serial write", source })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_device_fails_to_open() {
        let transport = SerialTransport::new("/dev/mavbridge-does-not-exist", 57600);

        let err = transport.open().await.unwrap_err();

        assert!(matches!(err, BridgeError::TransportOpen { transport: "serial", .. }));
        assert!(err.is_fatal_to_startup());
        assert!(!transport.is_running());
    }

    #[tokio::test]
    async fn io_before_open_is_not_ready() {
        let transport = SerialTransport::new("/dev/ttyUSB0", 921_600);
        assert!(matches!(transport.read_frame().await, Err(BridgeError::TransportNotReady)));
        assert_eq!(transport.baud_rate(), 921_600);
        assert_eq!(transport.device(), "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn close_waits_for_an_in_flight_read_off_the_runtime() {
        let transport = SerialTransport::new("/dev/ttyUSB0", 921_600);
        let held = Arc::clone(&transport.reader);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let reader_thread = std::thread::spawn(move || {
            let _guard = held.lock().expect("reader lock");
            locked_tx.send(()).expect("signal");
            std::thread::sleep(Duration::from_millis(200));
        });
        locked_rx.recv().expect("reader lock held");

        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = Arc::clone(&ticks);
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        transport.close().await.expect("close");
        ticker.abort();
        reader_thread.join().expect("reader thread");

        assert!(ticks.load(Ordering::Relaxed) >= 5, "runtime stalled during close");
        assert!(!transport.is_running());
    }
}
