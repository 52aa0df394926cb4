//! In-memory transport for tests and simulations

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use super::{Transport, TransportKind};
use crate::types::Frame;
use crate::{BridgeError, Result};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

enum Inbound {
    Frame(Frame),
    ReadError(String),
}

#[derive(Default)]
struct MockState {
    inbound: VecDeque<Inbound>,
    written: Vec<Frame>,
    open_error: Option<String>,
    fail_writes: bool,
}

struct MockInner {
    state: Mutex<MockState>,
    inbound_ready: Notify,
    running: AtomicBool,
    read_timeout: Duration,
}

/// Mock transport: frames injected by the test are returned by `read_frame`,
/// frames written by the session are recorded.
///
/// Clones share state, so a test keeps one handle while the session owns
/// another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_read_timeout(DEFAULT_READ_TIMEOUT)
    }

    /// Mock whose empty reads wait `read_timeout` before reporting a timeout.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState::default()),
                inbound_ready: Notify::new(),
                running: AtomicBool::new(false),
                read_timeout,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded frames
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a frame to be read.
    pub fn inject_frame(&self, frame: Frame) {
        self.state().inbound.push_back(Inbound::Frame(frame));
        self.inner.inbound_ready.notify_one();
    }

    /// Queue a failed read.
    pub fn inject_read_error(&self, reason: impl Into<String>) {
        self.state().inbound.push_back(Inbound::ReadError(reason.into()));
        self.inner.inbound_ready.notify_one();
    }

    /// Frames queued but not yet read.
    pub fn pending_reads(&self) -> usize {
        self.state().inbound.len()
    }

    /// Every frame written so far, oldest first.
    pub fn written_frames(&self) -> Vec<Frame> {
        self.state().written.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state().written.len()
    }

    pub fn clear_written(&self) {
        self.state().written.clear();
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Make the next `open` fail with `reason`.
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state().open_error = Some(reason.into());
    }

    fn pop_inbound(&self) -> Option<Inbound> {
        self.state().inbound.pop_front()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Mock
    }

    async fn open(&self) -> Result<()> {
        if let Some(reason) = self.state().open_error.take() {
            return Err(BridgeError::transport_open("mock", reason, None));
        }
        self.inner.running.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inner.running.store(false, Ordering::Release);
        self.inner.inbound_ready.notify_waiters();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    async fn read_frame(&self) -> Result<Option<Frame>> {
        if !self.is_running() {
            return Err(BridgeError::TransportNotReady);
        }
        let inbound = match self.pop_inbound() {
            Some(inbound) => Some(inbound),
            None => {
                let _ = tokio::time::timeout(
                    self.inner.read_timeout,
                    self.inner.inbound_ready.notified(),
                )
                .await;
                self.pop_inbound()
            }
        };

        match inbound {
            Some(Inbound::Frame(frame)) => Ok(Some(frame)),
            Some(Inbound::ReadError(reason)) => Err(BridgeError::transport_read(reason)),
            None => Ok(None),
        }
    }

    async fn write_frame(&self, frame: &Frame) -> Result<usize> {
        if !self.is_running() {
            return Err(BridgeError::TransportNotReady);
        }
        let mut state = self.state();
        if state.fail_writes {
            return Err(BridgeError::transport_write("mock write failure"));
        }
        state.written.push(frame.clone());
        Ok(frame.len())
    }
}
