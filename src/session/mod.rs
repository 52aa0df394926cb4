//! Session controller: sequences the ingest and command loops
//!
//! ## Lifecycle
//!
//! 1. `start()` checks the transport is running and spawns the ingest loop
//! 2. It waits until the snapshot holds a first message (discovery), or until
//!    cancellation, in which case it returns without spawning the command loop
//! 3. The remote identity is latched from configuration or the first sender
//! 4. The command loop is spawned and `start()` returns after its first send
//! 5. `stop()` cancels both loops and joins them; calling it again is a no-op
//!
//! Dropping a session cancels its loops without joining them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::config::SessionConfig;
use crate::snapshot::{Snapshot, SnapshotEntry, SnapshotView};
use crate::transport::Transport;
use crate::types::{Identity, MessageKind, Payload, SetpointCommand};
use crate::{BridgeError, Result};

mod command;
mod ingest;

use command::CommandLoop;
use ingest::IngestLoop;

/// Consecutive failures between repeated warnings.
const FAILURE_LOG_EVERY: u64 = 100;

/// Counters and flags shared between the session and its loops.
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub(crate) reading_active: AtomicBool,
    pub(crate) writing_active: AtomicBool,
    pub(crate) write_count: AtomicU64,
    pub(crate) write_failures: AtomicU64,
    pub(crate) frames_received: AtomicU64,
    pub(crate) frames_ignored: AtomicU64,
    pub(crate) decode_failures: AtomicU64,
    pub(crate) read_failures: AtomicU64,
}

/// Point-in-time copy of the session's flags and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub reading_active: bool,
    pub writing_active: bool,
    /// Set once by `stop()` (or cancellation) and never cleared
    pub exit_requested: bool,
    /// Setpoint frames written successfully
    pub write_count: u64,
    pub write_failures: u64,
    pub frames_received: u64,
    /// Frames with a message id outside the supported set
    pub frames_ignored: u64,
    pub decode_failures: u64,
    pub read_failures: u64,
}

/// Rate-limited logging of a repeating failure.
///
/// The first failure of a streak logs a warning, then every
/// `FAILURE_LOG_EVERY`th; the end of a streak logs once.
pub(crate) struct FailureStreak {
    what: &'static str,
    count: u64,
}

impl FailureStreak {
    pub(crate) fn new(what: &'static str) -> Self {
        Self { what, count: 0 }
    }

    pub(crate) fn failure(&mut self, err: &BridgeError) {
        self.count += 1;
        if self.count == 1 {
            warn!("{} failed: {}", self.what, err);
        } else if self.count % FAILURE_LOG_EVERY == 0 {
            warn!("{} failed {} times in a row: {}", self.what, self.count, err);
        } else {
            debug!("{} failed: {}", self.what, err);
        }
    }

    pub(crate) fn success(&mut self) {
        if self.count > 0 {
            info!("{} recovered after {} failures", self.what, self.count);
            self.count = 0;
        }
    }
}

#[derive(Default)]
struct LoopHandles {
    ingest: Option<JoinHandle<()>>,
    command: Option<JoinHandle<()>>,
}

/// One bidirectional session with one vehicle.
///
/// Every method takes `&self`; share the session behind an `Arc` to poll the
/// snapshot or update the command from other tasks.
pub struct Session {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    config: SessionConfig,
    snapshot: Snapshot,
    command: Arc<watch::Sender<SetpointCommand>>,
    counters: Arc<SessionCounters>,
    identity: OnceLock<Identity>,
    cancel: CancellationToken,
    handles: Mutex<LoopHandles>,
    started: AtomicBool,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, codec: Arc<dyn Codec>, config: SessionConfig) -> Self {
        let (command, _rx) = watch::channel(SetpointCommand::neutral());
        Self {
            transport,
            codec,
            config,
            snapshot: Snapshot::new(),
            command: Arc::new(command),
            counters: Arc::new(SessionCounters::default()),
            identity: OnceLock::new(),
            cancel: CancellationToken::new(),
            handles: Mutex::new(LoopHandles::default()),
            started: AtomicBool::new(false),
        }
    }

    /// Start the session.
    ///
    /// Blocks until the vehicle has been discovered and the first setpoint has
    /// been sent, or until the session is cancelled. There is no discovery
    /// timeout: a silent vehicle keeps `start()` waiting until `stop()` or
    /// [`Session::cancellation_token`] is used.
    ///
    /// An invalid [`SessionConfig`] is rejected before anything is spawned.
    pub async fn start(&self) -> Result<()> {
        self.config.validate()?;
        if !self.transport.is_running() {
            return Err(BridgeError::TransportNotReady);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Session already started");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::thread_start("ingest", e.to_string()))?;

        let ingest = IngestLoop {
            transport: Arc::clone(&self.transport),
            codec: Arc::clone(&self.codec),
            snapshot: self.snapshot.clone(),
            counters: Arc::clone(&self.counters),
            cancel: self.cancel.child_token(),
            idle_sleep: self.config.read_idle_sleep(),
        };
        let spawned = self.store_handle(|handles| {
            handles.ingest = Some(runtime.spawn(ingest.run()));
        })?;
        if !spawned {
            info!("Exit requested before the ingest loop started");
            return Ok(());
        }

        info!("Waiting for the vehicle");
        let Some(discovered) = self.discover().await else {
            info!("Exit requested during discovery; command loop not started");
            return Ok(());
        };

        let identity = *self.identity.get_or_init(|| Identity {
            system_id: self.config.system_id.unwrap_or(discovered.system_id),
            component_id: self.config.component_id.unwrap_or(discovered.component_id),
        });
        info!(
            system_id = identity.system_id,
            component_id = identity.component_id,
            "Vehicle discovered"
        );

        let (ready_tx, ready_rx) = oneshot::channel();
        let command = CommandLoop {
            transport: Arc::clone(&self.transport),
            codec: Arc::clone(&self.codec),
            command: Arc::clone(&self.command),
            counters: Arc::clone(&self.counters),
            cancel: self.cancel.child_token(),
            period: self.config.keep_alive(),
            source: Identity::new(identity.system_id, self.config.companion_component_id),
            target: identity,
        };
        let spawned = self.store_handle(|handles| {
            handles.command = Some(runtime.spawn(command.run(ready_tx)));
        })?;
        if !spawned {
            info!("Exit requested after discovery; command loop not started");
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("Exit requested before the first setpoint was sent");
                Ok(())
            }
            ready = ready_rx => ready.map_err(|_| {
                BridgeError::thread_start("command", "command loop ended before its first send")
            }),
        }
    }

    /// Wait for the first recorded message and return its sender.
    async fn discover(&self) -> Option<Identity> {
        let mut updates = self.snapshot.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            view = updates.wait_for(|view| view.first_sender().is_some()) => {
                view.ok().and_then(|view| view.first_sender())
            }
        }
    }

    /// Run `store` (which spawns a loop) under the handle lock unless exit was
    /// requested. `stop()` cancels before taking this lock, so a loop is either
    /// stored where `stop()` will join it or never spawned.
    fn store_handle(&self, store: impl FnOnce(&mut LoopHandles)) -> Result<bool> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| BridgeError::thread_start("session", "task handle lock poisoned"))?;
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        store(&mut handles);
        Ok(true)
    }

    /// Request exit and wait for both loops to finish.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn stop(&self) -> Result<()> {
        self.cancel.cancel();

        let (ingest, command) = match self.handles.lock() {
            Ok(mut handles) => (handles.ingest.take(), handles.command.take()),
            Err(poisoned) => {
                let mut handles = poisoned.into_inner();
                (handles.ingest.take(), handles.command.take())
            }
        };
        if ingest.is_none() && command.is_none() {
            return Ok(());
        }

        let mut first_error = None;
        for (task, handle) in [("command", command), ("ingest", ingest)] {
            let Some(handle) = handle else { continue };
            if let Err(source) = handle.await {
                error!("{} loop ended abnormally: {}", task, source);
                first_error.get_or_insert(BridgeError::TaskJoin { task, source });
            }
        }

        // A panicked loop never cleared its flag
        self.counters.reading_active.store(false, Ordering::Release);
        self.counters.writing_active.store(false, Ordering::Release);
        info!(writes = self.counters.write_count.load(Ordering::Relaxed), "Session stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop the session, logging rather than returning any failure.
    ///
    /// Intended for interrupt handlers.
    pub async fn handle_quit(&self) {
        info!("Quit requested");
        if let Err(e) = self.stop().await {
            error!("Error while stopping session: {}", e);
        }
    }

    /// Replace the outbound setpoint; the next send uses it.
    pub fn update_command(&self, command: SetpointCommand) {
        self.command.send_replace(command);
    }

    /// Setpoint the command loop will send next.
    pub fn command(&self) -> SetpointCommand {
        *self.command.borrow()
    }

    /// Consistent copy of every observed kind.
    pub fn snapshot(&self) -> SnapshotView {
        self.snapshot.view()
    }

    /// Latest payload of one kind.
    pub fn latest<P: Payload>(&self) -> Option<P> {
        self.snapshot.latest::<P>()
    }

    pub fn entry(&self, kind: MessageKind) -> Option<SnapshotEntry> {
        self.snapshot.entry(kind)
    }

    /// Stream of snapshot views, one per recorded message. Slow consumers skip
    /// intermediate views.
    pub fn snapshot_updates(&self) -> WatchStream<SnapshotView> {
        WatchStream::new(self.snapshot.subscribe())
    }

    /// Latched vehicle identity, once discovered.
    pub fn remote_identity(&self) -> Option<Identity> {
        self.identity.get().copied()
    }

    pub fn status(&self) -> SessionStatus {
        let c = &self.counters;
        SessionStatus {
            reading_active: c.reading_active.load(Ordering::Acquire),
            writing_active: c.writing_active.load(Ordering::Acquire),
            exit_requested: self.cancel.is_cancelled(),
            write_count: c.write_count.load(Ordering::Relaxed),
            write_failures: c.write_failures.load(Ordering::Relaxed),
            frames_received: c.frames_received.load(Ordering::Relaxed),
            frames_ignored: c.frames_ignored.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            read_failures: c.read_failures.load(Ordering::Relaxed),
        }
    }

    /// Token cancelled when the session stops. Cancelling it requests exit.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
