//! Ingest loop: transport frames into the snapshot

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{FailureStreak, SessionCounters};
use crate::codec::Codec;
use crate::snapshot::Snapshot;
use crate::transport::Transport;

pub(crate) struct IngestLoop {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) snapshot: Snapshot,
    pub(crate) counters: Arc<SessionCounters>,
    pub(crate) cancel: CancellationToken,
    pub(crate) idle_sleep: Duration,
}

impl IngestLoop {
    /// Read, decode and record until cancelled. Read and decode failures drop
    /// the frame; they never end the loop.
    pub(crate) async fn run(self) {
        self.counters.reading_active.store(true, Ordering::Release);
        info!(transport = %self.transport.kind(), "Ingest loop started");

        let mut read_failures = FailureStreak::new("transport read");
        let mut decode_failures = FailureStreak::new("frame decode");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.transport.read_frame() => result,
            };

            match result {
                Ok(Some(frame)) => {
                    read_failures.success();
                    self.counters.frames_received.fetch_add(1, Ordering::Relaxed);

                    match self.codec.decode(&frame) {
                        Ok(Some(telemetry)) => {
                            decode_failures.success();
                            trace!(
                                kind = %telemetry.kind(),
                                system_id = telemetry.sender.system_id,
                                component_id = telemetry.sender.component_id,
                                "Telemetry received"
                            );
                            self.snapshot.record(telemetry);
                        }
                        Ok(None) => {
                            self.counters.frames_ignored.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                            decode_failures.failure(&e);
                        }
                    }
                }
                Ok(None) => self.idle().await,
                Err(e) => {
                    self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                    read_failures.failure(&e);
                    self.idle().await;
                }
            }
        }

        self.counters.reading_active.store(false, Ordering::Release);
        debug!(
            frames = self.counters.frames_received.load(Ordering::Relaxed),
            "Ingest loop stopped"
        );
    }

    async fn idle(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.idle_sleep) => {}
        }
    }
}
