//! Command loop: stream the current setpoint at the keep-alive rate

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{FailureStreak, SessionCounters};
use crate::codec::{Codec, Route};
use crate::transport::Transport;
use crate::types::{Identity, SetpointCommand};

pub(crate) struct CommandLoop {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) command: Arc<watch::Sender<SetpointCommand>>,
    pub(crate) counters: Arc<SessionCounters>,
    pub(crate) cancel: CancellationToken,
    pub(crate) period: Duration,
    pub(crate) source: Identity,
    pub(crate) target: Identity,
}

impl CommandLoop {
    /// Send the current setpoint once per period until cancelled.
    ///
    /// Sends are scheduled on a fixed interval measured from the previous tick,
    /// so slow encoding or writing shortens the following wait instead of
    /// stretching the gap. `ready` fires after the first send attempt.
    pub(crate) async fn run(self, ready: oneshot::Sender<()>) {
        self.command.send_replace(SetpointCommand::neutral());
        self.counters.writing_active.store(true, Ordering::Release);
        info!(
            target_system = self.target.system_id,
            target_component = self.target.component_id,
            period_ms = self.period.as_millis() as u64,
            "Command loop started"
        );

        let mut ready = Some(ready);
        let mut sequence = 0u8;
        let mut failures = FailureStreak::new("setpoint send");
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let command = *self.command.borrow();
            let route = Route { sequence, source: self.source, target: self.target };
            sequence = sequence.wrapping_add(1);

            let sent = match self.codec.encode(&command, route) {
                Ok(frame) => self.transport.write_frame(&frame).await,
                Err(e) => Err(e),
            };
            match sent {
                Ok(_) => {
                    self.counters.write_count.fetch_add(1, Ordering::Relaxed);
                    failures.success();
                }
                Err(e) => {
                    self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                    failures.failure(&e);
                }
            }

            if let Some(ready) = ready.take() {
                let _ = ready.send(());
            }
        }

        self.counters.writing_active.store(false, Ordering::Release);
        debug!(
            writes = self.counters.write_count.load(Ordering::Relaxed),
            "Command loop stopped"
        );
    }
}
