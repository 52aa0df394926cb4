//! Latest-value telemetry cache
//!
//! The ingest loop is the only writer. Each update replaces one kind's entry
//! inside a single `watch::Sender::send_modify`, so readers never observe a
//! payload paired with another observation's timestamp. Readers either clone
//! a [`SnapshotView`] or subscribe to change notifications.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::codec::Telemetry;
use crate::types::{Identity, MessageKind, Payload, TelemetryMessage};

/// Most recent observation of one message kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub message: TelemetryMessage,
    /// Arrival time; never decreases for a given kind
    pub observed_at: Instant,
    pub sender: Identity,
    /// Observations of this kind so far
    pub count: u64,
}

/// Consistent copy of the snapshot at one instant.
///
/// A kind is present once it has been observed at least once; it never becomes
/// absent again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotView {
    entries: BTreeMap<MessageKind, SnapshotEntry>,
    first_sender: Option<Identity>,
    revision: u64,
}

impl SnapshotView {
    /// Typed payload of a kind, if observed.
    ///
    /// ```rust
    /// use mavbridge::snapshot::SnapshotView;
    /// use mavbridge::types::Attitude;
    ///
    /// let view = SnapshotView::default();
    /// assert!(view.get::<Attitude>().is_none());
    /// ```
    pub fn get<P: Payload>(&self) -> Option<P> {
        self.entries.get(&P::KIND).and_then(|entry| P::from_message(&entry.message))
    }

    pub fn entry(&self, kind: MessageKind) -> Option<&SnapshotEntry> {
        self.entries.get(&kind)
    }

    pub fn is_present(&self, kind: MessageKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Observed kinds, in message id order.
    pub fn kinds(&self) -> impl Iterator<Item = MessageKind> + '_ {
        self.entries.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&MessageKind, &SnapshotEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sender of the very first recorded message.
    pub fn first_sender(&self) -> Option<Identity> {
        self.first_sender
    }

    /// Total updates applied; increases by one per recorded message.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn apply(&mut self, telemetry: Telemetry, at: Instant) {
        let kind = telemetry.kind();
        self.first_sender.get_or_insert(telemetry.sender);
        self.revision += 1;

        match self.entries.get_mut(&kind) {
            Some(entry) => {
                entry.message = telemetry.message;
                entry.observed_at = entry.observed_at.max(at);
                entry.sender = telemetry.sender;
                entry.count += 1;
            }
            None => {
                self.entries.insert(
                    kind,
                    SnapshotEntry {
                        message: telemetry.message,
                        observed_at: at,
                        sender: telemetry.sender,
                        count: 1,
                    },
                );
            }
        }
    }
}

/// Writer side of the snapshot. Clones share the same cache.
#[derive(Debug, Clone)]
pub struct Snapshot {
    tx: Arc<watch::Sender<SnapshotView>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SnapshotView::default());
        Self { tx: Arc::new(tx) }
    }

    /// Record a decoded message as observed now.
    pub fn record(&self, telemetry: Telemetry) {
        self.record_at(telemetry, Instant::now());
    }

    /// Record a decoded message observed at `at`. An earlier `at` than the
    /// kind's current timestamp keeps the current timestamp.
    pub fn record_at(&self, telemetry: Telemetry, at: Instant) {
        self.tx.send_modify(|view| view.apply(telemetry, at));
    }

    /// Clone of the current contents.
    pub fn view(&self) -> SnapshotView {
        self.tx.borrow().clone()
    }

    /// Typed payload of one kind without cloning the whole view.
    pub fn latest<P: Payload>(&self) -> Option<P> {
        self.tx.borrow().get::<P>()
    }

    pub fn entry(&self, kind: MessageKind) -> Option<SnapshotEntry> {
        self.tx.borrow().entry(kind).cloned()
    }

    /// Receiver notified after every recorded message.
    pub fn subscribe(&self) -> watch::Receiver<SnapshotView> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attitude, Heartbeat};
    use proptest::prelude::*;
    use std::time::Duration;

    fn telemetry(message: impl Into<TelemetryMessage>, sender: Identity) -> Telemetry {
        Telemetry { sender, sequence: 0, message: message.into() }
    }

    #[test]
    fn kinds_become_present_and_stay_present() {
        let snapshot = Snapshot::new();
        assert!(snapshot.view().is_empty());
        assert!(!snapshot.view().is_present(MessageKind::Heartbeat));

        snapshot.record(telemetry(Heartbeat::default(), Identity::new(42, 7)));
        snapshot.record(telemetry(Attitude { roll: 0.2, ..Default::default() }, Identity::new(42, 1)));
        snapshot.record(telemetry(Attitude { roll: 0.3, ..Default::default() }, Identity::new(42, 1)));

        let view = snapshot.view();
        assert!(view.is_present(MessageKind::Heartbeat));
        assert_eq!(view.get::<Attitude>().map(|a| a.roll), Some(0.3));
        assert_eq!(view.entry(MessageKind::Attitude).map(|e| e.count), Some(2));
        assert_eq!(view.first_sender(), Some(Identity::new(42, 7)));
        assert_eq!(view.revision(), 3);
        assert_eq!(
            view.kinds().collect::<Vec<_>>(),
            vec![MessageKind::Heartbeat, MessageKind::Attitude]
        );
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let snapshot = Snapshot::new();
        let mut rx = snapshot.subscribe();

        snapshot.record(telemetry(Heartbeat::default(), Identity::new(1, 1)));

        rx.changed().await.expect("sender alive");
        assert!(rx.borrow_and_update().is_present(MessageKind::Heartbeat));
        assert!(snapshot.latest::<Heartbeat>().is_some());
    }

    proptest! {
        #[test]
        fn observed_at_never_decreases(offsets in prop::collection::vec(0u64..10_000, 1..50)) {
            let snapshot = Snapshot::new();
            let base = Instant::now();
            let mut previous = None;

            for (i, offset) in offsets.iter().enumerate() {
                let attitude = Attitude { time_boot_ms: i as u32, ..Default::default() };
                snapshot.record_at(
                    telemetry(attitude, Identity::new(1, 1)),
                    base + Duration::from_millis(*offset),
                );

                let entry = snapshot.entry(MessageKind::Attitude).expect("present");
                prop_assert_eq!(entry.count, i as u64 + 1);
                // Payload always reflects the newest message
                prop_assert_eq!(snapshot.latest::<Attitude>().map(|a| a.time_boot_ms), Some(i as u32));
                if let Some(previous) = previous {
                    prop_assert!(entry.observed_at >= previous);
                }
                previous = Some(entry.observed_at);
            }
        }
    }
}
