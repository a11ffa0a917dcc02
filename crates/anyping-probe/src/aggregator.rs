use crate::lock;
use crate::probe_loop::StatusSink;
use anyping_model::{StatusEntry, StatusSnapshot};
use std::sync::mpsc::{self, Receiver};
use std::sync::Mutex;
use tracing::{debug, trace};

// Returns `false` once it can no longer take deliveries.
type Subscriber = Box<dyn FnMut(StatusSnapshot) -> bool + Send>;

#[derive(Default)]
struct Inner {
    snapshot: StatusSnapshot,
    subscriber: Option<Subscriber>,
    notifications: u64,
}

impl Inner {
    fn notify(&mut self) {
        let Inner {
            snapshot,
            subscriber,
            notifications,
        } = self;
        let Some(deliver) = subscriber.as_mut() else {
            return;
        };
        if deliver(snapshot.clone()) {
            *notifications += 1;
        } else {
            debug!("status subscriber went away, dropping it");
            *subscriber = None;
        }
    }
}

/// Holds the current snapshot and hands a copy to one subscriber on every change.
///
/// The subscriber runs with the aggregator lock held, so deliveries never
/// overlap and are never torn. It must not block and must not call back into
/// the aggregator or into a probe.
#[derive(Default)]
pub struct StatusAggregator {
    inner: Mutex<Inner>,
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, mut subscriber: F)
    where
        F: FnMut(StatusSnapshot) + Send + 'static,
    {
        lock(&self.inner).subscriber = Some(Box::new(move |snapshot: StatusSnapshot| {
            subscriber(snapshot);
            true
        }));
    }

    /// Forwards every delivery into a channel. The first delivery after the
    /// receiver is dropped unsubscribes it.
    pub fn subscribe_channel(&self) -> Receiver<StatusSnapshot> {
        let (tx, rx) = mpsc::channel();
        lock(&self.inner).subscriber =
            Some(Box::new(move |snapshot: StatusSnapshot| tx.send(snapshot).is_ok()));
        rx
    }

    pub fn unsubscribe(&self) {
        lock(&self.inner).subscriber = None;
    }

    /// Replaces the entry with the same identity. Unknown identities are
    /// ignored and an update that leaves the snapshot unchanged is not delivered.
    pub fn on_probe_update(&self, entry: StatusEntry) {
        let mut inner = lock(&self.inner);
        let Some(index) = inner
            .snapshot
            .entries
            .iter()
            .position(|current| current.id == entry.id)
        else {
            trace!(probe = %entry.id, "update for unknown probe ignored");
            return;
        };

        if inner.snapshot.entries[index] == entry {
            return;
        }
        inner.snapshot.entries[index] = entry;
        inner.notify();
    }

    /// Replaces the whole snapshot and always delivers it.
    pub fn rebuild(&self, entries: Vec<StatusEntry>) {
        let mut inner = lock(&self.inner);
        inner.snapshot = StatusSnapshot::from_entries(entries);
        inner.notify();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        lock(&self.inner).snapshot.clone()
    }

    /// Number of snapshots handed to a subscriber so far.
    pub fn notifications(&self) -> u64 {
        lock(&self.inner).notifications
    }
}

impl StatusSink for StatusAggregator {
    fn on_probe_update(&self, entry: StatusEntry) {
        StatusAggregator::on_probe_update(self, entry);
    }
}
