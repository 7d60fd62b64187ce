//! Listener registry: the engine's collection of cancellables.
//!
//! Every wait on participant input attaches exactly one listener here and
//! detaches it when done. `cancel_all` removes them all at once, bumps the
//! cancellation epoch and wakes the pending wait, which then fails with
//! `Error::Cancelled`. A wait that started under an older epoch fails too,
//! so a cancel that lands between two waits is not lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Click,
    Hover,
    Key,
    Button,
}

#[derive(Debug, Clone, Copy)]
struct Attached {
    kind: ListenerKind,
    since: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct Listeners {
    attached: Mutex<HashMap<ListenerId, Attached>>,
    next_id: AtomicU64,
    epoch: AtomicU64,
    cancelled: Notify,
}

impl Listeners {
    pub(crate) fn attach(&self, kind: ListenerKind) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.attached.lock().insert(id, Attached { kind, since: Instant::now() });
        id
    }

    /// Returns false if the listener was already gone.
    pub(crate) fn detach(&self, id: ListenerId) -> bool {
        self.attached.lock().remove(&id).is_some()
    }

    pub(crate) fn is_attached(&self, id: ListenerId) -> bool {
        self.attached.lock().contains_key(&id)
    }

    /// Whether `id` was listening when an event stamped `at` happened.
    pub(crate) fn heard(&self, id: ListenerId, at: Instant) -> bool {
        self.attached.lock().get(&id).is_some_and(|a| a.since <= at)
    }

    /// Whether any listener of `kind` was listening at `at`.
    pub(crate) fn any_heard(&self, kind: ListenerKind, at: Instant) -> bool {
        self.attached.lock().values().any(|a| a.kind == kind && a.since <= at)
    }

    pub(crate) fn len(&self) -> usize {
        self.attached.lock().len()
    }

    /// Number of `cancel_all` calls so far.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn cancelled(&self) -> Notified<'_> {
        self.cancelled.notified()
    }

    /// Remove every listener and wake the pending wait. Returns how many
    /// were removed.
    pub(crate) fn cancel_all(&self) -> usize {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let removed = {
            let mut attached = self.attached.lock();
            let n = attached.len();
            attached.clear();
            n
        };
        debug!(removed, "listeners cancelled");
        self.cancelled.notify_waiters();
        removed
    }
}

/// Cancels an engine's pending input waits from outside its task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    pub(crate) listeners: Arc<Listeners>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.listeners.cancel_all();
    }

    /// Listeners currently attached.
    pub fn pending(&self) -> usize {
        self.listeners.len()
    }
}
