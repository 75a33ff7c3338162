//! Listener registry and block-event fan-out.
//!
//! Two independent notification channels:
//! - `SnapshotListeners`: callbacks invoked synchronously with the full
//!   current snapshot after every applied update
//! - `BlockEventBus`: broadcast-style channel for block-found events with
//!   fire-and-observe semantics (no backlog for slow or absent subscribers)

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::core::types::{BlockFoundEvent, MinerSnapshot};

/// Per-subscriber buffer for block-found events.
///
/// Small on purpose: a subscriber that stops draining loses events rather
/// than accumulating a backlog.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Callback invoked with the full snapshot after each state change.
///
/// Callbacks run on the coordinator thread and must be fast: read or copy
/// state, hand off to a channel, but never perform blocking I/O.
pub type SnapshotCallback = Arc<dyn Fn(&MinerSnapshot) + Send + Sync>;

/// Handle returned by [`SnapshotListeners::add`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Registry of state-change listeners.
///
/// Registration and removal are safe to perform concurrently with delivery:
/// `notify` iterates over a snapshot of the registry taken under the lock,
/// then invokes callbacks with the lock released, so a callback may register
/// further listeners without deadlocking. Listeners added mid-notification
/// receive the next notification, not the current one.
#[derive(Default)]
pub struct SnapshotListeners {
    entries: Mutex<Vec<(u64, SnapshotCallback)>>,
    next_id: AtomicU64,
}

impl SnapshotListeners {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; the returned handle removes it again.
    pub fn add<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&MinerSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((id, Arc::new(callback)));
        }
        ListenerHandle(id)
    }

    /// Remove a previously registered callback.
    ///
    /// Returns `false` if the handle was already removed.
    pub fn remove(&self, handle: ListenerHandle) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|(id, _)| *id != handle.0);
                entries.len() != before
            }
            Err(_) => false,
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every registered callback with `snapshot`.
    ///
    /// A panicking listener is logged and skipped; remaining listeners are
    /// still notified. One misbehaving consumer must not break ingestion.
    pub fn notify(&self, snapshot: &MinerSnapshot) {
        let current: Vec<(u64, SnapshotCallback)> = match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => return,
        };

        for (id, callback) in current {
            if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                log::error!("Snapshot listener {} panicked; continuing", id);
            }
        }
    }
}

impl std::fmt::Debug for SnapshotListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotListeners")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Broadcast bus for [`BlockFoundEvent`]s.
///
/// Every subscriber gets its own bounded channel. Delivery is best-effort:
/// a full channel drops the event for that subscriber, and subscribers whose
/// receiver was dropped are pruned on the next publish.
#[derive(Default)]
pub struct BlockEventBus {
    subscribers: Mutex<Vec<Sender<BlockFoundEvent>>>,
}

impl BlockEventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to block-found events.
    pub fn subscribe(&self) -> Receiver<BlockFoundEvent> {
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Number of live subscribers (as of the last publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Publish an event to every subscriber.
    pub fn publish(&self, event: &BlockFoundEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(subscribers) => subscribers,
            Err(_) => return,
        };

        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            // Subscriber is not draining; drop the event, keep the channel.
            Err(TrySendError::Full(_)) => {
                log::debug!(
                    "Block event for {} dropped for a slow subscriber",
                    event.miner_id
                );
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl std::fmt::Debug for BlockEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
