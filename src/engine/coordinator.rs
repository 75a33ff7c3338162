//! Update coordination: merge telemetry, detect block finds, fan out.
//!
//! `CoordinatorCore` holds the serialized update path: every decoded
//! datagram flows through [`CoordinatorCore::apply_update`] on the
//! coordinator thread, which is the store's only writer. `MinerCoordinator`
//! is the owning facade: it binds the receiver, spawns the threads, and
//! tears everything down again.
//!
//! One coordinator instance per configured port, owned by whoever starts
//! it; there is no process-wide registry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::core::types::{BlockFoundEvent, MinerSnapshot};
use crate::io::udp_receiver::{
    MinerUdpReceiver, ReceiverConfig, ReceiverError, TelemetryUpdate,
};
use crate::state::{
    create_shared_state, BlockEventBus, IngestStats, ListenerHandle, SharedStateHandle,
    SnapshotListeners,
};
use crate::threads::{CoordinatorThread, CoordinatorThreadConfig};

/// Configuration for a coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Interface address to bind (e.g., "0.0.0.0").
    pub bind_addr: String,
    /// UDP port miners broadcast to. Port 0 binds an ephemeral port.
    pub port: u16,
    /// Interval between snapshot re-deliveries when no updates arrive.
    pub refresh_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 37778,
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl CoordinatorConfig {
    fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            bind_addr: format!("{}:{}", self.bind_addr, self.port),
        }
    }
}

/// The serialized update path plus its fan-out surfaces.
///
/// Cloning is cheap (all members are shared handles); the coordinator
/// thread, the facade, and tests all operate on clones of the same core.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorCore {
    state: SharedStateHandle,
    listeners: Arc<SnapshotListeners>,
    events: Arc<BlockEventBus>,
}

impl CoordinatorCore {
    /// Create a core with an empty store and no consumers.
    pub fn new() -> Self {
        Self {
            state: create_shared_state(),
            listeners: Arc::new(SnapshotListeners::new()),
            events: Arc::new(BlockEventBus::new()),
        }
    }

    /// Apply one telemetry update.
    ///
    /// Looks up the previous record, detects the block-found transition,
    /// replaces the stored record, and notifies every consumer with the new
    /// full snapshot. Block detection requires a strictly prior record with
    /// a strictly lower count: a miner's first sighting never fires, even
    /// when its initial `Valid` is nonzero.
    pub fn apply_update(&self, update: TelemetryUpdate) {
        let TelemetryUpdate { miner_id, record } = update;

        let (event, snapshot) = {
            let mut state = match self.state.write() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };

            let event = state.miners.get(&miner_id).and_then(|previous| {
                let old_valid = previous.valid_blocks();
                let new_valid = record.valid_blocks();
                if new_valid > old_valid {
                    Some(BlockFoundEvent::from_record(&miner_id, &record))
                } else {
                    None
                }
            });

            state.replace(miner_id, record);
            if event.is_some() {
                state.stats.blocks_found += 1;
            }

            (event, state.snapshot())
        };

        if let Some(event) = event {
            log::info!(
                "Block found on miner {}! Valid blocks: {}",
                event.miner_id,
                event.valid_blocks
            );
            self.events.publish(&event);
        }

        self.listeners.notify(&snapshot);
    }

    /// Re-deliver the current snapshot without applying anything.
    ///
    /// Backs the periodic refresh tick; performs no network I/O.
    pub fn publish_snapshot(&self) {
        self.listeners.notify(&self.snapshot());
    }

    /// Immutable view of the current store.
    pub fn snapshot(&self) -> MinerSnapshot {
        match self.state.read() {
            Ok(state) => state.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        }
    }

    /// Ingest counters since startup.
    pub fn stats(&self) -> IngestStats {
        match self.state.read() {
            Ok(state) => state.stats,
            Err(poisoned) => poisoned.into_inner().stats,
        }
    }

    /// Register a state-change listener.
    pub fn add_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&MinerSnapshot) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    /// Deregister a state-change listener.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.remove(handle)
    }

    /// Subscribe to block-found events.
    pub fn subscribe_blocks(&self) -> Receiver<BlockFoundEvent> {
        self.events.subscribe()
    }
}

/// Handles for the spawned worker threads.
struct Workers {
    receiver: JoinHandle<()>,
    coordinator: CoordinatorThread,
    local_addr: SocketAddr,
}

/// Owning facade over the receiver and coordinator threads.
///
/// `stop` is idempotent and also runs on drop, so a coordinator going out of
/// scope releases its socket deterministically.
pub struct MinerCoordinator {
    config: CoordinatorConfig,
    core: CoordinatorCore,
    running: Arc<AtomicBool>,
    workers: Option<Workers>,
}

impl MinerCoordinator {
    /// Create a stopped coordinator.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            core: CoordinatorCore::new(),
            running: Arc::new(AtomicBool::new(false)),
            workers: None,
        }
    }

    /// Bind the UDP listener and spawn the worker threads.
    ///
    /// A port conflict or permission failure propagates as
    /// [`ReceiverError::Bind`]; the caller decides whether to abort or try a
    /// different port. Calling `start` while already running is a no-op.
    pub fn start(&mut self) -> Result<(), ReceiverError> {
        if self.workers.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::Relaxed);

        let (receiver, update_rx) =
            MinerUdpReceiver::new(self.config.receiver_config(), self.running.clone())?;
        let local_addr = receiver.local_addr();

        let receiver_handle = thread::Builder::new()
            .name("udp-receiver".into())
            .spawn(move || receiver.run())
            .expect("Failed to spawn UDP receiver thread");

        let coordinator = CoordinatorThread::spawn(
            self.core.clone(),
            update_rx,
            CoordinatorThreadConfig {
                refresh_interval: self.config.refresh_interval,
            },
            self.running.clone(),
        );

        self.workers = Some(Workers {
            receiver: receiver_handle,
            coordinator,
            local_addr,
        });

        log::info!("Miner telemetry listener started on {}", local_addr);
        Ok(())
    }

    /// Stop the worker threads and release the socket.
    ///
    /// Safe to call when never started and safe to call twice. In-flight
    /// handoffs may be dropped; the socket is released once the receiver
    /// thread notices the flag (bounded by its 100 ms read timeout).
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);

        if let Some(workers) = self.workers.take() {
            workers.receiver.join().ok();
            workers.coordinator.join().ok();
            log::info!("Miner telemetry listener stopped");
        }
    }

    /// Whether the worker threads are running.
    pub fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    /// The address the listener bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.workers.as_ref().map(|w| w.local_addr)
    }

    /// Shared access to the update path and fan-out surfaces.
    pub fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    /// Apply one telemetry update through the serialized path.
    ///
    /// The daemon wiring feeds this from the coordinator thread; callers
    /// with records from another source (tests, replay tooling) go through
    /// the same store lock and fan-out.
    pub fn process_update(&self, update: TelemetryUpdate) {
        self.core.apply_update(update);
    }

    /// Immutable view of the current store.
    pub fn snapshot(&self) -> MinerSnapshot {
        self.core.snapshot()
    }

    /// Register a state-change listener.
    pub fn add_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&MinerSnapshot) + Send + Sync + 'static,
    {
        self.core.add_listener(callback)
    }

    /// Deregister a state-change listener.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.core.remove_listener(handle)
    }

    /// Subscribe to block-found events.
    pub fn subscribe_blocks(&self) -> Receiver<BlockFoundEvent> {
        self.core.subscribe_blocks()
    }
}

impl Drop for MinerCoordinator {
    fn drop(&mut self) {
        // Deterministic shutdown: stop workers and join threads.
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MinerRecord;
    use std::sync::atomic::AtomicUsize;

    fn update(miner_id: &str, fields: &[(&str, i64)]) -> TelemetryUpdate {
        let mut record = MinerRecord::new();
        for (key, value) in fields {
            record.insert(*key, *value);
        }
        TelemetryUpdate {
            miner_id: miner_id.to_string(),
            record,
        }
    }

    #[test]
    fn test_update_replaces_record_in_snapshot() {
        let core = CoordinatorCore::new();
        core.apply_update(update("192.168.1.50", &[("Valid", 1), ("Temp", 60)]));
        core.apply_update(update("192.168.1.50", &[("Valid", 1)]));

        let snapshot = core.snapshot();
        let record = &snapshot["192.168.1.50"];
        assert_eq!(record.valid_blocks(), 1);
        // Full replacement: the Temp field from the first report is gone.
        assert_eq!(record.num_field("Temp"), None);
        assert_eq!(core.stats().total_updates, 2);
    }

    #[test]
    fn test_first_sighting_with_nonzero_valid_fires_no_event() {
        // A naive `new_valid > old_valid` against a defaulted 0 would fire
        // here. Detection deliberately requires a prior record, so a miner
        // discovered mid-life (or after a listener restart) is not reported
        // as having just found a block.
        let core = CoordinatorCore::new();
        let events = core.subscribe_blocks();

        core.apply_update(update("10.0.0.1", &[("Valid", 5)]));

        assert!(events.try_recv().is_err());
        assert_eq!(core.snapshot()["10.0.0.1"].valid_blocks(), 5);
        assert_eq!(core.stats().blocks_found, 0);
    }

    #[test]
    fn test_increase_fires_exactly_one_event() {
        let core = CoordinatorCore::new();
        let events = core.subscribe_blocks();

        core.apply_update(update("10.0.0.1", &[("Valid", 5)]));
        core.apply_update(update("10.0.0.1", &[("Valid", 7)]));

        let event = events.try_recv().unwrap();
        assert_eq!(event.miner_id, "10.0.0.1");
        assert_eq!(event.valid_blocks, 7);
        assert!(events.try_recv().is_err());
        assert_eq!(core.stats().blocks_found, 1);
    }

    #[test]
    fn test_unchanged_or_decreased_count_fires_nothing_but_replaces() {
        let core = CoordinatorCore::new();
        let events = core.subscribe_blocks();

        core.apply_update(update("10.0.0.1", &[("Valid", 7)]));
        core.apply_update(update("10.0.0.1", &[("Valid", 7), ("Temp", 61)]));
        assert!(events.try_recv().is_err());
        assert_eq!(core.snapshot()["10.0.0.1"].num_field("Temp"), Some(61.0));

        // Firmware reset: the counter goes backwards, the record still lands.
        core.apply_update(update("10.0.0.1", &[("Valid", 3)]));
        assert!(events.try_recv().is_err());
        assert_eq!(core.snapshot()["10.0.0.1"].valid_blocks(), 3);
        assert_eq!(core.stats().blocks_found, 0);
    }

    #[test]
    fn test_block_event_carries_fields_from_new_record() {
        let core = CoordinatorCore::new();
        let events = core.subscribe_blocks();

        let mut first = MinerRecord::new();
        first.insert("Valid", 1i64);
        first.insert("HashRate", "55.2MH/s");
        first.insert("BestDiff", "12.3M");
        core.apply_update(TelemetryUpdate {
            miner_id: "192.168.1.50".to_string(),
            record: first,
        });
        assert!(events.try_recv().is_err());

        let mut second = MinerRecord::new();
        second.insert("Valid", 2i64);
        second.insert("HashRate", "55.0MH/s");
        second.insert("BestDiff", "15.1M");
        core.apply_update(TelemetryUpdate {
            miner_id: "192.168.1.50".to_string(),
            record: second.clone(),
        });

        let event = events.try_recv().unwrap();
        assert_eq!(event.valid_blocks, 2);
        assert_eq!(event.best_diff.as_deref(), Some("15.1M"));
        assert_eq!(event.hashrate.as_deref(), Some("55.0MH/s"));
        assert_eq!(core.snapshot()["192.168.1.50"], second);
    }

    #[test]
    fn test_counts_are_tracked_per_miner() {
        let core = CoordinatorCore::new();
        let events = core.subscribe_blocks();

        core.apply_update(update("10.0.0.1", &[("Valid", 5)]));
        // A different miner at a lower count must not look like a reset,
        // and its own later increase must fire independently.
        core.apply_update(update("10.0.0.2", &[("Valid", 1)]));
        assert!(events.try_recv().is_err());

        core.apply_update(update("10.0.0.2", &[("Valid", 2)]));
        let event = events.try_recv().unwrap();
        assert_eq!(event.miner_id, "10.0.0.2");
        assert_eq!(core.snapshot().len(), 2);
    }

    #[test]
    fn test_every_update_notifies_listeners_with_full_snapshot() {
        let core = CoordinatorCore::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        core.add_listener(move |snapshot| {
            counter.store(snapshot.len(), Ordering::SeqCst);
        });

        core.apply_update(update("10.0.0.1", &[("Valid", 1)]));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        core.apply_update(update("10.0.0.2", &[("Valid", 1)]));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_publish_snapshot_redelivers_without_mutation() {
        let core = CoordinatorCore::new();
        core.apply_update(update("10.0.0.1", &[("Valid", 1)]));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        core.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        core.publish_snapshot();
        core.publish_snapshot();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(core.stats().total_updates, 1);
    }

    #[test]
    fn test_stop_without_start_is_a_noop() {
        let mut coordinator = MinerCoordinator::new(CoordinatorConfig::default());
        coordinator.stop();
        coordinator.stop();
        assert!(!coordinator.is_running());
    }
}
