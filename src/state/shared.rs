//! Thread-safe shared miner state.
//!
//! This module provides `SharedMinerState` which is shared between:
//! - Coordinator Thread: Sole writer (applies telemetry updates)
//! - Snapshot consumers: Readers (listeners, snapshot queries, daemon status)
//!
//! Access pattern: exactly one writer path serializes all mutation through
//! the coordinator; readers take the lock briefly to clone a snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::core::types::{MinerId, MinerRecord, MinerSnapshot};

/// Counters describing ingest activity since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Telemetry updates applied to the store.
    pub total_updates: u64,
    /// Block-found transitions detected.
    pub blocks_found: u64,
}

/// Mutable miner state behind the coordinator.
///
/// Entries are inserted or replaced per valid update and never removed; a
/// miner that stops broadcasting keeps its last record indefinitely.
#[derive(Debug, Default)]
pub struct SharedMinerState {
    /// Latest record per miner.
    pub miners: HashMap<MinerId, MinerRecord>,
    /// Ingest counters.
    pub stats: IngestStats,
}

impl SharedMinerState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored record for `miner_id` with `record`.
    ///
    /// Returns the previous record, if any. Full replacement: fields from
    /// the previous record are never merged into the new one.
    pub fn replace(&mut self, miner_id: MinerId, record: MinerRecord) -> Option<MinerRecord> {
        self.stats.total_updates += 1;
        self.miners.insert(miner_id, record)
    }

    /// Clone the current miner map into an immutable snapshot.
    pub fn snapshot(&self) -> MinerSnapshot {
        Arc::new(self.miners.clone())
    }

    /// Number of miners seen so far.
    pub fn miner_count(&self) -> usize {
        self.miners.len()
    }
}

/// Handle type for shared miner state (`Arc<RwLock<SharedMinerState>>`).
pub type SharedStateHandle = Arc<RwLock<SharedMinerState>>;

/// Create a new shared state wrapped in `Arc<RwLock>`.
pub fn create_shared_state() -> SharedStateHandle {
    Arc::new(RwLock::new(SharedMinerState::new()))
}
