//! minerwatch - LAN telemetry monitor for UDP-broadcasting crypto miners
//!
//! Small NMMiner-class devices announce their status by broadcasting a JSON
//! datagram to the local network every update interval. This crate listens
//! for those broadcasts, keeps the latest record per miner, detects when a
//! miner reports a newly found block, and fans both out to any number of
//! consumers without ever blocking the receive path.
//!
//! # Architecture
//!
//! The crate is organized into logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      main                           │  ← Daemon entry point
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   threads/                          │  ← Thread infrastructure
//! │                (coordinator loop)                   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │             engine/          io/                    │  ← Orchestration + ingest
//! │          (coordinator)  (udp_receiver)              │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │            state/          metrics/                 │  ← Shared state + derived values
//! │     (store, listeners)   (extractors)               │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │               (records, events)                     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Data flow
//!
//! Datagram → `MinerUdpReceiver` (decode + validate, own thread) → bounded
//! crossbeam channel → `CoordinatorThread` (merge + block detection, sole
//! writer) → `SharedMinerState` → `SnapshotListeners` / `BlockEventBus`.
//!
//! # Usage
//!
//! ```no_run
//! use minerwatch::{CoordinatorConfig, MinerCoordinator};
//!
//! let mut coordinator = MinerCoordinator::new(CoordinatorConfig::default());
//!
//! coordinator.add_listener(|snapshot| {
//!     println!("{} miners known", snapshot.len());
//! });
//! let blocks = coordinator.subscribe_blocks();
//!
//! coordinator.start().expect("UDP port unavailable");
//! while let Ok(event) = blocks.recv() {
//!     println!("{} found block #{}", event.miner_id, event.valid_blocks);
//! }
//! ```

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Shared state and fan-out (depends on core)
// ============================================================================
pub mod state;

// ============================================================================
// Layer 3: Derived metrics (depends on core)
// ============================================================================
pub mod metrics;

// ============================================================================
// Layer 4: I/O infrastructure (depends on core)
// ============================================================================
pub mod io;

// ============================================================================
// Layer 5: Orchestration engine (depends on core, state, io)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 6: Thread infrastructure (depends on engine, io)
// ============================================================================
pub mod threads;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::types::{
    BlockFoundEvent, FieldValue, MinerId, MinerRecord, MinerSnapshot, BLOCK_FOUND_EVENT,
};

// State
pub use state::{
    create_shared_state, BlockEventBus, IngestStats, ListenerHandle, SharedMinerState,
    SharedStateHandle, SnapshotListeners,
};

// Metrics
pub use metrics::{
    best_difficulty, board_info, firmware_version, hash_rate_hs, parse_hash_rate, parse_share,
    pool_difficulties, pool_in_use, progress_percent, share_stats, temperature_c, uptime,
    wifi_rssi_dbm, BoardInfo, PoolDifficulties, ShareStats,
};

// I/O
pub use io::udp_receiver::{MinerUdpReceiver, ReceiverConfig, ReceiverError, TelemetryUpdate};

// Engine
pub use engine::coordinator::{CoordinatorConfig, CoordinatorCore, MinerCoordinator};

// Threads
pub use threads::{CoordinatorThread, CoordinatorThreadConfig};
