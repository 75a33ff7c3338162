//! State management for the multi-threaded telemetry daemon.
//!
//! This module provides:
//! - `SharedStateHandle`: Thread-safe miner state shared between the
//!   coordinator thread (writer) and snapshot consumers (readers)
//! - `SnapshotListeners`: Registry of state-change callbacks
//! - `BlockEventBus`: Broadcast channel for block-found events

mod listeners;
mod shared;

pub use listeners::{
    BlockEventBus, ListenerHandle, SnapshotCallback, SnapshotListeners, EVENT_CHANNEL_CAPACITY,
};
pub use shared::{create_shared_state, IngestStats, SharedMinerState, SharedStateHandle};
