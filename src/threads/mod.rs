//! Thread management for the telemetry daemon.
//!
//! This module provides the coordinator thread:
//! - `CoordinatorThread`: Consumes decoded updates from the UDP receiver
//!   channel and drives the serialized update path

mod coordinator_thread;

pub use coordinator_thread::{CoordinatorThread, CoordinatorThreadConfig};
