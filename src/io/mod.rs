//! I/O and infrastructure layer.
//!
//! This layer handles external communication.
//!
//! # Contents
//!
//! - [`udp_receiver`]: UDP listener for miner telemetry broadcasts

pub mod udp_receiver;

// Re-export common types
pub use udp_receiver::{MinerUdpReceiver, ReceiverConfig, ReceiverError, TelemetryUpdate};
