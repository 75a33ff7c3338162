//! UDP receiver for miner telemetry broadcasts.
//!
//! Receives fire-and-forget JSON datagrams from miners on the local network
//! and forwards decoded records to the coordinator via a crossbeam channel.
//!
//! # Wire Protocol
//!
//! One datagram per miner update: a UTF-8 encoded JSON object, no framing,
//! no acknowledgment. The miner's `IP` field keys the record when present;
//! the datagram source address is the fallback key.
//!
//! ```json
//! {"IP":"192.168.1.50","Valid":2,"HashRate":"55.0MH/s","BestDiff":"15.1M"}
//! ```
//!
//! Malformed datagrams are dropped with a diagnostic log; broadcasts repeat
//! every update interval, so loss is self-healing. Nothing is ever sent back
//! to a miner.
//!
//! # Example
//!
//! ```ignore
//! use minerwatch::io::udp_receiver::{MinerUdpReceiver, ReceiverConfig};
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! let config = ReceiverConfig {
//!     bind_addr: "0.0.0.0:37778".to_string(),
//! };
//! let running = Arc::new(AtomicBool::new(true));
//! let (receiver, update_rx) = MinerUdpReceiver::new(config, running)?;
//!
//! // Spawn receiver thread
//! std::thread::spawn(move || receiver.run());
//!
//! // Process updates in another thread
//! while let Ok(update) = update_rx.recv() {
//!     println!("Got update from {}", update.miner_id);
//! }
//! ```

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use serde_json::Value;
use thiserror::Error;

use crate::core::types::{MinerId, MinerRecord};

/// Receiver errors
#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("failed to bind UDP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReceiverError>;

/// Configuration for the UDP receiver.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Address to bind the UDP socket (e.g., "0.0.0.0:37778").
    pub bind_addr: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:37778".to_string(),
        }
    }
}

/// One decoded datagram: a complete record keyed by its miner.
///
/// The channel carries whole updates only; a consumer never observes a
/// partially decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryUpdate {
    /// Identifier derived from the payload `IP` field or the source address.
    pub miner_id: MinerId,
    /// The full replacement record.
    pub record: MinerRecord,
}

/// Channel capacity for decoded updates (small; broadcasts repeat, so
/// dropping under pressure only delays data by one interval).
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Maximum UDP datagram size.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// UDP receiver for miner telemetry.
pub struct MinerUdpReceiver {
    socket: UdpSocket,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    update_tx: Sender<TelemetryUpdate>,
}

impl MinerUdpReceiver {
    /// Create a new UDP receiver.
    ///
    /// Binds the socket immediately; a port conflict or permission problem
    /// surfaces here as [`ReceiverError::Bind`] and is never retried.
    /// Returns the receiver and the channel for decoded updates.
    pub fn new(
        config: ReceiverConfig,
        running: Arc<AtomicBool>,
    ) -> Result<(Self, Receiver<TelemetryUpdate>)> {
        let socket = UdpSocket::bind(&config.bind_addr).map_err(|source| ReceiverError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;
        let local_addr = socket.local_addr()?;

        // Short timeout so the loop can notice the running flag clearing
        socket.set_read_timeout(Some(Duration::from_millis(100)))?;

        let (update_tx, update_rx) = bounded(UPDATE_CHANNEL_CAPACITY);

        log::info!("UDP receiver bound to {}", local_addr);

        Ok((
            Self {
                socket,
                local_addr,
                running,
                update_tx,
            },
            update_rx,
        ))
    }

    /// The address the socket actually bound (resolves port 0 requests).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the receiver loop (blocking).
    ///
    /// Receives datagrams, decodes them, and forwards updates on the channel
    /// until the running flag clears. A failure while handling one datagram
    /// is logged and never terminates the loop.
    pub fn run(self) {
        log::info!("UDP receiver started");

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        while self.running.load(Ordering::Relaxed) {
            let (len, src) = match self.socket.recv_from(&mut buffer) {
                Ok(result) => result,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::error!("UDP recv error: {}", e);
                    continue;
                }
            };

            if let Some(update) = decode_datagram(&buffer[..len], src) {
                // Non-blocking send - drop if channel full (broadcast repeats)
                self.update_tx.try_send(update).ok();
            }
        }

        log::info!("UDP receiver stopped");
    }
}

/// Decode one datagram into a telemetry update.
///
/// Returns `None` (with a diagnostic log) for anything that is not a UTF-8
/// JSON object yielding a non-empty miner identifier.
pub fn decode_datagram(payload: &[u8], src: SocketAddr) -> Option<TelemetryUpdate> {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(_) => {
            log::debug!("Dropping non-UTF-8 datagram from {}", src);
            return None;
        }
    };

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("Failed to decode JSON from {}: {}", src, e);
            return None;
        }
    };

    let object = match value.as_object() {
        Some(object) => object,
        None => {
            log::debug!("Dropping non-object JSON datagram from {}", src);
            return None;
        }
    };

    let (record, skipped) = MinerRecord::from_json_object(object);
    if skipped > 0 {
        log::debug!("Skipped {} non-scalar fields from {}", skipped, src);
    }

    // Key by the self-reported address, falling back to the source address
    let miner_id = match record.self_reported_ip() {
        Some(ip) => ip.to_string(),
        None => src.ip().to_string(),
    };
    if miner_id.is_empty() {
        log::debug!("Dropping datagram without an identifier from {}", src);
        return None;
    }

    Some(TelemetryUpdate { miner_id, record })
}
