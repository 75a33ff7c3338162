//! Coordinator Thread - serialized telemetry processing.
//!
//! This thread:
//! - Receives decoded updates via a crossbeam channel from the UDP receiver
//! - Applies them one at a time through `CoordinatorCore::apply_update`
//! - Re-delivers the current snapshot on a periodic refresh tick
//!
//! # Communication Architecture
//!
//! Event-driven via `crossbeam_channel::select!`:
//! - Updates are processed immediately on arrival (no fixed rate loop)
//! - The refresh tick only re-publishes the last known snapshot; the push
//!   path is the authoritative data source and the tick does no network I/O
//! - A short `default` timeout lets the loop notice the running flag
//!
//! All store mutation happens on this thread, which keeps per-miner record
//! replacement atomic from every reader's perspective.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};

use crate::engine::coordinator::CoordinatorCore;
use crate::io::udp_receiver::TelemetryUpdate;

/// Configuration for the coordinator thread.
#[derive(Debug, Clone)]
pub struct CoordinatorThreadConfig {
    /// Interval between snapshot re-deliveries when no updates arrive.
    pub refresh_interval: Duration,
}

impl Default for CoordinatorThreadConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
        }
    }
}

/// Coordinator Thread handle.
pub struct CoordinatorThread {
    handle: JoinHandle<()>,
}

impl CoordinatorThread {
    /// Spawn the coordinator thread.
    pub fn spawn(
        core: CoordinatorCore,
        update_rx: Receiver<TelemetryUpdate>,
        config: CoordinatorThreadConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        let handle = thread::Builder::new()
            .name("coordinator".into())
            .spawn(move || {
                run_coordinator_loop(core, update_rx, config, running);
            })
            .expect("Failed to spawn coordinator thread");

        Self { handle }
    }

    /// Wait for thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

fn run_coordinator_loop(
    core: CoordinatorCore,
    update_rx: Receiver<TelemetryUpdate>,
    config: CoordinatorThreadConfig,
    running: Arc<AtomicBool>,
) {
    log::info!("Coordinator thread starting");

    let refresh = tick(config.refresh_interval);

    while running.load(Ordering::Relaxed) {
        select! {
            recv(update_rx) -> result => {
                match result {
                    Ok(update) => {
                        log::debug!("Applying update from {}", update.miner_id);
                        core.apply_update(update);
                    }
                    // Receiver gone; nothing more will arrive.
                    Err(_) => break,
                }
            }
            recv(refresh) -> _ => {
                core.publish_snapshot();
            }
            // Timeout to allow checking the running flag
            default(Duration::from_millis(10)) => {}
        }
    }

    log::info!("Coordinator thread shutdown complete");
}
