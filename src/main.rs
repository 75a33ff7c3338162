//! minerwatch - Telemetry daemon for UDP-broadcasting crypto miners
//!
//! Listens for NMMiner-style JSON broadcasts, tracks every miner seen on the
//! network, and logs discoveries, status changes, and found blocks.
//!
//! # Usage
//!
//! ```bash
//! # With default config (port 37778)
//! cargo run --release
//!
//! # With custom config file
//! cargo run --release -- --config minerwatch.toml
//!
//! # With a different port
//! cargo run --release -- --port 45000
//! ```

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;

use minerwatch::{metrics, CoordinatorConfig, MinerCoordinator};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    listener: ListenerConfig,
    #[serde(default)]
    coordinator: CoordinatorSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ListenerConfig {
    /// UDP port miners broadcast to.
    port: u16,
    /// Interface address to bind.
    bind_addr: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 37778,
            bind_addr: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CoordinatorSection {
    /// Seconds between snapshot re-deliveries when no updates arrive.
    refresh_secs: u64,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self { refresh_secs: 30 }
    }
}

impl Config {
    fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            bind_addr: self.listener.bind_addr.clone(),
            port: self.listener.port,
            refresh_interval: Duration::from_secs(self.coordinator.refresh_secs),
        }
    }
}

/// Validate a configured port before handing it to the coordinator.
fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        return Err("port must be in the range 1-65535".to_string());
    }
    Ok(port)
}

// ============================================================================
// CLI Arguments
// ============================================================================

struct Args {
    config_path: Option<String>,
    port: Option<u16>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args {
        config_path: None,
        port: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    result.config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse::<u16>() {
                        Ok(port) => result.port = Some(port),
                        Err(_) => {
                            eprintln!("Invalid port: {}", args[i + 1]);
                            std::process::exit(1);
                        }
                    }
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    result
}

fn print_help() {
    println!("minerwatch - telemetry daemon for LAN crypto miners");
    println!();
    println!("USAGE:");
    println!("    minerwatch [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>     Configuration file (default: minerwatch.toml)");
    println!("    -p, --port <PORT>       UDP listen port (overrides config, default: 37778)");
    println!("    -h, --help              Print help information");
    println!();
    println!("CONFIGURATION:");
    println!("    All settings are configured via the TOML config file:");
    println!("    - [listener] port, bind_addr: UDP listener settings");
    println!("    - [coordinator] refresh_secs: snapshot re-delivery interval");
    println!();
    println!("THREADS:");
    println!("    The daemon runs with 2 fixed threads:");
    println!("    - UDP Receiver: Decodes miner broadcasts");
    println!("    - Coordinator: Applies updates and notifies consumers");
}

fn load_config(args: &Args) -> Config {
    match &args.config_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(contents) => match basic_toml::from_str(&contents) {
                Ok(cfg) => {
                    log::info!("Loaded config from {}", path);
                    cfg
                }
                Err(e) => {
                    log::warn!("Failed to parse config {}: {}", path, e);
                    Config::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read config {}: {}", path, e);
                Config::default()
            }
        },
        None => {
            // Try default paths
            for path in &["minerwatch.toml", "/etc/minerwatch.toml"] {
                if let Ok(contents) = fs::read_to_string(path) {
                    if let Ok(cfg) = basic_toml::from_str(&contents) {
                        log::info!("Loaded config from {}", path);
                        return cfg;
                    }
                }
            }
            Config::default()
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = parse_args();
    let mut config = load_config(&args);
    if let Some(port) = args.port {
        config.listener.port = port;
    }

    let port = match validate_port(config.listener.port) {
        Ok(port) => port,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("minerwatch starting");
    log::info!("  Listener: {}:{}", config.listener.bind_addr, port);
    log::info!("  Refresh interval: {}s", config.coordinator.refresh_secs);

    // Setup signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .expect("Error setting Ctrl-C handler");

    if let Err(e) = run_daemon(&config, running) {
        log::error!("Daemon error: {}", e);
        std::process::exit(1);
    }

    log::info!("minerwatch shutdown complete");
}

// ============================================================================
// Daemon
// ============================================================================

fn run_daemon(
    config: &Config,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut coordinator = MinerCoordinator::new(config.coordinator_config());

    // Log each miner once when it first appears; consumers typically create
    // per-device handlers lazily on first sighting, this does the same.
    let discovered: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    coordinator.add_listener(move |snapshot| {
        if let Ok(mut seen) = discovered.lock() {
            for (miner_id, record) in snapshot.iter() {
                if seen.insert(miner_id.clone()) {
                    log::info!(
                        "Discovered miner {} ({}, {})",
                        miner_id,
                        metrics::firmware_version(record),
                        metrics::pool_in_use(record)
                    );
                }
            }
        }
    });

    // Drain block-found events on a consumer thread
    let blocks = coordinator.subscribe_blocks();
    let block_logger = std::thread::Builder::new()
        .name("block-events".into())
        .spawn(move || {
            while let Ok(event) = blocks.recv() {
                log::info!(
                    "Miner {} reports {} valid blocks (best diff {}, rate {})",
                    event.miner_id,
                    event.valid_blocks,
                    event.best_diff.as_deref().unwrap_or("?"),
                    event.hashrate.as_deref().unwrap_or("?"),
                );
            }
        })
        .expect("Failed to spawn block event thread");

    coordinator.start()?;

    // Main thread just monitors the shutdown flag
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutdown signal received, waiting for threads...");
    coordinator.stop();

    // The event bus drops our subscription with the coordinator, which ends
    // the logger thread's recv loop.
    drop(coordinator);
    block_logger.join().ok();

    Ok(())
}
