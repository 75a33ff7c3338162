//! Integration tests for the UDP ingest pipeline.
//!
//! These run the real receiver + coordinator threads against a loopback
//! socket: datagrams go out through a plain `UdpSocket` exactly as a miner
//! would send them, and assertions observe the public fan-out surfaces.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};

use minerwatch::{CoordinatorConfig, MinerCoordinator, MinerSnapshot, ReceiverError};

const WAIT: Duration = Duration::from_secs(5);

fn loopback_config(port: u16) -> CoordinatorConfig {
    CoordinatorConfig {
        bind_addr: "127.0.0.1".to_string(),
        port,
        refresh_interval: Duration::from_secs(30),
    }
}

/// Start a coordinator on an ephemeral loopback port and wire its snapshot
/// notifications into a channel the test can wait on.
fn start_coordinator(port: u16) -> (MinerCoordinator, Receiver<MinerSnapshot>) {
    let mut coordinator = MinerCoordinator::new(loopback_config(port));

    let (tx, rx) = bounded(64);
    coordinator.add_listener(move |snapshot: &MinerSnapshot| {
        tx.try_send(snapshot.clone()).ok();
    });

    coordinator.start().expect("failed to start coordinator");
    (coordinator, rx)
}

fn sender() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").expect("failed to bind sender socket")
}

/// Drain snapshot notifications until one satisfies `predicate`.
fn wait_for_snapshot<F>(rx: &Receiver<MinerSnapshot>, predicate: F) -> MinerSnapshot
where
    F: Fn(&MinerSnapshot) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("timed out waiting for a matching snapshot");
        let snapshot = rx
            .recv_timeout(remaining)
            .expect("timed out waiting for a snapshot notification");
        if predicate(&snapshot) {
            return snapshot;
        }
    }
}

#[test]
fn test_ingest_and_block_event_end_to_end() {
    let (coordinator, snapshots) = start_coordinator(0);
    let events = coordinator.subscribe_blocks();
    let addr = coordinator.local_addr().unwrap();
    let socket = sender();

    // First sighting: stored verbatim, no block event.
    socket
        .send_to(
            br#"{"IP":"192.168.1.50","Valid":1,"HashRate":"55.2MH/s","BestDiff":"12.3M"}"#,
            addr,
        )
        .unwrap();

    let snapshot = wait_for_snapshot(&snapshots, |s| s.contains_key("192.168.1.50"));
    let record = &snapshot["192.168.1.50"];
    assert_eq!(record.valid_blocks(), 1);
    assert_eq!(record.hash_rate(), Some("55.2MH/s"));
    assert_eq!(record.best_diff(), Some("12.3M"));
    assert_eq!(record.text_field("IP"), Some("192.168.1.50"));
    assert!(events.try_recv().is_err());

    // Counter increase: exactly one event, store fully replaced.
    socket
        .send_to(
            br#"{"IP":"192.168.1.50","Valid":2,"HashRate":"55.0MH/s","BestDiff":"15.1M"}"#,
            addr,
        )
        .unwrap();

    let snapshot =
        wait_for_snapshot(&snapshots, |s| s["192.168.1.50"].valid_blocks() == 2);
    assert_eq!(snapshot["192.168.1.50"].hash_rate(), Some("55.0MH/s"));

    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event.miner_id, "192.168.1.50");
    assert_eq!(event.valid_blocks, 2);
    assert_eq!(event.best_diff.as_deref(), Some("15.1M"));
    assert_eq!(event.hashrate.as_deref(), Some("55.0MH/s"));
    assert!(events.try_recv().is_err());
}

#[test]
fn test_malformed_datagrams_change_nothing() {
    let (coordinator, snapshots) = start_coordinator(0);
    let events = coordinator.subscribe_blocks();
    let addr = coordinator.local_addr().unwrap();
    let socket = sender();

    // None of these survive decoding.
    socket.send_to(&[0xff, 0xfe, 0x80], addr).unwrap();
    socket.send_to(b"{truncated", addr).unwrap();
    socket.send_to(b"[1,2,3]", addr).unwrap();
    socket.send_to(b"", addr).unwrap();

    // A valid datagram afterwards is the first to produce a notification.
    socket
        .send_to(br#"{"IP":"10.0.0.5","Valid":4}"#, addr)
        .unwrap();

    let snapshot = wait_for_snapshot(&snapshots, |s| !s.is_empty());
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key("10.0.0.5"));
    assert!(events.try_recv().is_err());
}

#[test]
fn test_identifier_falls_back_to_source_address() {
    let (coordinator, snapshots) = start_coordinator(0);
    let addr = coordinator.local_addr().unwrap();
    let socket = sender();

    socket.send_to(br#"{"Valid":1}"#, addr).unwrap();

    let snapshot = wait_for_snapshot(&snapshots, |s| !s.is_empty());
    assert!(snapshot.contains_key("127.0.0.1"));
}

#[test]
fn test_stop_then_start_on_same_port() {
    let (mut coordinator, snapshots) = start_coordinator(0);
    let addr = coordinator.local_addr().unwrap();
    coordinator.stop();
    assert!(!coordinator.is_running());
    drop(snapshots);
    drop(coordinator);

    // The port must be released; a fresh coordinator binds it again.
    let (coordinator, snapshots) = start_coordinator(addr.port());
    assert_eq!(coordinator.local_addr().unwrap().port(), addr.port());

    let socket = sender();
    socket
        .send_to(br#"{"IP":"10.0.0.8","Valid":1}"#, addr)
        .unwrap();
    let snapshot = wait_for_snapshot(&snapshots, |s| !s.is_empty());
    assert!(snapshot.contains_key("10.0.0.8"));
}

#[test]
fn test_start_fails_when_port_is_taken() {
    let blocker = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let mut coordinator = MinerCoordinator::new(loopback_config(port));
    match coordinator.start() {
        Err(ReceiverError::Bind { .. }) => {}
        Err(other) => panic!("expected bind error, got {other}"),
        Ok(()) => panic!("start unexpectedly succeeded on a taken port"),
    }
    assert!(!coordinator.is_running());
}

#[test]
fn test_start_twice_is_a_noop() {
    let (mut coordinator, _snapshots) = start_coordinator(0);
    let addr = coordinator.local_addr().unwrap();

    coordinator.start().unwrap();
    assert_eq!(coordinator.local_addr().unwrap(), addr);
    coordinator.stop();
}
