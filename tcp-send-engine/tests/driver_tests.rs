//! Integration tests for the tokio driver and the lossy-peer simulator.
//!
//! All tests run on a paused clock, so retransmission timeouts of several
//! seconds complete instantly and deterministically.

use std::time::Duration;

use tcp_send_engine::driver::{self, Output};
use tcp_send_engine::simulator::{run_transfer, SimulatorConfig};
use tcp_send_engine::{EngineConfig, EngineError, TimerState};

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn submit_emits_initial_window() {
    let mut handle = driver::spawn(EngineConfig::default()).unwrap();
    handle.submit(vec![1u8; 20 * 1460]).await.unwrap();

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.outstanding_segments, 10);
    assert_eq!(snap.pending_bytes, 10 * 1460);

    let mut seqs = Vec::new();
    while let Some(Output::Transmit(seg)) = handle.try_next_output() {
        seqs.push(seg.seq);
    }
    assert_eq!(seqs.len(), 10);
    assert_eq!(seqs[0], 1000);

    handle.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn timer_retransmits_after_rto() {
    let mut handle = driver::spawn(EngineConfig::default()).unwrap();
    handle.submit(vec![0u8; 100]).await.unwrap();

    match handle.next_output().await {
        Some(Output::Transmit(seg)) => assert!(!seg.retransmitted),
        other => panic!("expected first send, got {other:?}"),
    }
    // No ACK: the 1s RTO elapses on the paused clock.
    match handle.next_output().await {
        Some(Output::Transmit(seg)) => {
            assert!(seg.retransmitted);
            assert_eq!(seg.retry_count, 1);
        }
        other => panic!("expected retransmission, got {other:?}"),
    }

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.stats.timeouts, 1);
    assert_eq!(snap.rto, Duration::from_millis(2000));
    handle.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn ack_disarms_timer() {
    let mut handle = driver::spawn(EngineConfig::default()).unwrap();
    handle.submit(vec![0u8; 100]).await.unwrap();
    assert!(matches!(handle.next_output().await, Some(Output::Transmit(_))));

    handle.deliver_ack(1100, 65_535, Duration::from_millis(40)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.timer, TimerState::Idle);
    assert_eq!(snap.stats.timeouts, 0);
    assert!(handle.try_next_output().is_none());
    handle.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unanswered_data_aborts_through_driver() {
    let mut handle = driver::spawn(EngineConfig::default()).unwrap();
    handle.submit(vec![0u8; 10]).await.unwrap();

    let mut transmits = 0;
    let reason = loop {
        match handle.next_output().await {
            Some(Output::Transmit(_)) => transmits += 1,
            Some(Output::Abort(reason)) => break reason,
            None => panic!("output channel closed before abort"),
        }
    };
    assert_eq!(transmits, 6);
    assert_eq!(reason, EngineError::RetryExhausted { seq: 1000, max_retries: 5 });
    assert_eq!(handle.close().await.unwrap_err(), reason);
}

#[tokio::test]
async fn invalid_config_is_rejected_by_spawn() {
    let cfg = EngineConfig { mss: 0, ..EngineConfig::default() };
    assert!(matches!(driver::spawn(cfg), Err(EngineError::InvalidConfig(_))));
}

// ---------------------------------------------------------------------------
// Simulated transfers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn clean_transfer_delivers_everything() {
    let report = run_transfer(EngineConfig::default(), SimulatorConfig::default(), 200_000)
        .await
        .unwrap();
    assert!(report.intact);
    assert_eq!(report.sender.stats.retransmits, 0);
    assert_eq!(report.sender.stats.bytes_acked, 200_000);
    assert_eq!(report.sender.outstanding_segments, 0);
    assert_eq!(report.peer.dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn lossy_transfer_recovers() {
    let engine = EngineConfig { max_retries: 12, ..EngineConfig::default() };
    let sim = SimulatorConfig {
        loss_rate: 0.1,
        duplicate_rate: 0.05,
        jitter: Duration::from_millis(30),
        seed: 7,
        ..SimulatorConfig::default()
    };
    let report = run_transfer(engine, sim, 50_000).await.unwrap();
    assert!(report.intact);
    assert!(report.peer.dropped > 0);
    assert!(report.sender.stats.retransmits > 0);
    assert!(report.sender.stats.timeouts > 0);
}

#[tokio::test(start_paused = true)]
async fn total_loss_surfaces_retry_exhausted() {
    let sim = SimulatorConfig { loss_rate: 1.0, ..SimulatorConfig::default() };
    let err = run_transfer(EngineConfig::default(), sim, 5000).await.unwrap_err();
    assert!(matches!(err, EngineError::RetryExhausted { seq: 1000, max_retries: 5 }));
}
