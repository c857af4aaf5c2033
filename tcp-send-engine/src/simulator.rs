//! Seeded lossy peer for exercising the engine without a network.
//!
//! Real networks drop and duplicate packets.  To exercise the recovery paths
//! deterministically this module provides a [`LossyPeer`] that stands in for
//! the remote receiver: it consumes transmitted [`Segment`]s, applies a fault
//! model, reassembles the byte stream and answers with cumulative ACKs plus a
//! simulated RTT.
//!
//! | Fault       | Description                                          |
//! |-------------|------------------------------------------------------|
//! | Loss        | Drop a segment with probability `loss_rate`.         |
//! | Duplication | Deliver a segment twice (the second ACK is a dup).   |
//! | Jitter      | RTT drawn uniformly from `base_rtt ± jitter`.        |
//!
//! All randomness comes from a `StdRng` seeded from the config, so a failing
//! run can be replayed exactly.  [`run_transfer`] wires a peer to a
//! [`crate::driver`] task and pushes a payload through it.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::EngineConfig;
use crate::driver::{self, ConnectionHandle, Output};
use crate::error::EngineError;
use crate::segment::{seq_le, seq_lt, Segment};
use crate::stats::ConnectionSnapshot;

/// Configuration for the fault-injection model.
///
/// Probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that a segment is silently dropped.
    pub loss_rate: f64,
    /// Probability that a delivered segment arrives twice.
    pub duplicate_rate: f64,
    /// Mean simulated round-trip time.
    pub base_rtt: Duration,
    /// Maximum deviation from `base_rtt`.
    pub jitter: Duration,
    /// Receive window advertised in every ACK.
    pub window: u16,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the peer is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            base_rtt: Duration::from_millis(100),
            jitter: Duration::ZERO,
            window: u16::MAX,
            seed: 0,
        }
    }
}

/// One acknowledgement produced by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckSample {
    pub ack: u32,
    pub window: u16,
    pub elapsed: Duration,
}

/// Fault counters kept by the peer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PeerStats {
    pub received: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub out_of_order: u64,
}

// ---------------------------------------------------------------------------
// LossyPeer
// ---------------------------------------------------------------------------

/// Simulated receiver with cumulative acknowledgements.
#[derive(Debug)]
pub struct LossyPeer {
    config: SimulatorConfig,
    rng: StdRng,
    /// Next in-order sequence number expected.
    rcv_nxt: u32,
    /// Segments received ahead of `rcv_nxt`, keyed by raw seq.  Lookups scan
    /// with wrap-aware comparisons rather than relying on map order.
    out_of_order: BTreeMap<u32, Vec<u8>>,
    /// Reassembled in-order payload.
    delivered: Vec<u8>,
    stats: PeerStats,
}

impl LossyPeer {
    pub fn new(config: SimulatorConfig, initial_seq: u32) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            rcv_nxt: initial_seq,
            out_of_order: BTreeMap::new(),
            delivered: Vec::new(),
            stats: PeerStats::default(),
        }
    }

    pub fn rcv_nxt(&self) -> u32 {
        self.rcv_nxt
    }

    /// Bytes reassembled in order so far.
    pub fn delivered(&self) -> &[u8] {
        &self.delivered
    }

    pub fn stats(&self) -> PeerStats {
        self.stats
    }

    /// Push one segment through the fault model.
    ///
    /// Returns the ACKs the sender will see: none if the segment was dropped,
    /// two if it was duplicated.
    pub fn deliver(&mut self, segment: &Segment) -> Vec<AckSample> {
        if self.rng.gen_bool(self.config.loss_rate.clamp(0.0, 1.0)) {
            self.stats.dropped += 1;
            log::trace!("[sim] drop seq={}", segment.seq);
            return Vec::new();
        }
        let copies = if self.rng.gen_bool(self.config.duplicate_rate.clamp(0.0, 1.0)) {
            self.stats.duplicated += 1;
            2
        } else {
            1
        };
        (0..copies)
            .map(|_| {
                self.accept(segment.seq, &segment.payload);
                AckSample {
                    ack: self.rcv_nxt,
                    window: self.config.window,
                    elapsed: self.sample_rtt(),
                }
            })
            .collect()
    }

    fn accept(&mut self, seq: u32, payload: &[u8]) {
        self.stats.received += 1;
        let end = seq.wrapping_add(payload.len() as u32);
        if seq_le(end, self.rcv_nxt) {
            return; // entirely old
        }
        if seq_lt(self.rcv_nxt, seq) {
            self.stats.out_of_order += 1;
            self.out_of_order.entry(seq).or_insert_with(|| payload.to_vec());
            return;
        }
        let skip = self.rcv_nxt.wrapping_sub(seq) as usize;
        self.delivered.extend_from_slice(&payload[skip..]);
        self.rcv_nxt = end;
        self.drain_out_of_order();
    }

    fn drain_out_of_order(&mut self) {
        loop {
            let next = self
                .out_of_order
                .iter()
                .find(|(&seq, _)| seq_le(seq, self.rcv_nxt))
                .map(|(&seq, _)| seq);
            let Some(seq) = next else { break };
            let Some(payload) = self.out_of_order.remove(&seq) else { break };
            let end = seq.wrapping_add(payload.len() as u32);
            if seq_lt(self.rcv_nxt, end) {
                let skip = self.rcv_nxt.wrapping_sub(seq) as usize;
                self.delivered.extend_from_slice(&payload[skip..]);
                self.rcv_nxt = end;
            }
        }
    }

    fn sample_rtt(&mut self) -> Duration {
        let base = self.config.base_rtt.as_millis() as i64;
        let jitter = self.config.jitter.as_millis() as i64;
        let offset = if jitter > 0 {
            self.rng.gen_range(-jitter..=jitter)
        } else {
            0
        };
        Duration::from_millis((base + offset).max(1) as u64)
    }
}

// ---------------------------------------------------------------------------
// Transfer runner
// ---------------------------------------------------------------------------

/// Outcome of [`run_transfer`].
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub bytes: usize,
    pub sender: ConnectionSnapshot,
    pub peer: PeerStats,
    /// `true` when the peer reassembled exactly the submitted payload.
    pub intact: bool,
}

/// Deterministic payload: one letter per MSS-sized block, `A` to `Z`.
pub fn test_payload(bytes: usize, mss: u32) -> Vec<u8> {
    let mss = mss.max(1) as usize;
    (0..bytes).map(|i| b'A' + ((i / mss) % 26) as u8).collect()
}

/// Send `bytes` of data through a driver task and a [`LossyPeer`].
///
/// Runs until the peer holds every byte, or until the sender aborts.  The
/// driver's timer runs on tokio time, so under a paused clock the whole
/// transfer completes instantly.  `bytes` must fit in one pass of the u32
/// sequence space.
pub async fn run_transfer(
    engine: EngineConfig,
    sim: SimulatorConfig,
    bytes: usize,
) -> Result<TransferReport, EngineError> {
    let len = u32::try_from(bytes).map_err(|_| {
        EngineError::InvalidConfig(format!(
            "transfer of {bytes} bytes exceeds the sequence space"
        ))
    })?;
    let payload = test_payload(bytes, engine.mss);
    let target = engine.initial_seq.wrapping_add(len);
    let mut peer = LossyPeer::new(sim, engine.initial_seq);
    let mut handle = driver::spawn(engine)?;

    let submitted = handle.submit(payload.clone()).await;
    if let Err(err) = submitted {
        return Err(stopped_reason(handle, err).await);
    }

    while peer.rcv_nxt() != target {
        match handle.next_output().await {
            Some(Output::Transmit(segment)) => {
                for sample in peer.deliver(&segment) {
                    let delivered = handle
                        .deliver_ack(sample.ack, sample.window, sample.elapsed)
                        .await;
                    if let Err(err) = delivered {
                        return Err(stopped_reason(handle, err).await);
                    }
                }
            }
            Some(Output::Abort(reason)) => {
                log::warn!("[sim] sender aborted: {reason}");
                let _ = handle.close().await;
                return Err(reason);
            }
            None => return Err(stopped_reason(handle, EngineError::Closed).await),
        }
    }

    let sender = handle.close().await?;
    let intact = peer.delivered() == payload.as_slice();
    log::info!(
        "[sim] transferred {} bytes: {} sent, {} retransmitted, {} dropped",
        bytes,
        sender.stats.packets_sent,
        sender.stats.retransmits,
        peer.stats().dropped
    );
    Ok(TransferReport {
        bytes,
        sender,
        peer: peer.stats(),
        intact,
    })
}

/// Why the driver stopped taking events.
///
/// An abort signal still queued in the output channel wins over the task's
/// own result, which wins over `fallback`.
async fn stopped_reason(mut handle: ConnectionHandle, fallback: EngineError) -> EngineError {
    while let Some(output) = handle.next_output().await {
        if let Output::Abort(reason) = output {
            log::warn!("[sim] sender aborted: {reason}");
            return reason;
        }
    }
    match handle.close().await {
        Err(reason) => reason,
        Ok(_) => fallback,
    }
}
