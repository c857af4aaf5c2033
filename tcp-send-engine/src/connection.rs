//! The per-connection aggregate.
//!
//! A [`Connection`] exclusively owns every piece of send-side state for one
//! transfer: the retransmission queue, congestion and RTT state, the
//! retransmission timer, the application send buffer and the statistics.
//! It is a synchronous state machine driven by three inputs:
//!
//! - [`submit`](Connection::submit): application bytes to send,
//! - [`deliver_ack`](Connection::deliver_ack): one cumulative ACK plus an
//!   externally measured RTT sample,
//! - [`timer_fired`](Connection::timer_fired): retransmission timer expiry.
//!
//! Outputs go to a [`Transmitter`], the network collaborator.  The connection
//! never reads a clock and never blocks; callers that want real time use
//! [`crate::driver`].
//!
//! The behaviour behind each input lives next to its component:
//! [`crate::scheduler`], [`crate::ack`] and [`crate::timer`].

use std::time::Duration;

use crate::ack::AckOutcome;
use crate::config::EngineConfig;
use crate::congestion::{CongestionController, CongestionState};
use crate::error::EngineError;
use crate::rtt::RttEstimator;
use crate::scheduler::TransmitScheduler;
use crate::segment::Segment;
use crate::stats::{ConnectionSnapshot, ConnectionStats};
use crate::store::SegmentStore;
use crate::timer::{RetransmissionTimer, TimerState};

// ---------------------------------------------------------------------------
// Transmitter
// ---------------------------------------------------------------------------

/// Network collaborator that consumes the engine's outputs.
///
/// Implementations must not block: they are called while the connection is
/// in the middle of a state update.
pub trait Transmitter {
    /// Frame and deliver one segment.
    fn transmit(&mut self, segment: &Segment);

    /// The connection hit a fatal error and will accept no more input.
    fn abort(&mut self, reason: &EngineError) {
        let _ = reason;
    }
}

/// A [`Transmitter`] that records everything it is given.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub sent: Vec<Segment>,
    pub aborted: Option<EngineError>,
}

impl Recorder {
    /// Hand out the segments recorded so far, leaving the log empty.
    pub fn take(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.sent)
    }
}

impl Transmitter for Recorder {
    fn transmit(&mut self, segment: &Segment) {
        self.sent.push(segment.clone());
    }

    fn abort(&mut self, reason: &EngineError) {
        self.aborted = Some(reason.clone());
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Send-side state for one transfer.
///
/// # Sequence-number layout
///
/// ```text
///  snd_una            snd_nxt
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── cwnd budget ─▶
/// ```
#[derive(Debug)]
pub struct Connection<T: Transmitter> {
    pub(crate) config: EngineConfig,

    /// Oldest unacknowledged sequence number.
    pub(crate) snd_una: u32,
    /// Next sequence number to assign.
    pub(crate) snd_nxt: u32,
    /// Peer's next expected sequence number, echoed in outgoing segments.
    pub(crate) rcv_nxt: u32,
    /// Last window advertised by the peer.
    pub(crate) rcv_wnd: u32,

    pub(crate) store: SegmentStore,
    pub(crate) cc: CongestionController,
    pub(crate) rtt: RttEstimator,
    pub(crate) timer: RetransmissionTimer,
    pub(crate) scheduler: TransmitScheduler,
    pub(crate) stats: ConnectionStats,

    pub(crate) net: T,
}

impl<T: Transmitter> Connection<T> {
    /// Start a transfer with `config`, emitting segments to `net`.
    pub fn new(config: EngineConfig, net: T) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            snd_una: config.initial_seq,
            snd_nxt: config.initial_seq,
            rcv_nxt: config.rcv_nxt,
            rcv_wnd: config.initial_rcv_wnd,
            store: SegmentStore::new(),
            cc: CongestionController::new(&config),
            rtt: RttEstimator::new(&config),
            timer: RetransmissionTimer::new(config.max_retries),
            scheduler: TransmitScheduler::new(),
            stats: ConnectionStats::default(),
            config,
            net,
        })
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Queue application bytes and send as much as the window allows.
    ///
    /// Returns the number of segments sent right away.
    pub fn submit(&mut self, data: &[u8]) -> Result<usize, EngineError> {
        self.ensure_alive()?;
        self.scheduler.enqueue(data);
        Ok(self.write(self.scheduler.pending()))
    }

    /// Process one ACK, then use any window it freed.
    ///
    /// `elapsed_since_send` is the caller's RTT measurement for the oldest
    /// newly acknowledged segment.
    pub fn deliver_ack(
        &mut self,
        ack: u32,
        window: u16,
        elapsed_since_send: Duration,
    ) -> Result<AckOutcome, EngineError> {
        self.ensure_alive()?;
        let outcome = self.on_ack(ack, window, elapsed_since_send);
        if matches!(outcome, AckOutcome::NewData { .. }) && self.scheduler.pending() > 0 {
            self.write(self.scheduler.pending());
        }
        Ok(outcome)
    }

    pub(crate) fn ensure_alive(&self) -> Result<(), EngineError> {
        if self.timer.state() == TimerState::Aborted {
            return Err(EngineError::Aborted);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn snd_una(&self) -> u32 {
        self.snd_una
    }

    pub fn snd_nxt(&self) -> u32 {
        self.snd_nxt
    }

    pub fn rcv_nxt(&self) -> u32 {
        self.rcv_nxt
    }

    pub fn rcv_wnd(&self) -> u32 {
        self.rcv_wnd
    }

    pub fn mss(&self) -> u32 {
        self.config.mss
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn congestion(&self) -> CongestionState {
        self.cc.state()
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Timeout the retransmission timer is (or would be) armed with.
    pub fn rto(&self) -> Duration {
        self.rtt.rto()
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn timer_state(&self) -> TimerState {
        self.timer.state()
    }

    /// Bumped every time the timer is (re)armed.
    pub fn timer_epoch(&self) -> u64 {
        self.timer.epoch()
    }

    pub fn is_aborted(&self) -> bool {
        self.timer.state() == TimerState::Aborted
    }

    /// Bytes submitted but not yet segmented.
    pub fn pending_bytes(&self) -> usize {
        self.scheduler.pending()
    }

    /// Bytes sent and not yet acknowledged.
    pub fn in_flight(&self) -> u32 {
        self.snd_nxt.wrapping_sub(self.snd_una)
    }

    pub fn transmitter(&self) -> &T {
        &self.net
    }

    pub fn transmitter_mut(&mut self) -> &mut T {
        &mut self.net
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            stats: self.stats,
            congestion: self.cc.state(),
            phase: self.cc.phase(),
            snd_una: self.snd_una,
            snd_nxt: self.snd_nxt,
            rcv_wnd: self.rcv_wnd,
            srtt: self.rtt.srtt(),
            rttvar: self.rtt.rttvar(),
            rto: self.rtt.rto(),
            timer: self.timer.state(),
            outstanding_segments: self.store.len(),
            outstanding_bytes: self.store.outstanding_bytes(),
            pending_bytes: self.scheduler.pending(),
        }
    }
}
