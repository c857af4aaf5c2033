//! Engine configuration.
//!
//! [`EngineConfig`] gathers every tunable constant of the send path in one
//! place.  The defaults are the classic values: a 1460-byte
//! MSS, an initial window of ten segments, a 64 KiB slow-start threshold and an
//! RTO bounded to `[1 s, 120 s]`.
//!
//! The binary fills these fields from CLI flags; library users build one with
//! struct-update syntax over [`EngineConfig::default`].

use std::time::Duration;

use crate::error::EngineError;

/// Default maximum segment size in bytes.
pub const DEFAULT_MSS: u32 = 1460;
/// Default initial congestion window, in segments.
pub const DEFAULT_INITIAL_CWND_SEGMENTS: u32 = 10;
/// Default initial slow-start threshold in bytes.
pub const DEFAULT_INITIAL_SSTHRESH: u32 = 65_535;
/// Default retransmission ceiling per segment.
pub const DEFAULT_MAX_RETRIES: u8 = 5;

/// Tunable parameters for one [`crate::connection::Connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum segment size (payload bytes per segment).
    pub mss: u32,
    /// Initial congestion window expressed in whole segments.
    pub initial_cwnd_segments: u32,
    /// Initial slow-start threshold in bytes.
    pub initial_ssthresh: u32,
    /// Lower bound for the retransmission timeout.
    pub rto_min: Duration,
    /// Upper bound for the retransmission timeout after back-off.
    pub rto_max: Duration,
    /// Smoothed RTT assumed before the first sample.
    pub initial_srtt: Duration,
    /// RTT variation assumed before the first sample.
    pub initial_rttvar: Duration,
    /// A segment may be retransmitted this many times; one more expiry aborts.
    pub max_retries: u8,
    /// Sequence number of the first data byte.
    pub initial_seq: u32,
    /// Receive window assumed until the peer advertises one.
    pub initial_rcv_wnd: u32,
    /// Peer sequence number echoed in outgoing segments.
    pub rcv_nxt: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mss: DEFAULT_MSS,
            initial_cwnd_segments: DEFAULT_INITIAL_CWND_SEGMENTS,
            initial_ssthresh: DEFAULT_INITIAL_SSTHRESH,
            rto_min: Duration::from_millis(1000),
            rto_max: Duration::from_millis(120_000),
            initial_srtt: Duration::from_millis(100),
            initial_rttvar: Duration::from_millis(50),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_seq: 1000,
            initial_rcv_wnd: 65_535,
            rcv_nxt: 2000,
        }
    }
}

impl EngineConfig {
    /// Initial congestion window in bytes.
    pub fn initial_cwnd(&self) -> u32 {
        self.initial_cwnd_segments.saturating_mul(self.mss)
    }

    /// Reject configurations that would break the window or RTO invariants.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.mss == 0 {
            return Err(EngineError::InvalidConfig("mss must be non-zero".into()));
        }
        if self.initial_cwnd_segments == 0 {
            return Err(EngineError::InvalidConfig(
                "initial cwnd must hold at least one segment".into(),
            ));
        }
        if self.initial_ssthresh < self.mss.saturating_mul(2) {
            return Err(EngineError::InvalidConfig(format!(
                "initial ssthresh {} is below 2*mss ({})",
                self.initial_ssthresh,
                self.mss.saturating_mul(2)
            )));
        }
        if self.max_retries == u8::MAX {
            return Err(EngineError::InvalidConfig(format!(
                "max_retries must be below {}",
                u8::MAX
            )));
        }
        if self.rto_min.is_zero() {
            return Err(EngineError::InvalidConfig("rto_min must be non-zero".into()));
        }
        if self.rto_min > self.rto_max {
            return Err(EngineError::InvalidConfig(format!(
                "rto_min {:?} exceeds rto_max {:?}",
                self.rto_min, self.rto_max
            )));
        }
        if self.rto_max > Duration::from_millis(u32::MAX as u64) {
            return Err(EngineError::InvalidConfig("rto_max does not fit in u32 milliseconds".into()));
        }
        Ok(())
    }
}
