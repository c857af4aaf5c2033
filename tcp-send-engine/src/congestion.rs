//! Congestion control (Reno-style window management).
//!
//! [`CongestionController`] owns the congestion window, slow-start threshold
//! and fast-recovery flag.  It reacts to three events:
//!
//! | Event          | Effect                                                   |
//! |----------------|----------------------------------------------------------|
//! | new ACK        | slow start: `cwnd += mss`; avoidance: `cwnd += mss²/cwnd` |
//! | duplicate ACK  | `ssthresh = cwnd/2`, `cwnd = ssthresh + 3·mss`, recover   |
//! | timeout        | `ssthresh = cwnd/2`, `cwnd = mss`                         |
//!
//! All values are bytes.  `cwnd` never drops below one MSS and `ssthresh`
//! never below two.
//!
//! Congestion-avoidance growth uses integer division, so once
//! `cwnd > mss²` an ACK adds nothing.  That saturation is the classic
//! behaviour and is kept as is.

use std::fmt;

use crate::config::EngineConfig;
use crate::segment::seq_le;

/// Observable congestion-control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionState {
    /// Congestion window in bytes.
    pub cwnd: u32,
    /// Slow-start threshold in bytes.
    pub ssthresh: u32,
    /// Fast recovery in progress.
    pub in_recovery: bool,
    /// `snd_nxt` at the moment recovery was entered.
    pub recover: u32,
}

/// Which growth regime the window is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionPhase {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

impl fmt::Display for CongestionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone)]
pub struct CongestionController {
    state: CongestionState,
    mss: u32,
}

impl CongestionController {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        let mss = config.mss;
        Self {
            state: CongestionState {
                cwnd: config.initial_cwnd().max(mss),
                ssthresh: config.initial_ssthresh.max(mss.saturating_mul(2)),
                in_recovery: false,
                recover: config.initial_seq,
            },
            mss,
        }
    }

    pub fn state(&self) -> CongestionState {
        self.state
    }

    pub fn cwnd(&self) -> u32 {
        self.state.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.state.ssthresh
    }

    pub fn in_recovery(&self) -> bool {
        self.state.in_recovery
    }

    pub fn mss(&self) -> u32 {
        self.mss
    }

    pub fn phase(&self) -> CongestionPhase {
        if self.state.in_recovery {
            CongestionPhase::FastRecovery
        } else if self.state.cwnd < self.state.ssthresh {
            CongestionPhase::SlowStart
        } else {
            CongestionPhase::CongestionAvoidance
        }
    }

    /// Grow the window for an ACK that acknowledged new data.
    ///
    /// No growth happens during fast recovery.
    pub fn on_new_ack(&mut self) {
        if self.state.in_recovery {
            return;
        }
        let s = &mut self.state;
        if s.cwnd < s.ssthresh {
            s.cwnd = s.cwnd.saturating_add(self.mss);
        } else {
            let inc = u64::from(self.mss) * u64::from(self.mss) / u64::from(s.cwnd.max(1));
            s.cwnd = s.cwnd.saturating_add(inc.min(u64::from(u32::MAX)) as u32);
        }
        log::debug!("[cc] new ack: cwnd={} ssthresh={}", s.cwnd, s.ssthresh);
    }

    /// React to a duplicate ACK.  Idempotent while already recovering.
    ///
    /// `snd_nxt` becomes the recovery point.
    pub fn on_duplicate_ack(&mut self, snd_nxt: u32) {
        if self.state.in_recovery {
            return;
        }
        self.halve_ssthresh();
        self.state.cwnd = self
            .state
            .ssthresh
            .saturating_add(self.mss.saturating_mul(3))
            .max(self.mss);
        self.state.in_recovery = true;
        self.state.recover = snd_nxt;
        log::debug!(
            "[cc] dup ack: enter recovery recover={} cwnd={} ssthresh={}",
            snd_nxt,
            self.state.cwnd,
            self.state.ssthresh
        );
    }

    /// Collapse to one segment after a retransmission timeout.
    ///
    /// The recovery flag is left alone.
    pub fn on_timeout(&mut self) {
        self.halve_ssthresh();
        self.state.cwnd = self.mss;
        log::debug!(
            "[cc] timeout: cwnd={} ssthresh={}",
            self.state.cwnd,
            self.state.ssthresh
        );
    }

    /// Leave fast recovery once `ack` reaches the recovery point.
    ///
    /// Returns `true` when recovery ended.
    pub fn maybe_leave_recovery(&mut self, ack: u32) -> bool {
        if self.state.in_recovery && seq_le(self.state.recover, ack) {
            self.state.in_recovery = false;
            log::debug!("[cc] leave recovery at ack={ack}");
            return true;
        }
        false
    }

    fn halve_ssthresh(&mut self) {
        self.state.ssthresh = (self.state.cwnd / 2).max(self.mss.saturating_mul(2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc() -> CongestionController {
        CongestionController::new(&EngineConfig::default())
    }

    fn assert_invariants(c: &CongestionController) {
        assert!(c.cwnd() >= c.mss());
        assert!(c.ssthresh() >= 2 * c.mss());
    }

    #[test]
    fn initial_window() {
        let c = cc();
        assert_eq!(c.cwnd(), 14_600);
        assert_eq!(c.ssthresh(), 65_535);
        assert_eq!(c.phase(), CongestionPhase::SlowStart);
    }

    #[test]
    fn slow_start_adds_one_mss() {
        let mut c = cc();
        c.on_new_ack();
        assert_eq!(c.cwnd(), 16_060);
    }

    #[test]
    fn avoidance_adds_fraction_of_mss() {
        let mut c = cc();
        c.on_timeout(); // ssthresh 7300, cwnd 1460
        while c.cwnd() < c.ssthresh() {
            c.on_new_ack();
        }
        assert_eq!(c.cwnd(), 7300);
        assert_eq!(c.phase(), CongestionPhase::CongestionAvoidance);
        c.on_new_ack();
        // 1460 * 1460 / 7300 = 292
        assert_eq!(c.cwnd(), 7592);
    }

    #[test]
    fn avoidance_growth_saturates_at_large_window() {
        let cfg = EngineConfig {
            mss: 100,
            initial_cwnd_segments: 200,
            initial_ssthresh: 200,
            ..EngineConfig::default()
        };
        let mut c = CongestionController::new(&cfg);
        // cwnd 20000 > mss² = 10000, so growth rounds to zero.
        c.on_new_ack();
        assert_eq!(c.cwnd(), 20_000);
    }

    #[test]
    fn duplicate_acks_enter_recovery_once() {
        let mut c = cc();
        for _ in 0..3 {
            c.on_duplicate_ack(5000);
        }
        assert_eq!(c.ssthresh(), 7300);
        assert_eq!(c.cwnd(), 11_680);
        assert!(c.in_recovery());
        assert_eq!(c.state().recover, 5000);
        assert_eq!(c.phase(), CongestionPhase::FastRecovery);
    }

    #[test]
    fn no_growth_during_recovery() {
        let mut c = cc();
        c.on_duplicate_ack(5000);
        c.on_new_ack();
        assert_eq!(c.cwnd(), 11_680);
    }

    #[test]
    fn recovery_ends_at_recover_point() {
        let mut c = cc();
        c.on_duplicate_ack(5000);
        assert!(!c.maybe_leave_recovery(4999));
        assert!(c.in_recovery());
        assert!(c.maybe_leave_recovery(5000));
        assert!(!c.in_recovery());
        assert!(!c.maybe_leave_recovery(6000));
    }

    #[test]
    fn timeout_restarts_slow_start() {
        let mut c = cc();
        c.on_timeout();
        assert_eq!(c.ssthresh(), 7300);
        assert_eq!(c.cwnd(), 1460);
        assert_invariants(&c);
    }

    #[test]
    fn timeout_keeps_recovery_flag() {
        let mut c = cc();
        c.on_duplicate_ack(9000);
        c.on_timeout();
        assert!(c.in_recovery());
        assert_eq!(c.cwnd(), 1460);
    }

    #[test]
    fn repeated_timeouts_respect_floors() {
        let mut c = cc();
        for _ in 0..10 {
            c.on_timeout();
            assert_invariants(&c);
        }
        assert_eq!(c.ssthresh(), 2920);
        c.on_duplicate_ack(0);
        assert_invariants(&c);
    }
}
