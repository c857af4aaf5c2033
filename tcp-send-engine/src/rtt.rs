//! Round-trip-time estimation (Jacobson/Karels).
//!
//! Each accepted sample updates the smoothed RTT and its mean deviation with
//! gains of 1/8 and 1/4, implemented as arithmetic shifts on signed
//! milliseconds:
//!
//! ```text
//!   err     = R - SRTT
//!   SRTT   += err >> 3
//!   RTTVAR += (|err| - RTTVAR) >> 2
//!   RTO     = clamp(SRTT + 4·RTTVAR, RTO_MIN, RTO_MAX)
//! ```
//!
//! Samples taken from retransmitted segments are discarded (Karn's algorithm)
//! because the ACK cannot be attributed to a particular transmission.
//!
//! The estimator never reads a clock; the caller supplies the elapsed time.

use std::time::Duration;

use crate::config::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RttEstimator {
    /// Smoothed RTT, milliseconds.
    srtt: i64,
    /// RTT mean deviation, milliseconds.
    rttvar: i64,
    /// Timeout currently in force (may be backed off), milliseconds.
    rto: u64,
    rto_min: u64,
    rto_max: u64,
}

impl RttEstimator {
    /// `config` must already have passed [`EngineConfig::validate`].
    pub(crate) fn new(config: &EngineConfig) -> Self {
        let rto_min = config.rto_min.as_millis() as u64;
        let rto_max = config.rto_max.as_millis() as u64;
        Self {
            srtt: config.initial_srtt.as_millis() as i64,
            rttvar: config.initial_rttvar.as_millis() as i64,
            rto: rto_min,
            rto_min,
            rto_max,
        }
    }

    /// Fold one RTT observation into the estimate.
    ///
    /// Returns `false` when the sample was discarded because it belongs to a
    /// retransmitted segment.
    pub fn sample(&mut self, rtt: Duration, retransmitted: bool) -> bool {
        if retransmitted {
            return false;
        }
        let rtt = rtt.as_millis().min(i64::MAX as u128) as i64;
        let err = rtt - self.srtt;
        self.srtt = (self.srtt + (err >> 3)).max(0);
        self.rttvar = (self.rttvar + ((err.abs() - self.rttvar) >> 2)).max(0);
        self.rto = self.computed_rto_ms();
        log::debug!(
            "[rtt] sample={}ms srtt={}ms rttvar={}ms rto={}ms",
            rtt,
            self.srtt,
            self.rttvar,
            self.rto
        );
        true
    }

    /// `SRTT + 4·RTTVAR`, clamped to the configured bounds.
    pub fn current_rto(&self) -> Duration {
        Duration::from_millis(self.computed_rto_ms())
    }

    /// Timeout the retransmission timer should use right now.
    ///
    /// Equals [`current_rto`](Self::current_rto) except after
    /// [`backoff`](Self::backoff).
    pub fn rto(&self) -> Duration {
        Duration::from_millis(self.rto)
    }

    /// Double the timeout after an expiry, capped at `RTO_MAX`.
    pub fn backoff(&mut self) {
        self.rto = self.rto.saturating_mul(2).min(self.rto_max);
    }

    /// Discard any back-off and return to the estimated timeout.
    pub fn rearm(&mut self) {
        self.rto = self.computed_rto_ms();
    }

    pub fn srtt(&self) -> Duration {
        Duration::from_millis(self.srtt as u64)
    }

    pub fn rttvar(&self) -> Duration {
        Duration::from_millis(self.rttvar as u64)
    }

    fn computed_rto_ms(&self) -> u64 {
        let raw = self.srtt.saturating_add(self.rttvar.saturating_mul(4)).max(0) as u64;
        raw.clamp(self.rto_min, self.rto_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn est() -> RttEstimator {
        RttEstimator::new(&EngineConfig::default())
    }

    #[test]
    fn initial_rto_is_floor() {
        let e = est();
        assert_eq!(e.rto(), Duration::from_millis(1000));
        assert_eq!(e.current_rto(), Duration::from_millis(1000));
        assert_eq!(e.srtt(), Duration::from_millis(100));
        assert_eq!(e.rttvar(), Duration::from_millis(50));
    }

    #[test]
    fn sample_applies_shift_gains() {
        let mut e = est();
        assert!(e.sample(Duration::from_millis(900), false));
        // err = 800: srtt = 100 + 100, rttvar = 50 + (800 - 50) / 4
        assert_eq!(e.srtt(), Duration::from_millis(200));
        assert_eq!(e.rttvar(), Duration::from_millis(237));
        // 200 + 4 * 237 = 1148
        assert_eq!(e.rto(), Duration::from_millis(1148));
    }

    #[test]
    fn negative_error_shifts_arithmetically() {
        let mut e = est();
        e.sample(Duration::from_millis(100), false);
        // err = 0: rttvar = 50 + (-50 >> 2) = 50 - 13
        assert_eq!(e.srtt(), Duration::from_millis(100));
        assert_eq!(e.rttvar(), Duration::from_millis(37));
    }

    #[test]
    fn retransmitted_sample_ignored() {
        let mut e = est();
        assert!(!e.sample(Duration::from_secs(30), true));
        assert_eq!(e, est());
    }

    #[test]
    fn rto_clamped_to_max() {
        let mut e = est();
        for _ in 0..50 {
            e.sample(Duration::from_secs(500), false);
        }
        assert_eq!(e.current_rto(), Duration::from_millis(120_000));
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let mut e = est();
        let initial = e.rto();
        for k in 1..=10u32 {
            e.backoff();
            let expected = (initial * 2u32.pow(k)).min(Duration::from_millis(120_000));
            assert_eq!(e.rto(), expected, "after {k} back-offs");
        }
        e.rearm();
        assert_eq!(e.rto(), initial);
    }
}
