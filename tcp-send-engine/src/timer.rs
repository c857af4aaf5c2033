//! Retransmission timer.
//!
//! The timer itself holds no clock.  It records whether a deadline *should*
//! be pending and bumps an epoch every time it is (re)armed, so whatever owns
//! real time (the tokio [`crate::driver`], a test, a simulator) knows when to
//! restart its countdown with [`Connection::rto`].
//!
//! ```text
//!            send            fire: retransmit, back off
//!   Idle ──────────▶ Armed ──────────────────────────────▶ Armed
//!    ▲                 │  \
//!    └─── all acked ───┘   \── fire: retry ceiling hit ──▶ Aborted
//! ```
//!
//! On expiry every outstanding segment is re-sent and its retry count
//! incremented.  A segment whose count exceeds the ceiling aborts the
//! connection; otherwise the RTO doubles (capped at `RTO_MAX`) and the timer
//! is rearmed.

use std::fmt;

use crate::connection::{Connection, Transmitter};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Nothing outstanding; no deadline pending.
    Idle,
    /// Waiting for the current RTO to elapse.
    Armed,
    /// Retry ceiling exceeded.  Terminal.
    Aborted,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone)]
pub struct RetransmissionTimer {
    state: TimerState,
    epoch: u64,
    max_retries: u8,
}

impl RetransmissionTimer {
    pub fn new(max_retries: u8) -> Self {
        Self {
            state: TimerState::Idle,
            epoch: 0,
            max_retries,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }

    /// Start (or restart) the countdown.  No effect once aborted.
    pub fn arm(&mut self) {
        if self.state == TimerState::Aborted {
            return;
        }
        self.state = TimerState::Armed;
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Cancel the pending deadline.  No effect once aborted.
    pub fn disarm(&mut self) {
        if self.state != TimerState::Aborted {
            self.state = TimerState::Idle;
        }
    }

    fn abort(&mut self) {
        self.state = TimerState::Aborted;
    }
}

impl<T: Transmitter> Connection<T> {
    /// Handle expiry of the retransmission timer.
    ///
    /// Returns the number of segments retransmitted.  A fire with nothing
    /// outstanding is spurious and ignored.  Exceeding the retry ceiling
    /// reports [`EngineError::RetryExhausted`] to the transmitter's `abort`
    /// and to the caller; the connection then refuses further input.
    pub fn timer_fired(&mut self) -> Result<usize, EngineError> {
        match self.timer.state() {
            TimerState::Aborted => return Err(EngineError::Aborted),
            TimerState::Idle => {
                log::debug!("[rto] spurious fire while idle");
                return Ok(0);
            }
            TimerState::Armed => {}
        }
        if self.store.is_empty() {
            self.timer.disarm();
            return Ok(0);
        }

        self.stats.timeouts += 1;
        self.cc.on_timeout();

        let max_retries = self.timer.max_retries();
        let mut exhausted = None;
        let mut resent = 0usize;
        for segment in self.store.iter_unacked_mut() {
            segment.retry_count = segment.retry_count.saturating_add(1);
            if segment.retry_count > max_retries {
                exhausted = Some(segment.seq);
                break;
            }
            segment.retransmitted = true;
            self.net.transmit(segment);
            self.stats.on_transmit(segment.len(), true);
            resent += 1;
        }

        if let Some(seq) = exhausted {
            let err = EngineError::RetryExhausted { seq, max_retries };
            log::warn!("[rto] {err}; aborting connection");
            self.timer.abort();
            // The connection is dead; nothing outstanding will be re-sent.
            self.store = Default::default();
            self.net.abort(&err);
            return Err(err);
        }

        self.rtt.backoff();
        self.timer.arm();
        log::debug!(
            "[rto] timeout, retransmitted {} segment(s), cwnd={} rto={}ms",
            resent,
            self.cc.cwnd(),
            self.rtt.rto().as_millis()
        );
        Ok(resent)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::EngineConfig;
    use crate::connection::Recorder;

    fn loaded(segments: usize) -> Connection<Recorder> {
        let mut c = Connection::new(EngineConfig::default(), Recorder::default()).unwrap();
        c.submit(&vec![0u8; segments * 1460]).unwrap();
        c.transmitter_mut().take();
        c
    }

    #[test]
    fn arm_bumps_epoch() {
        let mut t = RetransmissionTimer::new(5);
        assert_eq!(t.state(), TimerState::Idle);
        t.arm();
        t.arm();
        assert_eq!(t.epoch(), 2);
        t.disarm();
        assert_eq!(t.state(), TimerState::Idle);
    }

    #[test]
    fn fire_retransmits_everything_outstanding() {
        let mut c = loaded(3);
        assert_eq!(c.timer_fired().unwrap(), 3);

        let sent = c.transmitter_mut().take();
        assert_eq!(sent.iter().map(|s| s.seq).collect::<Vec<_>>(), vec![1000, 2460, 3920]);
        assert!(sent.iter().all(|s| s.retransmitted && s.retry_count == 1));

        let cc = c.congestion();
        assert_eq!(cc.cwnd, 1460);
        assert_eq!(cc.ssthresh, 7300);
        assert_eq!(c.stats().timeouts, 1);
        assert_eq!(c.stats().retransmits, 3);
        assert_eq!(c.timer_state(), TimerState::Armed);
    }

    #[test]
    fn spurious_fire_is_ignored() {
        let mut c = Connection::new(EngineConfig::default(), Recorder::default()).unwrap();
        assert_eq!(c.timer_fired().unwrap(), 0);
        assert_eq!(c.congestion().cwnd, 14_600);
        assert_eq!(c.stats().timeouts, 0);
    }

    #[test]
    fn rto_doubles_per_timeout() {
        let cfg = EngineConfig { max_retries: 20, ..EngineConfig::default() };
        let mut c = Connection::new(cfg, Recorder::default()).unwrap();
        c.submit(&[0u8; 100]).unwrap();
        let initial = c.rto();
        for k in 1..=10u32 {
            c.timer_fired().unwrap();
            let expected = (initial * 2u32.pow(k)).min(Duration::from_millis(120_000));
            assert_eq!(c.rto(), expected, "after {k} timeouts");
        }
    }

    #[test]
    fn sixth_fire_aborts_with_retry_exhausted() {
        let mut c = loaded(1);
        for _ in 0..5 {
            assert_eq!(c.timer_fired().unwrap(), 1);
        }
        assert_eq!(c.store().first().unwrap().retry_count, 5);

        let err = c.timer_fired().unwrap_err();
        assert_eq!(err, EngineError::RetryExhausted { seq: 1000, max_retries: 5 });
        assert_eq!(c.transmitter().aborted, Some(err));
        assert_eq!(c.timer_state(), TimerState::Aborted);
        assert!(c.is_aborted());
        assert_eq!(c.stats().retransmits, 5);
    }

    #[test]
    fn aborted_connection_refuses_input() {
        let mut c = loaded(1);
        for _ in 0..6 {
            let _ = c.timer_fired();
        }
        assert_eq!(c.timer_fired(), Err(EngineError::Aborted));
        assert_eq!(c.submit(b"more"), Err(EngineError::Aborted));
        assert_eq!(
            c.deliver_ack(2460, 100, Duration::from_millis(1)),
            Err(EngineError::Aborted)
        );
        assert_eq!(c.write(100), 0);
    }

    #[test]
    fn ack_after_abort_leaves_state_untouched() {
        let mut c = Connection::new(EngineConfig::default(), Recorder::default()).unwrap();
        c.submit(&[0u8; 100]).unwrap();
        for _ in 0..6 {
            let _ = c.timer_fired();
        }
        assert!(c.is_aborted());
        let before = c.snapshot();

        assert_eq!(
            c.deliver_ack(1050, 65_535, Duration::from_millis(10)),
            Err(EngineError::Aborted)
        );
        let after = c.snapshot();
        assert_eq!(after.snd_una, 1000);
        assert_eq!(after.congestion, before.congestion);
        assert_eq!(after.srtt, before.srtt);
        assert_eq!(after.stats, before.stats);
    }

    #[test]
    fn highest_retry_ceiling_still_aborts() {
        let cfg = EngineConfig { max_retries: u8::MAX, ..EngineConfig::default() };
        assert!(matches!(
            Connection::new(cfg, Recorder::default()),
            Err(EngineError::InvalidConfig(_))
        ));

        let cfg = EngineConfig { max_retries: u8::MAX - 1, ..EngineConfig::default() };
        let mut c = Connection::new(cfg, Recorder::default()).unwrap();
        c.submit(&[0u8; 10]).unwrap();
        for _ in 0..u8::MAX - 1 {
            c.timer_fired().unwrap();
        }
        assert!(matches!(c.timer_fired(), Err(EngineError::RetryExhausted { .. })));
        assert_eq!(c.timer_state(), TimerState::Aborted);
    }

    #[test]
    fn retry_count_survives_across_fires_until_acked() {
        let mut c = loaded(2);
        c.timer_fired().unwrap();
        c.timer_fired().unwrap();
        c.deliver_ack(2460, 65_535, Duration::from_millis(50)).unwrap();
        let head = c.store().first().unwrap();
        assert_eq!(head.seq, 2460);
        assert_eq!(head.retry_count, 2);
    }
}
