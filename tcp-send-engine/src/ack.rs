//! Acknowledgement processing.
//!
//! `Connection::on_ack` classifies each cumulative ACK and updates the RTT
//! estimator, congestion controller and retransmission queue together:
//!
//! | ACK value                 | Classification | Effect                          |
//! |---------------------------|----------------|---------------------------------|
//! | `ack > snd_nxt`           | invalid        | discarded, logged               |
//! | `ack <= snd_una`          | duplicate      | congestion signal only          |
//! | `snd_una < ack <= snd_nxt`| new data       | sample RTT, clean queue, grow   |
//!
//! A new ACK also rearms the retransmission timer with the freshly estimated
//! RTO, or disarms it once nothing is outstanding.  Sending into the window it
//! frees is left to the caller ([`Connection::deliver_ack`] does it).

use std::time::Duration;

use crate::connection::{Connection, Transmitter};
use crate::segment::{seq_le, seq_lt};

/// How an incoming ACK was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The ACK advanced `snd_una`.
    NewData {
        /// Segments fully acknowledged and dropped from the queue.
        acked_segments: usize,
        /// Sequence space covered, including any partially acked head.
        acked_bytes: u32,
        /// Whether the RTT sample was accepted (false under Karn's rule).
        rtt_sampled: bool,
        /// Whether this ACK ended fast recovery.
        left_recovery: bool,
    },
    /// Stale ACK at or below `snd_una`; treated as a congestion signal.
    Duplicate,
    /// ACK for data never sent; discarded.
    Invalid,
}

impl<T: Transmitter> Connection<T> {
    /// Apply one cumulative acknowledgement.
    ///
    /// `elapsed` is the externally measured RTT of the oldest newly
    /// acknowledged segment.
    ///
    /// Callers go through [`Connection::deliver_ack`], which refuses input
    /// once the connection has aborted.
    pub(crate) fn on_ack(&mut self, ack: u32, window: u16, elapsed: Duration) -> AckOutcome {
        if seq_lt(self.snd_nxt, ack) {
            self.stats.invalid_acks += 1;
            log::warn!(
                "[ack] ← ACK ack={} beyond snd_nxt={}; discarded",
                ack,
                self.snd_nxt
            );
            return AckOutcome::Invalid;
        }

        if seq_le(ack, self.snd_una) {
            self.stats.dup_acks += 1;
            self.cc.on_duplicate_ack(self.snd_nxt);
            log::debug!(
                "[ack] ← dup ACK ack={} snd_una={} cwnd={}",
                ack,
                self.snd_una,
                self.cc.cwnd()
            );
            return AckOutcome::Duplicate;
        }

        self.rcv_wnd = u32::from(window);

        let retransmitted = self.store.first().is_some_and(|s| s.retransmitted);
        let rtt_sampled = self.rtt.sample(elapsed, retransmitted);
        if rtt_sampled {
            self.stats.rtt_samples += 1;
        }

        let removed = self.store.remove_range(ack);
        self.store.trim_head(ack);

        self.cc.on_new_ack();
        let left_recovery = self.cc.maybe_leave_recovery(ack);

        let acked_bytes = ack.wrapping_sub(self.snd_una);
        self.snd_una = ack;
        self.stats.acks += 1;
        self.stats.bytes_acked += u64::from(acked_bytes);

        // Fresh estimate for the next deadline; any back-off is forgotten.
        self.rtt.rearm();
        if self.store.is_empty() {
            self.timer.disarm();
        } else {
            self.timer.arm();
        }

        log::debug!(
            "[ack] ← ACK ack={} slid={} seg cwnd={} rto={}ms",
            ack,
            removed.len(),
            self.cc.cwnd(),
            self.rtt.rto().as_millis()
        );

        AckOutcome::NewData {
            acked_segments: removed.len(),
            acked_bytes,
            rtt_sampled,
            left_recovery,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
