//! Window-limited transmission of new data.
//!
//! [`TransmitScheduler`] holds the bytes the application has submitted but
//! the engine has not yet segmented.  [`Connection::write`] cuts them into
//! MSS-sized segments for as long as the congestion window has room for a
//! full segment:
//!
//! ```text
//!   cwnd_available = cwnd - (snd_nxt - snd_una)
//! ```
//!
//! When less than one MSS is available the call returns at once; the next
//! ACK that opens the window re-invokes it.

use std::collections::VecDeque;

use crate::connection::{Connection, Transmitter};
use crate::segment::{flags, Segment};
use crate::timer::TimerState;

/// Application bytes waiting for window space.
#[derive(Debug, Default, Clone)]
pub struct TransmitScheduler {
    buffer: VecDeque<u8>,
}

impl TransmitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Bytes waiting to be segmented.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Remove up to `len` bytes from the front of the buffer.
    pub fn take(&mut self, len: usize) -> Vec<u8> {
        let n = len.min(self.buffer.len());
        self.buffer.drain(..n).collect()
    }
}

/// Congestion budget left once `snd_nxt - snd_una` bytes are in flight.
#[inline]
pub fn cwnd_available(cwnd: u32, snd_una: u32, snd_nxt: u32) -> u32 {
    cwnd.saturating_sub(snd_nxt.wrapping_sub(snd_una))
}

impl<T: Transmitter> Connection<T> {
    /// Congestion budget left for new data, in bytes.
    pub fn cwnd_available(&self) -> u32 {
        cwnd_available(self.cc.cwnd(), self.snd_una, self.snd_nxt)
    }

    /// Segment and send up to `available_bytes` of buffered data.
    ///
    /// Each segment carries `mss` bytes except possibly the last.  Returns the
    /// number of segments created; zero when the window cannot hold a full
    /// MSS, the buffer is empty, or the connection has aborted.
    pub fn write(&mut self, available_bytes: usize) -> usize {
        if self.timer.state() == TimerState::Aborted {
            return 0;
        }
        let mss = self.config.mss;
        let mut remaining = available_bytes.min(self.scheduler.pending());
        let mut created = 0usize;

        while remaining > 0 && self.cwnd_available() >= mss {
            let len = remaining.min(mss as usize);
            let mut segment = Segment::new(self.snd_nxt, self.scheduler.take(len), flags::ACK);
            segment.ack = self.rcv_nxt;
            segment.window = self.rcv_wnd;

            self.snd_nxt = self.snd_nxt.wrapping_add(segment.len());
            remaining -= len;

            log::debug!(
                "[tx] → DATA seq={} len={} cwnd={} in_flight={}",
                segment.seq,
                segment.len(),
                self.cc.cwnd(),
                self.in_flight()
            );
            self.net.transmit(&segment);
            self.stats.on_transmit(segment.len(), false);
            self.store.insert(segment);
            created += 1;
        }

        if created > 0 && self.timer.state() == TimerState::Idle {
            self.timer.arm();
        }
        if remaining > 0 {
            log::trace!(
                "[tx] window closed: {} byte(s) held, cwnd_available={}",
                remaining,
                self.cwnd_available()
            );
        }
        created
    }
}
