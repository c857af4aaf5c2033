//! Per-connection counters and a printable state snapshot.
//!
//! Counters are plain fields on the connection, never process globals, so two
//! connections in one process report independently.

use std::fmt;
use std::time::Duration;

use crate::congestion::{CongestionPhase, CongestionState};
use crate::timer::TimerState;

/// Cumulative event counters for one connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Segments handed to the network, first sends and retransmissions.
    pub packets_sent: u64,
    /// Payload bytes handed to the network.
    pub bytes_sent: u64,
    /// Segments re-sent by the retransmission timer.
    pub retransmits: u64,
    /// Retransmission timer expiries that found data outstanding.
    pub timeouts: u64,
    /// ACKs that advanced `snd_una`.
    pub acks: u64,
    /// ACKs at or below `snd_una`.
    pub dup_acks: u64,
    /// ACKs beyond `snd_nxt`, discarded.
    pub invalid_acks: u64,
    /// RTT samples accepted by the estimator.
    pub rtt_samples: u64,
    /// Payload bytes covered by cumulative ACKs.
    pub bytes_acked: u64,
}

impl ConnectionStats {
    pub(crate) fn on_transmit(&mut self, len: u32, retransmission: bool) {
        self.packets_sent += 1;
        self.bytes_sent += u64::from(len);
        if retransmission {
            self.retransmits += 1;
        }
    }
}

/// Point-in-time view of a connection, suitable for logging or reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub stats: ConnectionStats,
    pub congestion: CongestionState,
    pub phase: CongestionPhase,
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub rcv_wnd: u32,
    pub srtt: Duration,
    pub rttvar: Duration,
    pub rto: Duration,
    pub timer: TimerState,
    pub outstanding_segments: usize,
    pub outstanding_bytes: u64,
    pub pending_bytes: usize,
}

impl fmt::Display for ConnectionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "TCP send statistics")?;
        writeln!(f, "===================")?;
        writeln!(f, "Timer:                {}", self.timer)?;
        writeln!(f, "Phase:                {}", self.phase)?;
        writeln!(f, "Packets sent:         {}", s.packets_sent)?;
        writeln!(f, "Bytes sent:           {}", s.bytes_sent)?;
        writeln!(f, "Bytes acknowledged:   {}", s.bytes_acked)?;
        writeln!(f, "Retransmissions:      {}", s.retransmits)?;
        writeln!(f, "Timeouts:             {}", s.timeouts)?;
        writeln!(
            f,
            "ACKs:                 {} new, {} duplicate, {} invalid",
            s.acks, s.dup_acks, s.invalid_acks
        )?;
        writeln!(f, "Current window:       {}", self.congestion.cwnd)?;
        writeln!(f, "Slow start threshold: {}", self.congestion.ssthresh)?;
        writeln!(
            f,
            "RTT:                  {}ms (var={}ms)",
            self.srtt.as_millis(),
            self.rttvar.as_millis()
        )?;
        writeln!(f, "RTO:                  {}ms", self.rto.as_millis())?;
        write!(
            f,
            "Sequence:             una={} nxt={} ({} segment(s), {} byte(s) outstanding)",
            self.snd_una, self.snd_nxt, self.outstanding_segments, self.outstanding_bytes
        )
    }
}
