//! Outstanding segments and sequence-number arithmetic.
//!
//! A [`Segment`] is one unit of sent-but-unacknowledged data.  It is created
//! by the transmit scheduler, lives in the [`crate::store::SegmentStore`] and
//! is dropped once a cumulative ACK covers its last byte.
//!
//! Sequence numbers are u32 and wrap around; comparisons use the convention
//! that two numbers are "close" when their difference is below `u32::MAX / 2`.

use std::fmt;

/// Bit-flag constants for [`Segment::flags`].
///
/// The engine never interprets these beyond stamping `ACK` on data segments;
/// framing is the collaborator's job.
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
    pub const ECE: u8 = 0x40;
    pub const CWR: u8 = 0x80;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `a <= b` in wrap-around sequence space.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) <= (u32::MAX / 2)
}

/// `a < b` in wrap-around sequence space.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    a != b && seq_le(a, b)
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One outstanding unit of sent data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Sequence number of the first payload byte.
    pub seq: u32,
    /// Acknowledgement number echoed to the peer when the segment was built.
    pub ack: u32,
    /// Receive window echoed to the peer when the segment was built.
    pub window: u32,
    /// Control bits; opaque to the engine.
    pub flags: u8,
    /// Payload bytes; `len()` is derived from this.
    pub payload: Vec<u8>,
    /// Set once the segment has been sent more than once (Karn's algorithm).
    pub retransmitted: bool,
    /// Number of retransmissions so far.
    pub retry_count: u8,
    /// Reserved for selective acknowledgement.
    pub sacked: bool,
}

impl Segment {
    /// Build a fresh, never-retransmitted segment.
    pub fn new(seq: u32, payload: Vec<u8>, flags: u8) -> Self {
        Self {
            seq,
            ack: 0,
            window: 0,
            flags,
            payload,
            retransmitted: false,
            retry_count: 0,
            sacked: false,
        }
    }

    /// Payload length in sequence-space bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.payload.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// First sequence number *after* this segment.
    #[inline]
    pub fn end(&self) -> u32 {
        self.seq.wrapping_add(self.len())
    }

    /// `true` when a cumulative `ack` covers every byte of this segment.
    #[inline]
    pub fn is_acked_by(&self, ack: u32) -> bool {
        seq_le(self.end(), ack)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SEQ={}, ACK={}, LEN={}, FLAGS=0x{:02x}",
            self.seq,
            self.ack,
            self.len(),
            self.flags
        )?;
        if self.retransmitted {
            f.write_str(" [RETRANS]")?;
        }
        if self.sacked {
            f.write_str(" [SACKED]")?;
        }
        Ok(())
    }
}
