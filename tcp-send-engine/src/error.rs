//! Error taxonomy of the send engine.
//!
//! Stale and invalid acknowledgements are *not* errors: they are reported as
//! [`crate::ack::AckOutcome`] variants and absorbed as congestion signals.
//! Only conditions the caller must act on live here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A segment was still unacknowledged after the retry ceiling.
    /// Fatal to the connection; surfaced through `abort`.
    #[error("segment seq={seq} exceeded {max_retries} retransmissions")]
    RetryExhausted { seq: u32, max_retries: u8 },

    /// The connection already aborted; no further input is accepted.
    #[error("connection aborted")]
    Aborted,

    /// The configuration violates a window or timeout invariant.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The driver task has stopped and its channel is closed.
    #[error("connection task closed")]
    Closed,
}
