//! `tcp-send-engine` implements the send side of TCP data transfer as a pure
//! state machine covering the congestion window, RTT estimation, the
//! retransmission queue and a retransmission timer with exponential back-off.
//!
//! # Architecture
//!
//! ```text
//!   submit(data)   deliver_ack(ack, wnd, rtt)   timer_fired()
//!        │                   │                        │
//!  ┌─────▼──────────┐ ┌──────▼───────┐ ┌──────────────▼──────┐
//!  │ TransmitSched. │ │ AckProcessor │ │ RetransmissionTimer │
//!  └─────┬──────────┘ └──┬───┬───┬───┘ └───┬──────────┬──────┘
//!        │               │   │   │         │          │
//!        │     ┌─────────┘   │   └───────┐ │          │
//!  ┌─────▼─────▼──┐  ┌───────▼──────┐  ┌─▼─▼──────────▼─┐
//!  │ SegmentStore │  │ RttEstimator │  │ CongestionCtl  │
//!  └──────────────┘  └──────────────┘  └────────────────┘
//!        │
//!        ▼  transmit(segment) / abort(reason)
//!   Transmitter (network collaborator)
//! ```
//!
//! Each module has a single responsibility:
//! - [`store`]      : ordered retransmission queue
//! - [`rtt`]        : Jacobson/Karels RTT and RTO estimation
//! - [`congestion`] : slow start, congestion avoidance, fast recovery
//! - [`scheduler`]  : window-limited segmentation of application data
//! - [`ack`]        : cumulative ACK classification and processing
//! - [`timer`]      : retransmission timer and retry ceiling
//! - [`connection`] : the per-connection aggregate and its inputs
//! - [`driver`]     : tokio task serialising one connection's events
//! - [`simulator`]  : seeded lossy peer for tests and the CLI
//! - [`config`], [`error`], [`stats`], [`segment`]: supporting types

pub mod ack;
pub mod config;
pub mod congestion;
pub mod connection;
pub mod driver;
pub mod error;
pub mod rtt;
pub mod scheduler;
pub mod segment;
pub mod simulator;
pub mod stats;
pub mod store;
pub mod timer;

pub use ack::AckOutcome;
pub use config::EngineConfig;
pub use congestion::{CongestionController, CongestionPhase, CongestionState};
pub use connection::{Connection, Recorder, Transmitter};
pub use error::EngineError;
pub use rtt::RttEstimator;
pub use segment::Segment;
pub use stats::{ConnectionSnapshot, ConnectionStats};
pub use store::SegmentStore;
pub use timer::{RetransmissionTimer, TimerState};
