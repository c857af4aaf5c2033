//! Async driver: one tokio task per connection.
//!
//! # Architecture
//!
//! ```text
//!  Collaborator                           event_loop task
//!      │  submit / deliver_ack /          ┌──────────────────────────┐
//!      │  timer_fired                     │ Connection<ChannelTx>    │
//!      │ ───── Event (mpsc, ordered) ───▶ │   ├── SegmentStore       │
//!      │                                  │   ├── CongestionCtl      │
//!      │ ◀──── Output (unbounded) ─────── │   ├── RttEstimator       │
//!      │  Transmit(segment) / Abort       │   └── RetransmissionTimer│
//!                                         │ tokio::time::Sleep (RTO) │
//!                                         └──────────────────────────┘
//! ```
//!
//! All mutation happens inside the task, one event at a time, so ACKs and
//! timer expiries can never race.  Outputs leave on an unbounded channel so
//! the engine never waits while it is mid-update.
//!
//! The retransmission deadline is a single pinned `Sleep`.  Whenever the
//! engine's timer epoch changes the deadline is reset to `now + rto`; while
//! the timer is idle the `select!` branch is disabled.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::ack::AckOutcome;
use crate::config::EngineConfig;
use crate::connection::{Connection, Transmitter};
use crate::error::EngineError;
use crate::segment::Segment;
use crate::stats::ConnectionSnapshot;
use crate::timer::TimerState;

/// Capacity of the inbound event channel.
const EVENT_QUEUE: usize = 64;

/// Inputs accepted by the connection task.
#[derive(Debug)]
pub enum Event {
    Submit(Vec<u8>),
    Ack {
        ack: u32,
        window: u16,
        elapsed: Duration,
    },
    /// Externally clocked expiry, in addition to the task's own timer.
    TimerFired,
    Snapshot(oneshot::Sender<ConnectionSnapshot>),
}

/// Outputs produced by the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Transmit(Segment),
    Abort(EngineError),
}

/// [`Transmitter`] that forwards into the output channel.
#[derive(Debug)]
struct ChannelTransmitter {
    tx: mpsc::UnboundedSender<Output>,
}

impl Transmitter for ChannelTransmitter {
    fn transmit(&mut self, segment: &Segment) {
        // A dropped receiver means nobody is listening; the segment is lost
        // like any other and the timer will recover it.
        let _ = self.tx.send(Output::Transmit(segment.clone()));
    }

    fn abort(&mut self, reason: &EngineError) {
        let _ = self.tx.send(Output::Abort(reason.clone()));
    }
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

/// Handle returned by [`spawn`].
pub struct ConnectionHandle {
    events: mpsc::Sender<Event>,
    outputs: mpsc::UnboundedReceiver<Output>,
    task: JoinHandle<Result<ConnectionSnapshot, EngineError>>,
}

/// Start a connection task with `config`.
///
/// Must be called from within a tokio runtime.
pub fn spawn(config: EngineConfig) -> Result<ConnectionHandle, EngineError> {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let conn = Connection::new(config, ChannelTransmitter { tx: out_tx })?;
    let (ev_tx, ev_rx) = mpsc::channel(EVENT_QUEUE);
    let task = tokio::spawn(event_loop(conn, ev_rx));
    Ok(ConnectionHandle {
        events: ev_tx,
        outputs: out_rx,
        task,
    })
}

impl ConnectionHandle {
    /// Queue application data for transmission.
    pub async fn submit(&self, data: Vec<u8>) -> Result<(), EngineError> {
        self.send(Event::Submit(data)).await
    }

    /// Deliver one ACK with its externally measured RTT sample.
    pub async fn deliver_ack(
        &self,
        ack: u32,
        window: u16,
        elapsed: Duration,
    ) -> Result<(), EngineError> {
        self.send(Event::Ack { ack, window, elapsed }).await
    }

    /// Force a retransmission-timer expiry.
    pub async fn timer_fired(&self) -> Result<(), EngineError> {
        self.send(Event::TimerFired).await
    }

    /// Current state of the connection, after every earlier event.
    pub async fn snapshot(&self) -> Result<ConnectionSnapshot, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Snapshot(tx)).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Next segment to put on the wire, or the abort signal.
    ///
    /// Returns `None` once the task has ended and every output was drained.
    pub async fn next_output(&mut self) -> Option<Output> {
        self.outputs.recv().await
    }

    /// Non-blocking variant of [`next_output`](Self::next_output).
    pub fn try_next_output(&mut self) -> Option<Output> {
        self.outputs.try_recv().ok()
    }

    /// Stop feeding events and wait for the task to finish.
    ///
    /// Events already queued are processed first.  Returns the final snapshot,
    /// or the error that ended the task.
    pub async fn close(self) -> Result<ConnectionSnapshot, EngineError> {
        drop(self.events);
        self.task.await.map_err(|_| EngineError::Closed)?
    }

    async fn send(&self, event: Event) -> Result<(), EngineError> {
        self.events.send(event).await.map_err(|_| EngineError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn event_loop<T: Transmitter>(
    mut conn: Connection<T>,
    mut events: mpsc::Receiver<Event>,
) -> Result<ConnectionSnapshot, EngineError> {
    // A "disarmed" timer sits far in the future; the `armed` guard keeps
    // select! from acting on it.
    let far_future = Duration::from_secs(365 * 24 * 3600);
    let timer = tokio::time::sleep(far_future);
    tokio::pin!(timer);
    let mut scheduled_epoch: Option<u64> = None;

    loop {
        let armed = conn.timer_state() == TimerState::Armed;
        if armed {
            let epoch = conn.timer_epoch();
            if scheduled_epoch != Some(epoch) {
                timer.as_mut().reset(tok_now() + conn.rto());
                scheduled_epoch = Some(epoch);
            }
        } else {
            scheduled_epoch = None;
        }

        tokio::select! {
            biased;

            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    log::debug!("[driver] event channel closed; stopping");
                    break;
                };
                handle_event(&mut conn, event)?;
            }

            _ = &mut timer, if armed => {
                conn.timer_fired()?;
            }
        }
    }

    Ok(conn.snapshot())
}

fn handle_event<T: Transmitter>(conn: &mut Connection<T>, event: Event) -> Result<(), EngineError> {
    match event {
        Event::Submit(data) => {
            conn.submit(&data)?;
        }
        Event::Ack { ack, window, elapsed } => {
            if conn.deliver_ack(ack, window, elapsed)? == AckOutcome::Invalid {
                log::debug!("[driver] dropped invalid ack={ack}");
            }
        }
        Event::TimerFired => {
            conn.timer_fired()?;
        }
        Event::Snapshot(reply) => {
            let _ = reply.send(conn.snapshot());
        }
    }
    Ok(())
}

/// `tokio::time::Instant::now()`, shortened.
#[inline]
fn tok_now() -> tokio::time::Instant {
    tokio::time::Instant::now()
}
