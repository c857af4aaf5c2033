//! Entry point for `tcp-send-engine`.
//!
//! Parses CLI arguments and dispatches into one of two modes:
//! - **simulate**: push a payload through the async driver and a seeded
//!   lossy peer, then print the sender's statistics;
//! - **replay**: step a connection by hand through a fixed sequence of
//!   sends, ACKs and a timeout, printing every segment.
//!
//! All protocol work is delegated to the library; `main.rs` owns only process
//! setup (logging, argument parsing).

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use tcp_send_engine::simulator::{self, SimulatorConfig};
use tcp_send_engine::{Connection, EngineConfig, Recorder};

/// Send-side TCP congestion control and retransmission engine.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Transfer data to a simulated lossy peer.
    Simulate {
        /// Payload size in bytes.
        #[arg(short, long, default_value_t = 100_000)]
        bytes: usize,
        /// Probability that a segment is dropped.
        #[arg(long, default_value_t = 0.05)]
        loss: f64,
        /// Probability that a segment is delivered twice.
        #[arg(long, default_value_t = 0.0)]
        duplicate: f64,
        /// Mean simulated round-trip time in milliseconds.
        #[arg(long, default_value_t = 100)]
        rtt_ms: u64,
        /// Maximum RTT deviation in milliseconds.
        #[arg(long, default_value_t = 20)]
        jitter_ms: u64,
        /// RNG seed for the fault model.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Replay a fixed send / ACK / timeout sequence and print each step.
    Replay {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// Engine tunables shared by every mode.
#[derive(Args)]
struct EngineArgs {
    /// Maximum segment size in bytes.
    #[arg(long, default_value_t = 1460)]
    mss: u32,
    /// Initial congestion window in segments.
    #[arg(long, default_value_t = 10)]
    initial_cwnd: u32,
    /// Initial slow-start threshold in bytes.
    #[arg(long, default_value_t = 65_535)]
    ssthresh: u32,
    /// Lower RTO bound in milliseconds.
    #[arg(long, default_value_t = 1000)]
    rto_min_ms: u64,
    /// Upper RTO bound in milliseconds.
    #[arg(long, default_value_t = 120_000)]
    rto_max_ms: u64,
    /// Retransmissions allowed per segment before aborting.
    #[arg(long, default_value_t = 5)]
    max_retries: u8,
}

impl EngineArgs {
    fn to_config(&self) -> EngineConfig {
        EngineConfig {
            mss: self.mss,
            initial_cwnd_segments: self.initial_cwnd,
            initial_ssthresh: self.ssthresh,
            rto_min: Duration::from_millis(self.rto_min_ms),
            rto_max: Duration::from_millis(self.rto_max_ms),
            max_retries: self.max_retries,
            ..EngineConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Simulate {
            bytes,
            loss,
            duplicate,
            rtt_ms,
            jitter_ms,
            seed,
            engine,
        } => {
            if !(0.0..=1.0).contains(&loss) || !(0.0..=1.0).contains(&duplicate) {
                bail!("--loss and --duplicate must be within [0, 1]");
            }
            let engine = engine.to_config();
            engine.validate()?;
            let sim = SimulatorConfig {
                loss_rate: loss,
                duplicate_rate: duplicate,
                base_rtt: Duration::from_millis(rtt_ms),
                jitter: Duration::from_millis(jitter_ms),
                window: u16::MAX,
                seed,
            };
            log::info!("Simulating {bytes} byte transfer (loss={loss}, seed={seed})");
            let report = simulator::run_transfer(engine, sim, bytes).await?;
            println!("{}", report.sender);
            println!(
                "Peer: {} received, {} dropped, {} duplicated, {} out of order",
                report.peer.received,
                report.peer.dropped,
                report.peer.duplicated,
                report.peer.out_of_order
            );
            if !report.intact {
                bail!("peer reassembled a corrupted byte stream");
            }
        }
        Mode::Replay { engine } => replay(engine.to_config())?,
    }

    Ok(())
}

/// Drive a connection through a normal burst, a timeout, and recovery.
fn replay(config: EngineConfig) -> Result<()> {
    let mss = config.mss as usize;
    let burst = mss * config.initial_cwnd_segments as usize;
    let mut conn = Connection::new(config, Recorder::default())?;

    println!("Normal transmission");
    println!("===================");
    let sent = conn.submit(&simulator::test_payload(burst, mss as u32))?;
    println!("Created {sent} segment(s), cwnd_available={}", conn.cwnd_available());
    print_sent(&mut conn);

    let rtt = Duration::from_millis(100);
    for ack in [conn.snd_una() + 5000, conn.snd_una() + 10_000] {
        let outcome = conn.deliver_ack(ack, u16::MAX, rtt)?;
        println!("ACK {ack}: {outcome:?} (cwnd={})", conn.congestion().cwnd);
    }
    print_sent(&mut conn);

    println!();
    println!("Retransmission");
    println!("==============");
    conn.submit(&simulator::test_payload(burst, mss as u32))?;
    print_sent(&mut conn);
    let resent = conn.timer_fired()?;
    println!("Timer expired: {resent} segment(s) retransmitted, rto={:?}", conn.rto());
    print_sent(&mut conn);
    let ack = conn.snd_nxt();
    let outcome = conn.deliver_ack(ack, u16::MAX, rtt)?;
    println!("ACK {ack}: {outcome:?}");

    println!();
    println!("{}", conn.snapshot());
    Ok(())
}

fn print_sent(conn: &mut Connection<Recorder>) {
    for segment in conn.transmitter_mut().take() {
        println!("  {segment}");
    }
}
