//! Ringflow Application
//!
//! Command-line entry point for the Ringflow smart ring.
//!
//! # Usage
//!
//! ```bash
//! # Connect to the first advertising ring and stream control events
//! ringflow
//!
//! # Include per-sample diagnostics
//! ringflow run --raw
//!
//! # List advertising rings
//! ringflow devices --duration 10
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use ringflow_core::types::ControlEvent;
use ringflow_host::ble::scan_for_rings;
use ringflow_host::session::{RingEvent, RingSession, SessionConfig};

/// Ringflow smart ring CLI
#[derive(Parser, Debug)]
#[command(name = "ringflow")]
#[command(author, version, about = "Ringflow smart ring controller", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to a ring and stream control events (default)
    Run {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        scan_duration: u64,

        /// Print per-sample diagnostics
        #[arg(long)]
        raw: bool,

        /// Disable the single automatic reconnect attempt
        #[arg(long)]
        no_reconnect: bool,
    },

    /// List advertising rings
    Devices {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Ringflow v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        None => run(5, false, false).await,
        Some(Commands::Run {
            scan_duration,
            raw,
            no_reconnect,
        }) => run(scan_duration, raw, no_reconnect).await,
        Some(Commands::Devices { duration }) => list_devices(duration).await,
    }
}

/// Connect to a ring and stream events until Ctrl-C.
async fn run(scan_duration: u64, raw: bool, no_reconnect: bool) -> anyhow::Result<()> {
    let config = SessionConfig {
        scan_duration: Duration::from_secs(scan_duration),
        auto_reconnect: !no_reconnect,
        forward_raw_samples: raw,
        ..Default::default()
    };

    let (session, mut events) = RingSession::connect(config).await?;
    info!("session up; wave at the ring, then rotate once to wake it");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(RingEvent::Control(control)) => print_control(control),
                Some(RingEvent::State(state)) => debug!("state: {state:?}"),
                Some(RingEvent::Raw(snapshot)) => debug!(
                    "sample x={} y={} z={} pos={:.3} diff={:.3} net={:.2} tap={} dt={}ms",
                    snapshot.raw_x,
                    snapshot.raw_y,
                    snapshot.raw_z,
                    snapshot.filtered_scroll_pos,
                    snapshot.filtered_scroll_diff,
                    snapshot.filtered_net_g,
                    snapshot.is_tap,
                    snapshot.delta_ms,
                ),
                None => {
                    info!("event stream closed");
                    break;
                }
            }
        }
    }

    session.disconnect().await;
    Ok(())
}

fn print_control(event: ControlEvent) {
    match event {
        ControlEvent::ScrollUp => info!("scroll up"),
        ControlEvent::ScrollDown => info!("scroll down"),
        ControlEvent::ProvisionalWakeupIntent => info!("wave seen; rotate once to wake"),
        ControlEvent::ProvisionalSelectionIntent => info!("tap seen; rotate once to select"),
        ControlEvent::VerifyIntent25 => info!("rotation 25%"),
        ControlEvent::VerifyIntent50 => info!("rotation 50%"),
        ControlEvent::VerifyIntent75 => info!("rotation 75%"),
        ControlEvent::ConfirmWakeupIntent => info!("awake"),
        ControlEvent::ConfirmSelectionIntent => info!("selected"),
        ControlEvent::CancelIntent => info!("cancelled"),
        ControlEvent::Timeout => info!("timed out"),
    }
}

/// Scan and print every advertising ring.
async fn list_devices(duration: u64) -> anyhow::Result<()> {
    let rings = scan_for_rings(Duration::from_secs(duration)).await?;
    if rings.is_empty() {
        info!("no rings found");
        return Ok(());
    }
    for ring in rings {
        match ring.rssi {
            Some(rssi) => info!("{} @ {} ({} dBm)", ring.name, ring.address, rssi),
            None => info!("{} @ {}", ring.name, ring.address),
        }
    }
    Ok(())
}
