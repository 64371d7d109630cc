//! Spawns a small Naimi–Trehel network, lets it run for a fixed duration
//! or until interrupted, and reports the final message/request counters.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use token_mutex::{Config, Supervisor};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// How long to let the network run before shutting it down, in seconds.
    #[arg(short, long, default_value_t = 30)]
    run_seconds: u64,

    /// Per-node request rate (Exp(activity_rate)); overrides the config default.
    #[arg(short, long)]
    activity_rate: Option<f64>,

    /// Failures per second (Exp(failure_rate)); `0` disables failure injection.
    #[arg(short, long, default_value_t = 0.0)]
    failure_rate: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Cli::parse();

    let mut config = Config {
        failure_rate: args.failure_rate,
        ..Config::default()
    };
    if let Some(rate) = args.activity_rate {
        config.activity_rate = rate;
    }

    // Mirrors the reference's five-node tree: 3 is the root, 4/2/5 hang
    // directly off it, and 1 hangs off 2.
    let mut supervisor = Supervisor::new(config);
    supervisor.add_node(3, None, None)?;
    supervisor.add_node(4, Some(3), None)?;
    supervisor.add_node(2, Some(3), None)?;
    supervisor.add_node(5, Some(3), None)?;
    supervisor.add_node(1, Some(2), None)?;

    tracing::info!(
        "starting network, running for {}s (Ctrl-C to stop early)",
        args.run_seconds
    );
    supervisor.start().await;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.run_seconds)) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
    }

    let (messages_sent, requests_issued) = supervisor.stop().await;
    println!("messages_sent={messages_sent} requests_issued={requests_issued}");

    Ok(())
}
