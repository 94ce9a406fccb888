#![forbid(unsafe_code)]

use std::os::unix::net::UnixListener;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use remopt_block::{LoopUnroll, Optimizer, Passthrough};
use remopt_exchange::{Endpoints, ExchangeConfig, Reactor};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Pass {
    /// Return every block unchanged.
    Passthrough,
    /// Unroll blocks that branch back to their own start.
    LoopUnroll,
}

#[derive(Debug, Parser)]
#[command(
    name = "remopt-optimizer",
    about = "Serve basic-block optimization requests from instrumented processes"
)]
struct Args {
    /// Unix socket to listen on. Removed once every client has connected.
    #[arg(long)]
    socket: PathBuf,

    /// Number of clients to accept before serving.
    #[arg(long, default_value_t = 1)]
    clients: usize,

    #[arg(long, value_enum, default_value_t = Pass::Passthrough)]
    pass: Pass,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ExchangeConfig::from_env().context("invalid REMOPT_* configuration")?;

    let optimizer: Box<dyn Optimizer> = match args.pass {
        Pass::Passthrough => Box::new(Passthrough),
        Pass::LoopUnroll => Box::new(LoopUnroll),
    };
    let mut reactor = Reactor::new(optimizer, config);

    let listener = UnixListener::bind(&args.socket)
        .with_context(|| format!("bind {}", args.socket.display()))?;
    tracing::info!(
        socket = %args.socket.display(),
        clients = args.clients,
        pass = ?args.pass,
        "listening"
    );
    for _ in 0..args.clients {
        let (stream, _) = listener.accept().context("accept client")?;
        let endpoints = Endpoints::from_stream(stream).context("split client socket")?;
        reactor.add_connection(endpoints);
    }
    drop(listener);
    if let Err(err) = std::fs::remove_file(&args.socket) {
        tracing::warn!("failed to remove {}: {err}", args.socket.display());
    }

    let report = reactor.run();
    tracing::info!(
        blocks = report.blocks_served,
        instructions = report.instructions,
        patches = report.patches,
        aborted = report.aborted,
        "optimizer finished"
    );
    Ok(())
}
