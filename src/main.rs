use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use udp_talk::cli::Cli;
use udp_talk::session::{self, SessionConfig};
use udp_talk::transport::{Peer, UdpTransport};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Diagnostics go to stderr; stdout carries only the chat transcript.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let transport = UdpTransport::bind(cli.local_port).await?;
    let peer = Peer::resolve(&cli.remote_host, cli.remote_port).await?;
    let local_addr = transport.local_addr()?;
    info!(%local_addr, peer = %peer.addr, "socket bound and peer resolved");

    println!("listening on {local_addr}; peer is {peer} ({})", peer.addr);

    let config = SessionConfig {
        peer,
        idle_timeout: cli.idle_timeout.map(Duration::from_secs),
    };
    let input = BufReader::new(tokio::io::stdin());
    session::run(config, transport, input, tokio::io::stdout()).await?;

    // A pending terminal read cannot be aborted once issued; exit directly
    // rather than waiting out a read that may never complete.
    std::process::exit(0)
}
