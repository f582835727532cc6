use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use wsboot::{ClientConfig, DEFAULT_ENDPOINT, Endpoint, SessionBootstrapClient};

mod logging;

/// Connect to a WebSocket endpoint and print the session id it assigns.
#[derive(Debug, Parser)]
#[command(name = "wsboot", version, about)]
struct Cli {
    /// WebSocket endpoint (ws:// only)
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    url: String,

    /// Seconds allowed for TCP connect plus the opening handshake
    #[arg(long, default_value_t = 30)]
    handshake_timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let endpoint = Endpoint::parse(&cli.url).with_context(|| format!("bad --url {}", cli.url))?;
    let config = ClientConfig::new()
        .with_endpoint(endpoint)
        .with_handshake_timeout(Duration::from_secs(cli.handshake_timeout));

    info!(endpoint = %config.endpoint, "connecting");
    let mut client = SessionBootstrapClient::connect(config);
    tokio::select! {
        () = follow(&mut client) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("listening for ctrl-c")?;
            warn!("interrupted");
        }
    }
    client.shutdown().await;

    match client.session() {
        Some(_) => Ok(ExitCode::SUCCESS),
        None => {
            warn!(phase = %client.phase(), "no session acquired");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print the session id as soon as it arrives, then stay on the connection
/// until it closes.
async fn follow(client: &mut SessionBootstrapClient) {
    if let Some(id) = client.wait_for_session().await {
        println!("{id}");
    }
    client.run().await;
}
