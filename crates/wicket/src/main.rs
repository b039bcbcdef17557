mod cli;
mod error;

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use cli::Cli;
use error::CliError;
use wicket_proxy::{ProxyConfig, ProxyServer};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    if let Err(e) = serve(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn serve(cli: Cli) -> Result<(), CliError> {
    let config = ProxyConfig {
        bind_addr: SocketAddr::new(cli.bind, cli.port),
        connect_timeout: Duration::from_secs(cli.connect_timeout),
    };
    let server = ProxyServer::new(config)?;
    server.run().await?;
    Ok(())
}

fn setup_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = std::env::var("WICKET_LOG").unwrap_or_else(|_| level.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}
