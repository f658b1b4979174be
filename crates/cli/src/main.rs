//! # Fanout DNS
//!
//! Standalone front end for the fan-out engine: listens on UDP and TCP and
//! races every in-zone query against the configured upstream set.

mod bootstrap;
mod server;

use clap::Parser;
use fanout_dns_infrastructure::dns::Fanout;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fanout-dns")]
#[command(version)]
#[command(about = "DNS fan-out forwarder: race queries against multiple upstreams")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "fanout-dns.toml")]
    config: PathBuf,

    /// Override the DNS listener port
    #[arg(short = 'p', long)]
    dns_port: Option<u16>,

    /// Override the bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = bootstrap::load_config(&cli.config)?;
    if let Some(port) = cli.dns_port {
        config.server.dns_port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    bootstrap::init_logging(&config);

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.dns_port)
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid bind address: {err}"))?;

    let fanout = Arc::new(
        Fanout::new(config.fanout)?.with_next(Arc::new(server::dns::RefusedHandler)),
    );
    server::start_dns_server(bind_addr, fanout).await
}
