//! Federation node binary.
//!
//! Runs a streaming XML federation node: accepts inbound federation
//! connections, dials configured peers, and drives each connection's
//! session until its stream closes.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod reactor;

use config::NodeConfig;

/// Streaming XML federation node
#[derive(Parser, Debug)]
#[command(name = "fedlink", version, about = "Streaming XML federation node")]
struct Args {
    /// Listen address, e.g. 0.0.0.0:5269 (overrides the configured port)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Connect to address, e.g. 10.0.0.2:5269 (repeatable)
    #[arg(long)]
    connect: Vec<SocketAddr>,

    /// Destination domain for --connect peers
    #[arg(long, requires = "connect")]
    remote_domain: Option<String>,

    /// Local domain, used as the origin of outbound streams
    #[arg(long)]
    domain: Option<String>,

    /// Idle timeout, e.g. 300s
    #[arg(long)]
    idle_timeout: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "fedlink.yaml")]
    config: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("fedlink={}", args.log_level).parse()?)
        .add_directive(format!("fedlink_session={}", args.log_level).parse()?)
        .add_directive(format!("fedlink_stream={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!("Starting fedlink v{}", env!("CARGO_PKG_VERSION"));

    let mut node_config = NodeConfig::load_from_file(&args.config)?;
    if let Some(domain) = args.domain {
        node_config.domain = domain;
    }

    let idle_timeout = args
        .idle_timeout
        .map(Duration::from)
        .unwrap_or_else(|| Duration::from_secs(node_config.idle_timeout_secs));

    let listen_addr = args.listen.unwrap_or_else(|| {
        SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            node_config.listen_port,
        )
    });

    let listener = tokio::spawn(async move {
        if let Err(e) = reactor::run_listener(listen_addr, idle_timeout).await {
            warn!("Listener error: {:#}", e);
        }
    });

    // CLI peers share one remote domain; configured peers carry their own.
    for connect_addr in &args.connect {
        let destination = match &args.remote_domain {
            Some(domain) => domain.clone(),
            None => {
                anyhow::bail!("--connect requires --remote-domain");
            }
        };
        spawn_outbound(*connect_addr, node_config.domain.clone(), destination, idle_timeout);
    }

    for peer in &node_config.peers {
        match peer.addr.parse::<SocketAddr>() {
            Ok(addr) => {
                spawn_outbound(addr, node_config.domain.clone(), peer.domain.clone(), idle_timeout);
            }
            Err(e) => {
                warn!("Skipping peer {} with bad address {}: {}", peer.domain, peer.addr, e);
            }
        }
    }

    info!("Federation node started for domain {}", node_config.domain);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
        }
        _ = listener => {
            warn!("Listener task ended");
        }
    }

    info!("Federation node shutdown complete");
    Ok(())
}

fn spawn_outbound(addr: SocketAddr, origin: String, destination: String, idle_timeout: Duration) {
    tokio::spawn(async move {
        if let Err(e) = reactor::run_outbound(addr, origin, destination.clone(), idle_timeout).await {
            warn!("Outbound session to {} ({}) error: {:#}", addr, destination, e);
        }
    });
}
