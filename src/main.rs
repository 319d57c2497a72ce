//! Split-key API gateway.
//!
//! Clients hold one half of a third-party API secret; the credential store holds
//! the other. The gateway rebuilds the secret only for requests that pass
//! attestation, rate limiting and the destination whitelist.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────────┐
//!                      │                      KEYSHARE GATEWAY                     │
//!                      │                                                           │
//!   Client Request     │  ┌─────────┐   ┌──────────┐   ┌────────────┐   ┌────────┐ │
//!   ───────────────────┼─▶│  http   │──▶│  proxy   │──▶│credentials │──▶│security│ │
//!                      │  │ server  │   │ request  │   │   store    │   │  rate  │ │
//!                      │  └─────────┘   └──────────┘   └────────────┘   └───┬────┘ │
//!                      │                                                    ▼      │
//!                      │  ┌─────────┐   ┌──────────┐   ┌────────────┐ ┌──────────┐ │
//!   Client Response    │  │  proxy  │◀──│  secret  │◀──│ whitelist  │◀│attestat- │ │
//!   ◀──────────────────┼──│ forward │   │reconstruct   │  + block   │ │   ion    │ │
//!                      │  └────┬────┘   └──────────┘   └────────────┘ └──────────┘ │
//!                      │       └──▶ destination API        usage ◀── spawned event  │
//!                      │                                                           │
//!                      │   config · observability · lifecycle (cross-cutting)      │
//!                      └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use keyshare_proxy::config::load_config;
use keyshare_proxy::lifecycle::{signals, Gateway, Shutdown};
use keyshare_proxy::observability::{logging, metrics};
use keyshare_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "keyshare-proxy", version, about = "Split-key API gateway")]
struct Cli {
    /// Path to the gateway configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability);
    tracing::info!("keyshare-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        config = ?cli.config,
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let Gateway {
        gateway,
        store,
        watcher: _watcher,
        ..
    } = Gateway::build(&config)?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));
    tokio::spawn(signals::reload_on_hangup(store, shutdown.clone()));

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config, gateway);

    match tls {
        Some(tls) => {
            let addr: SocketAddr = bind_address.parse()?;
            server.run_tls(addr, &tls, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
