#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use pushd::config::{Args, ServerConfig};
use pushd::rooms::Rooms;
use pushd::run;
use pushd::stats::{start_status_server, Stats};
use pushd::store::RedisRekeyStore;
use pushd::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    refuse_root()?;

    let args = Args::parse();
    let config = match ServerConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => anyhow::bail!("configuration error: {}", e),
    };

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let store = RedisRekeyStore::connect(&config.redis, &config.tenant).await?;
    let bus_client = redis::Client::open(config.redis.as_str())?;

    let stats = Arc::new(Stats::new(config.enable_stats));

    let state = Arc::new(ServerState {
        rooms: Rooms::new(),
        store: Arc::new(store),
        stats: Arc::clone(&stats),
        config: config.clone(),
    });

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);

    tokio::spawn({
        let stats = Arc::clone(&stats);
        async move {
            if let Err(e) = start_status_server(config.status_addr, stats).await {
                warn!("status server error: {}", e);
            }
        }
    });

    tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            if let Err(e) = pushd::bus::run(bus_client, state).await {
                tracing::error!("bus subscription error: {}", e);
            }
        }
    });

    tokio::select! {
        result = run(listener, state) => {
            if let Err(e) = result {
                tracing::error!("server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}

/// The relay terminates TLS elsewhere and binds unprivileged ports; there
/// is no reason to ever run it with full privileges.
fn refuse_root() -> Result<()> {
    if nix::unistd::Uid::effective().is_root() {
        anyhow::bail!("cowardly refusing to run as root");
    }
    Ok(())
}
