use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

mod api;
mod config;
mod core;
mod events;
mod login;
mod models;
mod monitor;
mod probe;
mod utils;

use crate::config::ConfigStore;
use crate::core::Core;

const CONFIG_PATH: &str = "config.json";
const DEFAULT_API_ADDR: &str = "127.0.0.1:3722";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let store = match ConfigStore::open(CONFIG_PATH) {
        Ok(store) => store,
        Err(e) => {
            // a broken file must not take the watchdog down with it
            warn!("unusable config file {}: {}; running on defaults", CONFIG_PATH, e);
            ConfigStore::with_defaults(CONFIG_PATH)
        }
    };

    let core = Arc::new(Core::new(store)?);
    info!("portalguard loaded");

    core.start_ping_monitor().await;

    let api_addr: SocketAddr = std::env::var("PORTALGUARD_API_ADDR")
        .unwrap_or_else(|_| DEFAULT_API_ADDR.into())
        .parse()
        .context("invalid PORTALGUARD_API_ADDR")?;
    let api_core = Arc::clone(&core);
    tokio::spawn(async move {
        if let Err(e) = api::start_server(api_addr, api_core).await {
            tracing::error!("command api failed: {}", e);
        }
    });

    signal::ctrl_c().await?;
    info!("shutdown signal received, stopping monitor");
    core.stop_ping_monitor().await;

    Ok(())
}
