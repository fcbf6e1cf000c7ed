use crate::app::App;
use crate::dexscreener::DexScreenerClient;
use crate::persistence::JsonFileStore;
use crate::zora::ZoraClient;
use log::{error, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

mod alerts;
mod app;
mod config;
mod data;
mod dexscreener;
mod persistence;
mod tx;
mod watchlist;
mod web;
mod zora;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    info!("Starting the application...");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::Config::from_file(std::path::Path::new(&config_path))?;

    let pairs = Arc::new(DexScreenerClient::new(config.dexscreener_api_url.clone()));
    let coins = Arc::new(ZoraClient::new(
        config.zora_api_url.clone(),
        config.zora_api_key.clone(),
    ));

    let cancellation_token = CancellationToken::new();
    let store = Arc::new(
        JsonFileStore::new(cancellation_token.clone(), config.storage_path.clone()).await?,
    );

    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {e}");
            return;
        }
        info!("Ctrl-C received, shutting down...");
        shutdown_token.cancel();
    });

    let mut app = App::new(config, pairs, coins, store)?;

    app.run(cancellation_token).await?;

    Ok(())
}
