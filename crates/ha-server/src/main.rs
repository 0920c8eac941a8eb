//! Home Assistant Rust Server
//!
//! Loads `configuration.yaml` and the stored config entries from the config
//! directory, sets up the Reddit and RemoteTTS integrations and runs until
//! interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use ha_components::{register_builtin_integrations, HomeAssistant};
use ha_config::Configuration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable naming the config directory
const CONFIG_DIR_ENV: &str = "HASS_CONFIG";
const DEFAULT_CONFIG_DIR: &str = "./config";

fn config_dir() -> PathBuf {
    std::env::var_os(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = config_dir();
    info!("Starting Home Assistant (Rust) in {}", config_dir.display());

    let config = Configuration::load(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;

    let hass = HomeAssistant::new(&config_dir);
    register_builtin_integrations(&hass);

    hass.config_entries
        .load()
        .await
        .context("loading config entries")?;

    for (entry_id, result) in hass.config_entries.setup_all().await {
        if let Err(err) = result {
            warn!("Config entry {} not set up: {}", entry_id, err);
        }
    }
    hass.setup_yaml_platforms(&config).await;

    info!(
        "Home Assistant is running with {} entities",
        hass.states.entity_count()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    hass.stop().await;

    Ok(())
}
