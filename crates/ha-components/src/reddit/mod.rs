//! Reddit integration
//!
//! Polls subreddit listings and exposes each subreddit as a sensor whose
//! state is the number of fetched posts. Configured through a config flow or
//! a legacy `sensor: - platform: reddit` block.

pub mod api;
pub mod config_flow;
pub mod consts;
pub mod sensor;

use std::sync::Arc;

use async_trait::async_trait;
use ha_config::PlatformConfig;
use ha_config_entries::{ConfigEntry, ConfigFlowFactory};
use ha_core::{ConfigEntryError, HomeAssistantError, Platform};
use serde::Deserialize;
use tracing::{debug, error};

use crate::entity::Entity;
use crate::entity_platform::EntityPlatform;
use crate::hass::{HomeAssistant, Integration};

pub use api::{
    HttpRedditClientFactory, RedditApi, RedditClient, RedditClientFactory, RedditCredentials,
    RedditError, RedditPost,
};
pub use config_flow::RedditConfigFlow;
pub use consts::DOMAIN;
pub use sensor::{RedditPlatformConfig, RedditSensor};

pub const PLATFORMS: &[Platform] = &[Platform::Sensor];

/// Runtime data of a loaded Reddit entry
pub struct RedditData {
    pub client: Arc<dyn RedditApi>,
    pub sort_by: String,
    pub subreddits: Vec<String>,
    pub limit: u64,
}

/// Entry data written by the config flow
#[derive(Debug, Deserialize)]
struct RedditEntryData {
    #[serde(flatten)]
    credentials: RedditCredentials,
    sort_by: String,
    subreddits: Vec<String>,
    maximum: u64,
}

impl RedditEntryData {
    fn from_entry(entry: &ConfigEntry) -> Result<Self, ConfigEntryError> {
        let data = serde_json::Value::Object(entry.data.clone().into_iter().collect());
        serde_json::from_value(data)
            .map_err(|e| ConfigEntryError::new(format!("Invalid Reddit entry data: {}", e)))
    }
}

fn sensors(
    client: &Arc<dyn RedditApi>,
    subreddits: &[String],
    limit: u64,
    sort_by: &str,
) -> Vec<Box<dyn Entity>> {
    subreddits
        .iter()
        .map(|subreddit| {
            Box::new(RedditSensor::new(client.clone(), subreddit.as_str(), limit, sort_by))
                as Box<dyn Entity>
        })
        .collect()
}

pub struct RedditIntegration {
    clients: Arc<dyn RedditClientFactory>,
}

impl RedditIntegration {
    pub fn new(clients: Arc<dyn RedditClientFactory>) -> Self {
        Self { clients }
    }

    /// Build a client and prove the credentials work
    async fn connect(
        &self,
        credentials: &RedditCredentials,
    ) -> Result<Arc<dyn RedditApi>, RedditError> {
        let client = self.clients.create(credentials)?;
        if let Err(err) = client.me().await {
            client.close().await;
            return Err(err);
        }
        debug!("Connected to Reddit as {}", credentials.username);
        Ok(client)
    }
}

impl Default for RedditIntegration {
    fn default() -> Self {
        Self::new(Arc::new(HttpRedditClientFactory))
    }
}

#[async_trait]
impl Integration for RedditIntegration {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<bool, ConfigEntryError> {
        let config = RedditEntryData::from_entry(entry)?;

        let client = match self.connect(&config.credentials).await {
            Ok(client) => client,
            Err(err) => {
                error!("Reddit error {}", err);
                return Ok(false);
            }
        };

        hass.config_entries.set_runtime_data(
            &entry.entry_id,
            Arc::new(RedditData {
                client,
                sort_by: config.sort_by,
                subreddits: config.subreddits,
                limit: config.maximum,
            }),
        );

        hass.forward_entry_setups(entry, PLATFORMS)
            .await
            .map_err(|e| ConfigEntryError::new(e.to_string()))?;
        Ok(true)
    }

    async fn unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool {
        if let Some(data) = hass
            .config_entries
            .runtime_data::<RedditData>(&entry.entry_id)
        {
            data.client.close().await;
        }
        hass.unload_platforms(entry, PLATFORMS).await
    }

    async fn setup_entry_platform(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
        platform: Platform,
        entities: &EntityPlatform,
    ) -> Result<(), HomeAssistantError> {
        if platform != Platform::Sensor {
            return Ok(());
        }
        let data = hass
            .config_entries
            .runtime_data::<RedditData>(&entry.entry_id)
            .ok_or_else(|| HomeAssistantError::new("Reddit entry has no runtime data"))?;

        entities
            .add_entities(
                sensors(&data.client, &data.subreddits, data.limit, &data.sort_by),
                true,
            )
            .await;
        Ok(())
    }

    fn config_flow(&self) -> Option<ConfigFlowFactory> {
        let clients = self.clients.clone();
        Some(ha_config_entries::config_flow(move || {
            RedditConfigFlow::new(clients.clone())
        }))
    }

    fn yaml_platforms(&self) -> &'static [Platform] {
        PLATFORMS
    }

    async fn setup_yaml_platform(
        &self,
        _hass: &Arc<HomeAssistant>,
        config: &PlatformConfig,
        entities: &EntityPlatform,
    ) -> Result<(), HomeAssistantError> {
        let config: RedditPlatformConfig = config
            .parse()
            .map_err(|e| HomeAssistantError::new(e.to_string()))?;
        config.validate().map_err(HomeAssistantError::new)?;

        let client = match self.connect(&config.credentials()).await {
            Ok(client) => client,
            Err(err) => {
                error!("Reddit error {}", err);
                return Ok(());
            }
        };

        entities
            .add_entities(
                sensors(&client, &config.subreddits, config.maximum, &config.sort_by),
                true,
            )
            .await;
        Ok(())
    }
}
