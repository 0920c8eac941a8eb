//! RemoteTTS integration
//!
//! Text-to-speech backed by a remote HTTP synthesis server. Each config entry
//! provides one TTS entity speaking one language with one voice.

pub mod api;
pub mod config_flow;
pub mod consts;
pub mod tts;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ha_config_entries::{
    options_flow, update_listener, ConfigData, ConfigEntry, ConfigEntryUpdate, ConfigFlowFactory,
    OptionsFlowFactory,
};
use ha_core::{ConfigEntryError, HomeAssistantError, Platform};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entity::Entity;
use crate::entity_platform::EntityPlatform;
use crate::hass::{HomeAssistant, Integration};

pub use api::{
    HttpRemoteTtsClientFactory, RemoteTtsApi, RemoteTtsClient, RemoteTtsClientFactory,
    RemoteTtsError,
};
pub use config_flow::{RemoteTtsConfigFlow, RemoteTtsOptionsFlow};
pub use consts::DOMAIN;
pub use tts::RemoteTtsEntity;

use consts::{CONF_LANGUAGE, CONF_NAME, CONF_URL};

pub const PLATFORMS: &[Platform] = &[Platform::Tts];

/// Runtime data of a loaded RemoteTTS entry
pub struct RemoteTtsData {
    pub client: Option<Arc<dyn RemoteTtsApi>>,
    pub url: String,
    pub name: String,
    pub language: String,
}

fn required(entry: &ConfigEntry, key: &str, what: &str) -> Result<String, ConfigEntryError> {
    entry
        .data_str(key)
        .map(str::to_string)
        .ok_or_else(|| ConfigEntryError::new(format!("{} could not be resolved", what)))
}

/// Entry data with every non-empty string option laid over it
fn merged_settings(entry: &ConfigEntry) -> ConfigData {
    let mut data = entry.data.clone();
    for key in [CONF_NAME, CONF_LANGUAGE, CONF_URL] {
        if let Some(value) = entry.option_str(key) {
            data.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    data
}

/// Fold edited options into the entry data and reload it
async fn apply_options(hass: &HomeAssistant, entry: ConfigEntry) {
    let settings = merged_settings(&entry);
    if settings != entry.data {
        if let Err(err) = hass
            .config_entries
            .update(&entry.entry_id, ConfigEntryUpdate::new().data(settings))
            .await
        {
            warn!("Could not store RemoteTTS options for {}: {}", entry.entry_id, err);
            return;
        }
    }
    if let Err(err) = hass.config_entries.reload(&entry.entry_id).await {
        warn!("Reload of {} after options update failed: {}", entry.entry_id, err);
    }
}

pub struct RemoteTtsIntegration {
    clients: Arc<dyn RemoteTtsClientFactory>,
}

impl RemoteTtsIntegration {
    pub fn new(clients: Arc<dyn RemoteTtsClientFactory>) -> Self {
        Self { clients }
    }
}

impl Default for RemoteTtsIntegration {
    fn default() -> Self {
        Self::new(Arc::new(HttpRemoteTtsClientFactory))
    }
}

#[async_trait]
impl Integration for RemoteTtsIntegration {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<bool, ConfigEntryError> {
        let name = required(entry, CONF_NAME, "Name")?;
        let language = required(entry, CONF_LANGUAGE, "Language")?;
        let url = required(entry, CONF_URL, "Url")?;

        let client = match self.clients.create(&url) {
            Ok(client) => client,
            Err(RemoteTtsError::InvalidUrl(reason)) => return Err(ConfigEntryError::new(reason)),
            Err(err) => {
                debug!("Could not build RemoteTTS client: {}", err);
                return Err(ConfigEntryError::new("Could not connect to API"));
            }
        };
        if let Err(err) = client.verify_connection().await {
            client.close().await;
            return Err(match err {
                RemoteTtsError::InvalidUrl(reason) => ConfigEntryError::new(reason),
                other => {
                    debug!("RemoteTTS connection check failed: {}", other);
                    ConfigEntryError::new("Could not connect to API")
                }
            });
        }

        hass.config_entries.set_runtime_data(
            &entry.entry_id,
            Arc::new(RemoteTtsData {
                client: Some(client),
                url,
                name,
                language,
            }),
        );

        hass.forward_entry_setups(entry, PLATFORMS)
            .await
            .map_err(|e| ConfigEntryError::new(e.to_string()))?;

        let host: Weak<HomeAssistant> = Arc::downgrade(hass);
        hass.config_entries.add_update_listener(
            &entry.entry_id,
            update_listener(move |entry| {
                let host = host.clone();
                async move {
                    if let Some(hass) = host.upgrade() {
                        apply_options(&hass, entry).await;
                    }
                }
            }),
        );

        info!("RemoteTTS entry {} set up", entry.entry_id);
        Ok(true)
    }

    async fn unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool {
        if let Some(data) = hass
            .config_entries
            .runtime_data::<RemoteTtsData>(&entry.entry_id)
        {
            if let Some(client) = &data.client {
                client.close().await;
            }
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
        if platform != Platform::Tts {
            return Ok(());
        }
        let data = hass
            .config_entries
            .runtime_data::<RemoteTtsData>(&entry.entry_id)
            .ok_or_else(|| HomeAssistantError::new("RemoteTTS entry has no runtime data"))?;

        entities
            .add_entities(
                vec![Box::new(RemoteTtsEntity::new(entry, &data)) as Box<dyn Entity>],
                false,
            )
            .await;
        Ok(())
    }

    fn config_flow(&self) -> Option<ConfigFlowFactory> {
        let clients = self.clients.clone();
        Some(ha_config_entries::config_flow(move || {
            RemoteTtsConfigFlow::new(clients.clone())
        }))
    }

    fn options_flow(&self) -> Option<OptionsFlowFactory> {
        let clients = self.clients.clone();
        Some(options_flow(move |entry, entries| {
            Ok(RemoteTtsOptionsFlow::new(clients.clone(), entry, entries))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(data: Value, options: Value) -> ConfigEntry {
        ConfigEntry::new(DOMAIN, "RemoteTTS")
            .with_data(serde_json::from_value(data).unwrap())
            .with_options(serde_json::from_value(options).unwrap())
    }

    #[test]
    fn test_merged_settings_skip_empty_options() {
        let entry = entry(
            json!({"name": "Kitchen", "language": "en", "url": "http://a"}),
            json!({"name": "RemoteTTS Voice", "language": "", "url": ""}),
        );
        let merged = merged_settings(&entry);
        assert_eq!(merged["name"], json!("RemoteTTS Voice"));
        assert_eq!(merged["language"], json!("en"));
        assert_eq!(merged["url"], json!("http://a"));
    }

    #[test]
    fn test_edited_options_override() {
        let entry = entry(
            json!({"name": "Kitchen", "language": "en", "url": "http://a"}),
            json!({"name": "Hall", "language": "de", "url": "http://b"}),
        );
        let merged = merged_settings(&entry);
        assert_eq!(merged["name"], json!("Hall"));
        assert_eq!(merged["language"], json!("de"));
        assert_eq!(merged["url"], json!("http://b"));
    }

    #[test]
    fn test_missing_setting_is_config_error() {
        let entry = entry(json!({"name": "Kitchen", "url": "http://a"}), json!({}));
        let err = required(&entry, CONF_LANGUAGE, "Language").unwrap_err();
        assert_eq!(err.to_string(), "Language could not be resolved");
    }
}
