//! The host the integrations run inside
//!
//! [`HomeAssistant`] ties the state store, config entries, flows and entity
//! platforms together. Integrations implement [`Integration`]; registering
//! one wires its entry setup into the config entries manager and its flows
//! into the flow manager.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config::{Configuration, PlatformConfig};
use ha_config_entries::{
    ConfigEntries, ConfigEntry, ConfigFlowFactory, EntryHandler, FlowManager, OptionsFlowFactory,
    Storage,
};
use ha_core::{ConfigEntryError, EntityId, HomeAssistantError, Platform};
use ha_state_store::StateStore;
use tracing::{debug, error, info, warn};

use crate::entity::SharedEntity;
use crate::entity_platform::EntityPlatform;
use crate::tts::{self, TtsAudio, TtsOptions};

/// An integration: entry setup, its entity platforms and its flows
#[async_trait]
pub trait Integration: Send + Sync {
    fn domain(&self) -> &'static str;

    /// Set up a config entry. `Ok(false)` is a failed setup; `Err` carries
    /// the reason.
    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<bool, ConfigEntryError>;

    async fn unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool;

    /// Add the entities of one platform for a loaded entry
    async fn setup_entry_platform(
        &self,
        _hass: &Arc<HomeAssistant>,
        _entry: &ConfigEntry,
        _platform: Platform,
        _entities: &EntityPlatform,
    ) -> Result<(), HomeAssistantError> {
        Ok(())
    }

    fn config_flow(&self) -> Option<ConfigFlowFactory> {
        None
    }

    fn options_flow(&self) -> Option<OptionsFlowFactory> {
        None
    }

    /// Entity domains this integration accepts `- platform:` blocks under
    fn yaml_platforms(&self) -> &'static [Platform] {
        &[]
    }

    /// Set up one `- platform:` block from configuration.yaml
    async fn setup_yaml_platform(
        &self,
        _hass: &Arc<HomeAssistant>,
        _config: &PlatformConfig,
        _entities: &EntityPlatform,
    ) -> Result<(), HomeAssistantError> {
        Ok(())
    }
}

/// Adapts an [`Integration`] to the config entries manager. Holds the host
/// weakly since the host owns the manager.
struct IntegrationHandler {
    integration: Arc<dyn Integration>,
    hass: Weak<HomeAssistant>,
}

#[async_trait]
impl EntryHandler for IntegrationHandler {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<bool, ConfigEntryError> {
        let hass = self
            .hass
            .upgrade()
            .ok_or_else(|| ConfigEntryError::new("Home Assistant is shutting down"))?;
        self.integration.setup_entry(&hass, entry).await
    }

    async fn unload_entry(&self, entry: &ConfigEntry) -> bool {
        match self.hass.upgrade() {
            Some(hass) => self.integration.unload_entry(&hass, entry).await,
            None => false,
        }
    }
}

pub struct HomeAssistant {
    config_dir: PathBuf,
    pub states: Arc<StateStore>,
    pub config_entries: Arc<ConfigEntries>,
    pub flows: FlowManager,
    integrations: DashMap<String, Arc<dyn Integration>>,
    /// entry_id -> platforms forwarded for that entry
    entry_platforms: DashMap<String, Vec<Arc<EntityPlatform>>>,
    yaml_platforms: Mutex<Vec<Arc<EntityPlatform>>>,
}

impl HomeAssistant {
    pub fn new(config_dir: impl Into<PathBuf>) -> Arc<Self> {
        let config_dir = config_dir.into();
        let storage = Arc::new(Storage::new(&config_dir));
        let config_entries = Arc::new(ConfigEntries::new(storage));

        Arc::new(Self {
            config_dir,
            states: Arc::new(StateStore::new()),
            flows: FlowManager::new(config_entries.clone()),
            config_entries,
            integrations: DashMap::new(),
            entry_platforms: DashMap::new(),
            yaml_platforms: Mutex::new(Vec::new()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn register_integration(self: &Arc<Self>, integration: Arc<dyn Integration>) {
        let domain = integration.domain();

        self.config_entries.register_handler(
            domain,
            Arc::new(IntegrationHandler {
                integration: integration.clone(),
                hass: Arc::downgrade(self),
            }),
        );
        if let Some(factory) = integration.config_flow() {
            self.flows.register_config_flow(domain, factory);
        }
        if let Some(factory) = integration.options_flow() {
            self.flows.register_options_flow(domain, factory);
        }

        self.integrations.insert(domain.to_string(), integration);
        info!("Registered integration {}", domain);
    }

    pub fn integration(&self, domain: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(domain).map(|i| i.value().clone())
    }

    /// Set up the given entity platforms for a loaded entry
    pub async fn forward_entry_setups(
        self: &Arc<Self>,
        entry: &ConfigEntry,
        platforms: &[Platform],
    ) -> Result<(), HomeAssistantError> {
        let integration = self.integration(&entry.domain).ok_or_else(|| {
            HomeAssistantError::new(format!("Integration {} not registered", entry.domain))
        })?;

        for &platform in platforms {
            let entities = Arc::new(
                EntityPlatform::new(platform, entry.domain.clone(), self.states.clone())
                    .with_polling(!entry.pref_disable_polling),
            );
            integration
                .setup_entry_platform(self, entry, platform, &entities)
                .await?;
            debug!("Forwarded {} to {}", entry.entry_id, platform);
            self.entry_platforms
                .entry(entry.entry_id.clone())
                .or_default()
                .push(entities);
        }
        Ok(())
    }

    /// Tear down the given entity platforms of an entry
    pub async fn unload_platforms(&self, entry: &ConfigEntry, platforms: &[Platform]) -> bool {
        if let Some(mut forwarded) = self.entry_platforms.get_mut(&entry.entry_id) {
            forwarded.retain(|entities| {
                if platforms.contains(&entities.platform()) {
                    entities.unload();
                    false
                } else {
                    true
                }
            });
        }
        self.entry_platforms
            .remove_if(&entry.entry_id, |_, forwarded| forwarded.is_empty());
        true
    }

    pub fn entry_platforms(&self, entry_id: &str) -> Vec<Arc<EntityPlatform>> {
        self.entry_platforms
            .get(entry_id)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Set up every `- platform:` block a registered integration handles
    pub async fn setup_yaml_platforms(self: &Arc<Self>, config: &Configuration) {
        let integrations: Vec<Arc<dyn Integration>> =
            self.integrations.iter().map(|i| i.value().clone()).collect();

        for integration in integrations {
            for &platform in integration.yaml_platforms() {
                for block in config.platforms(platform.domain(), Some(integration.domain())) {
                    let entities = Arc::new(EntityPlatform::new(
                        platform,
                        integration.domain(),
                        self.states.clone(),
                    ));
                    match integration.setup_yaml_platform(self, &block, &entities).await {
                        Ok(()) => lock_yaml(&self.yaml_platforms).push(entities),
                        Err(e) => error!(
                            "Error setting up platform {}.{}: {}",
                            platform,
                            integration.domain(),
                            e
                        ),
                    }
                }
            }
        }
    }

    /// Locate an entity on any platform
    pub fn entity(&self, entity_id: &EntityId) -> Option<SharedEntity> {
        let from_entries = self
            .entry_platforms
            .iter()
            .find_map(|platforms| platforms.iter().find_map(|p| p.entity(entity_id)));
        from_entries.or_else(|| {
            lock_yaml(&self.yaml_platforms)
                .iter()
                .find_map(|p| p.entity(entity_id))
        })
    }

    /// Ask a TTS entity to synthesize `message`
    pub async fn tts_get_audio(
        &self,
        entity_id: &EntityId,
        message: &str,
        language: Option<&str>,
        options: &TtsOptions,
    ) -> Result<TtsAudio, HomeAssistantError> {
        let entity = self
            .entity(entity_id)
            .ok_or_else(|| HomeAssistantError::new(format!("Entity {} not found", entity_id)))?;
        let guard = entity.read().await;
        let engine = guard.as_tts().ok_or_else(|| {
            HomeAssistantError::new(format!("{} is not a text-to-speech entity", entity_id))
        })?;
        tts::get_tts_audio(engine, message, language, options).await
    }

    /// Unload every entry and YAML platform
    pub async fn stop(&self) {
        self.config_entries.unload_all().await;
        let yaml: Vec<_> = lock_yaml(&self.yaml_platforms).drain(..).collect();
        for entities in yaml {
            entities.unload();
        }
        if !self.entry_platforms.is_empty() {
            warn!(
                "{} entries left platforms behind after unload",
                self.entry_platforms.len()
            );
        }
        info!("Home Assistant stopped");
    }
}

fn lock_yaml(
    platforms: &Mutex<Vec<Arc<EntityPlatform>>>,
) -> std::sync::MutexGuard<'_, Vec<Arc<EntityPlatform>>> {
    platforms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
