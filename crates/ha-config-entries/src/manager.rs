//! Config Entries Manager
//!
//! Owns every config entry, persists them, and drives the setup/unload
//! lifecycle through the handler each integration registers for its domain.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use ha_core::ConfigEntryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::entry::{ConfigData, ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::state_machine::InvalidTransition;
use crate::storage::{Storage, StorageError, StorageFile, StorageResult};

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Unload failed for entry {0}")]
    UnloadFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

/// Per-entry setup/unload implemented by an integration
#[async_trait]
pub trait EntryHandler: Send + Sync {
    /// Set up an entry. `Ok(false)` marks a failed setup without a reason;
    /// `Err` carries a reason shown to the user.
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<bool, ConfigEntryError>;

    /// Release everything the entry's setup created
    async fn unload_entry(&self, entry: &ConfigEntry) -> bool;
}

/// In-memory data an integration attaches to a loaded entry
pub type RuntimeData = Arc<dyn Any + Send + Sync>;

/// Callback fired after an entry's options change
pub type UpdateListener = Arc<dyn Fn(ConfigEntry) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as an [`UpdateListener`]
pub fn update_listener<F, Fut>(f: F) -> UpdateListener
where
    F: Fn(ConfigEntry) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |entry| f(entry).boxed())
}

/// Config Entries Manager
pub struct ConfigEntries {
    storage: Arc<Storage>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Serializes setup and unload
    setup_lock: Mutex<()>,

    handlers: DashMap<String, Arc<dyn EntryHandler>>,

    /// Only populated while the entry is loaded
    runtime_data: DashMap<String, RuntimeData>,

    /// Cleared on unload
    update_listeners: DashMap<String, Vec<UpdateListener>>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            handlers: DashMap::new(),
            runtime_data: DashMap::new(),
            update_listeners: DashMap::new(),
        }
    }

    /// Load entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(file) = self
            .storage
            .load::<ConfigEntriesData>(STORAGE_KEY, STORAGE_VERSION)
            .await?
        {
            info!(
                "Loading {} config entries from storage (v{}.{})",
                file.data.entries.len(),
                file.version,
                file.minor_version
            );
            for entry in file.data.entries {
                self.index_entry(&entry);
            }
        }
        Ok(())
    }

    /// Save entries to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = ConfigEntriesData {
            entries: self.entries.iter().map(|r| r.value().clone()).collect(),
        };
        let file = StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION, STORAGE_MINOR_VERSION);
        self.storage.save(&file).await?;
        debug!("Saved {} config entries to storage", self.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        let entry_id = entry.entry_id.clone();
        self.entries.insert(entry_id.clone(), entry.clone());
        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id);
        }
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }
        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get entry by unique_id
    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Add a new config entry
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(&entry);
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    /// Update an existing entry
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut updated = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&updated);

        if let Some(title) = update.title {
            updated.title = title;
        }
        if let Some(data) = update.data {
            updated.data = data;
        }
        if let Some(options) = update.options {
            updated.options = options;
        }
        if let Some(unique_id) = update.unique_id {
            updated.unique_id = unique_id;
        }
        if let Some(pref) = update.pref_disable_polling {
            updated.pref_disable_polling = pref;
        }
        updated.modified_at = Utc::now();

        self.index_entry(&updated);
        self.save().await?;

        debug!("Updated config entry: {}", entry_id);
        Ok(updated)
    }

    /// Replace an entry's options and notify its update listeners
    pub async fn update_options(
        &self,
        entry_id: &str,
        options: ConfigData,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let updated = self
            .update(entry_id, ConfigEntryUpdate::new().options(options))
            .await?;

        let listeners = self
            .update_listeners
            .get(entry_id)
            .map(|l| l.clone())
            .unwrap_or_default();
        for listener in listeners {
            listener(updated.clone()).await;
        }

        Ok(updated)
    }

    /// Remove an entry, unloading it first if it is loaded
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_loaded() {
            self.unload(entry_id).await?;
        }

        self.unindex_entry(&entry);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );
        Ok(entry)
    }

    fn transition(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<()> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(())
    }

    /// Register the setup/unload handler for a domain
    pub fn register_handler(&self, domain: &str, handler: Arc<dyn EntryHandler>) {
        self.handlers.insert(domain.to_string(), handler);
        debug!("Registered entry handler for domain: {}", domain);
    }

    fn handler(&self, domain: &str) -> Option<Arc<dyn EntryHandler>> {
        self.handlers.get(domain).map(|h| h.value().clone())
    }

    /// Set up an entry through its integration
    #[instrument(skip(self))]
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_disabled() {
            debug!("Skipping setup for disabled entry: {}", entry_id);
            return Ok(());
        }

        self.transition(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let Some(handler) = self.handler(&entry.domain) else {
            debug!(
                "No handler for domain {}, marking entry as loaded",
                entry.domain
            );
            return self.transition(entry_id, ConfigEntryState::Loaded, None);
        };

        let reason = match handler.setup_entry(&entry).await {
            Ok(true) => {
                self.transition(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                return Ok(());
            }
            Ok(false) => format!("Setup of {} returned false", entry.domain),
            Err(err) => err.to_string(),
        };

        error!("Error setting up entry {} for {}: {}", entry.title, entry.domain, reason);
        self.runtime_data.remove(entry_id);
        self.update_listeners.remove(entry_id);
        self.transition(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
        Err(ConfigEntriesError::SetupFailed(reason))
    }

    /// Unload an entry
    #[instrument(skip(self))]
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }
        if entry.state == ConfigEntryState::NotLoaded {
            return Ok(());
        }

        self.transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        let unloaded = match (entry.state, self.handler(&entry.domain)) {
            (ConfigEntryState::Loaded, Some(handler)) => handler.unload_entry(&entry).await,
            _ => true,
        };

        self.update_listeners.remove(entry_id);

        if !unloaded {
            warn!("Unload failed for entry: {} ({})", entry.title, entry_id);
            self.transition(entry_id, ConfigEntryState::FailedUnload, None)?;
            return Err(ConfigEntriesError::UnloadFailed(entry_id.to_string()));
        }

        self.runtime_data.remove(entry_id);
        self.transition(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded entry: {} ({})", entry.title, entry_id);
        Ok(())
    }

    /// Reload an entry (unload + setup)
    pub async fn reload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    /// Set up every known entry, returning one result per entry
    pub async fn setup_all(&self) -> Vec<(String, ConfigEntriesResult<()>)> {
        let mut results = Vec::new();
        for entry_id in self.entry_ids() {
            let result = self.setup(&entry_id).await;
            results.push((entry_id, result));
        }
        results
    }

    /// Unload every loaded entry
    pub async fn unload_all(&self) {
        for entry in self.iter().filter(|e| e.is_loaded()).collect::<Vec<_>>() {
            if let Err(err) = self.unload(&entry.entry_id).await {
                warn!("Failed to unload {}: {}", entry.entry_id, err);
            }
        }
    }

    /// Attach runtime data to a (loading) entry
    pub fn set_runtime_data<T: Any + Send + Sync>(&self, entry_id: &str, data: Arc<T>) {
        self.runtime_data.insert(entry_id.to_string(), data);
    }

    /// Runtime data of a loaded entry, if it has data of type `T`
    pub fn runtime_data<T: Any + Send + Sync>(&self, entry_id: &str) -> Option<Arc<T>> {
        self.runtime_data
            .get(entry_id)
            .map(|d| d.value().clone())
            .and_then(|d| d.downcast::<T>().ok())
    }

    /// Register a listener fired by `update_options`; dropped on unload
    pub fn add_update_listener(&self, entry_id: &str, listener: UpdateListener) {
        self.update_listeners
            .entry(entry_id.to_string())
            .or_default()
            .push(listener);
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ConfigEntry> + '_ {
        self.entries.iter().map(|r| r.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ConfigEntrySource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn create_test_manager() -> (TempDir, ConfigEntries) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        (temp_dir, ConfigEntries::new(storage))
    }

    #[derive(Default)]
    struct CountingHandler {
        fail_with: Option<String>,
        setups: AtomicUsize,
        unloads: AtomicUsize,
    }

    #[async_trait]
    impl EntryHandler for CountingHandler {
        async fn setup_entry(&self, _entry: &ConfigEntry) -> Result<bool, ConfigEntryError> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(reason) => Err(ConfigEntryError::new(reason.clone())),
                None => Ok(true),
            }
        }

        async fn unload_entry(&self, _entry: &ConfigEntry) -> bool {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn test_add_and_duplicate_unique_id() {
        let (_dir, manager) = create_test_manager();

        manager
            .add(ConfigEntry::new("reddit", "One").with_unique_id("same"))
            .await
            .unwrap();
        let result = manager
            .add(ConfigEntry::new("reddit", "Two").with_unique_id("same"))
            .await;

        assert!(matches!(
            result,
            Err(ConfigEntriesError::AlreadyExists { .. })
        ));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_domain() {
        let (_dir, manager) = create_test_manager();
        manager.add(ConfigEntry::new("reddit", "A")).await.unwrap();
        manager.add(ConfigEntry::new("reddit", "B")).await.unwrap();
        manager.add(ConfigEntry::new("remotetts", "C")).await.unwrap();

        assert_eq!(manager.get_by_domain("reddit").len(), 2);
        assert_eq!(manager.get_by_domain("remotetts").len(), 1);
        assert!(manager.get_by_domain("other").is_empty());
    }

    #[tokio::test]
    async fn test_setup_and_unload_call_handler() {
        let (_dir, manager) = create_test_manager();
        let handler = Arc::new(CountingHandler::default());
        manager.register_handler("reddit", handler.clone());

        let entry = manager.add(ConfigEntry::new("reddit", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();
        assert!(manager.get(&entry.entry_id).unwrap().is_loaded());

        manager.set_runtime_data(&entry.entry_id, Arc::new(42u32));
        assert_eq!(manager.runtime_data::<u32>(&entry.entry_id).as_deref(), Some(&42));
        assert!(manager.runtime_data::<String>(&entry.entry_id).is_none());

        manager.unload(&entry.entry_id).await.unwrap();
        assert_eq!(
            manager.get(&entry.entry_id).unwrap().state,
            ConfigEntryState::NotLoaded
        );
        assert!(manager.runtime_data::<u32>(&entry.entry_id).is_none());
        assert_eq!(handler.setups.load(Ordering::SeqCst), 1);
        assert_eq!(handler.unloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_setup_failure_records_reason() {
        let (_dir, manager) = create_test_manager();
        let handler = Arc::new(CountingHandler {
            fail_with: Some("Could not connect to API".to_string()),
            ..Default::default()
        });
        manager.register_handler("remotetts", handler.clone());

        let entry = manager.add(ConfigEntry::new("remotetts", "Test")).await.unwrap();
        let result = manager.setup(&entry.entry_id).await;

        assert!(matches!(result, Err(ConfigEntriesError::SetupFailed(_))));
        let stored = manager.get(&entry.entry_id).unwrap();
        assert_eq!(stored.state, ConfigEntryState::SetupError);
        assert_eq!(stored.reason.as_deref(), Some("Could not connect to API"));

        // unloading a failed entry does not call into the integration
        manager.unload(&entry.entry_id).await.unwrap();
        assert_eq!(handler.unloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_options_fires_listeners_until_unload() {
        let (_dir, manager) = create_test_manager();
        let entry = manager.add(ConfigEntry::new("remotetts", "T")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        manager.add_update_listener(
            &entry.entry_id,
            update_listener(move |_entry| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        let options = ConfigData::from([("url".to_string(), serde_json::json!("http://x"))]);
        let updated = manager
            .update_options(&entry.entry_id, options.clone())
            .await
            .unwrap();
        assert_eq!(updated.options, options);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        manager.unload(&entry.entry_id).await.unwrap();
        manager
            .update_options(&entry.entry_id, ConfigData::new())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        {
            let manager = ConfigEntries::new(storage.clone());
            manager
                .add(
                    ConfigEntry::new("reddit", "Test")
                        .with_unique_id("test-123")
                        .with_source(ConfigEntrySource::Import),
                )
                .await
                .unwrap();
        }

        let manager = ConfigEntries::new(storage);
        manager.load().await.unwrap();
        assert_eq!(manager.len(), 1);
        let entry = manager.get_by_unique_id("reddit", "test-123").unwrap();
        assert_eq!(entry.title, "Test");
        assert_eq!(entry.source, ConfigEntrySource::Import);
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
    }

    #[tokio::test]
    async fn test_remove_unloads_first() {
        let (_dir, manager) = create_test_manager();
        let handler = Arc::new(CountingHandler::default());
        manager.register_handler("reddit", handler.clone());

        let entry = manager.add(ConfigEntry::new("reddit", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();
        manager.remove(&entry.entry_id).await.unwrap();

        assert!(manager.is_empty());
        assert_eq!(handler.unloads.load(Ordering::SeqCst), 1);
    }
}
