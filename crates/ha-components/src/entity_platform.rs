//! Entity platform
//!
//! One platform instance holds the entities a single integration added to a
//! single entity domain (e.g. the Reddit sensors of one config entry). It
//! assigns entity ids, writes states, runs the polling loop and tears all of
//! that down on unload.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ha_core::consts::{ATTR_FRIENDLY_NAME, ATTR_ICON};
use ha_core::{Context, EntityId, EntityIdError, Platform, STATE_UNKNOWN};
use ha_state_store::StateStore;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::entity::{Entity, SharedEntity};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

pub struct EntityPlatform {
    platform: Platform,
    integration: String,
    states: Arc<StateStore>,
    scan_interval: Duration,
    polling_enabled: bool,
    entities: Mutex<Vec<(EntityId, SharedEntity)>>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl EntityPlatform {
    pub fn new(platform: Platform, integration: impl Into<String>, states: Arc<StateStore>) -> Self {
        Self {
            platform,
            integration: integration.into(),
            states,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            polling_enabled: true,
            entities: Mutex::new(Vec::new()),
            pollers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_scan_interval(mut self, scan_interval: Duration) -> Self {
        self.scan_interval = scan_interval;
        self
    }

    /// Entries with `pref_disable_polling` never start pollers
    pub fn with_polling(mut self, enabled: bool) -> Self {
        self.polling_enabled = enabled;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn integration(&self) -> &str {
        &self.integration
    }

    /// Add entities, optionally refreshing each one before its first state
    /// is written
    pub async fn add_entities(&self, entities: Vec<Box<dyn Entity>>, update_before_add: bool) {
        let count = entities.len();

        for mut entity in entities {
            if update_before_add {
                entity.update().await;
            }

            let entity_id = match self.allocate_entity_id(entity.as_ref()) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping entity from {}: {}", self.integration, e);
                    continue;
                }
            };
            write_state(&self.states, &entity_id, entity.as_ref());

            let should_poll = entity.should_poll();
            let shared: SharedEntity = Arc::new(RwLock::new(entity));

            if should_poll && self.polling_enabled {
                let handle = spawn_poller(
                    entity_id.clone(),
                    shared.clone(),
                    self.states.clone(),
                    self.scan_interval,
                );
                lock(&self.pollers).push(handle);
            }

            debug!("Added {} from {}", entity_id, self.integration);
            lock(&self.entities).push((entity_id, shared));
        }

        info!(
            "Added {} {} entities for {}",
            count, self.platform, self.integration
        );
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        lock(&self.entities).iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn entity(&self, entity_id: &EntityId) -> Option<SharedEntity> {
        lock(&self.entities)
            .iter()
            .find(|(id, _)| id == entity_id)
            .map(|(_, entity)| entity.clone())
    }

    /// Update one entity now and write its state
    pub async fn refresh(&self, entity_id: &EntityId) -> bool {
        let Some(entity) = self.entity(entity_id) else {
            return false;
        };
        let mut guard = entity.write().await;
        guard.update().await;
        write_state(&self.states, entity_id, &**guard);
        true
    }

    /// Stop polling and remove every state this platform wrote
    pub fn unload(&self) {
        for handle in lock(&self.pollers).drain(..) {
            handle.abort();
        }
        let entities: Vec<_> = lock(&self.entities).drain(..).collect();
        for (entity_id, _) in &entities {
            self.states.remove(entity_id);
        }
        info!(
            "Unloaded {} {} entities for {}",
            entities.len(),
            self.platform,
            self.integration
        );
    }

    /// `{domain}.{slug(name)}`, suffixed `_2`, `_3`... while taken
    fn allocate_entity_id(&self, entity: &dyn Entity) -> Result<EntityId, EntityIdError> {
        let name = entity.name().unwrap_or_else(|| self.integration.clone());
        let base = EntityId::from_name(self.platform.domain(), &name)?;

        let mut candidate = base.clone();
        let mut n = 2;
        while self.states.contains(&candidate.to_string()) {
            candidate = base.with_suffix(n);
            n += 1;
        }
        Ok(candidate)
    }
}

impl Drop for EntityPlatform {
    fn drop(&mut self) {
        for handle in lock(&self.pollers).drain(..) {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_state(states: &StateStore, entity_id: &EntityId, entity: &dyn Entity) {
    let mut attributes: HashMap<String, serde_json::Value> = entity.attributes();
    if let Some(name) = entity.name() {
        attributes.insert(ATTR_FRIENDLY_NAME.to_string(), json!(name));
    }
    if let Some(icon) = entity.icon() {
        attributes.insert(ATTR_ICON.to_string(), json!(icon));
    }

    let state = entity.state().unwrap_or_else(|| STATE_UNKNOWN.to_string());
    states.set(entity_id.clone(), state, attributes, Context::new());
}

fn spawn_poller(
    entity_id: EntityId,
    entity: SharedEntity,
    states: Arc<StateStore>,
    scan_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + scan_interval, scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let mut guard = entity.write().await;
            guard.update().await;
            write_state(&states, &entity_id, &**guard);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        name: Option<String>,
        polls: Arc<AtomicUsize>,
        poll: bool,
    }

    impl Counter {
        fn boxed(name: &str, polls: &Arc<AtomicUsize>, poll: bool) -> Box<dyn Entity> {
            Box::new(Self {
                name: Some(name.to_string()),
                polls: polls.clone(),
                poll,
            })
        }
    }

    #[async_trait]
    impl Entity for Counter {
        fn name(&self) -> Option<String> {
            self.name.clone()
        }

        fn icon(&self) -> Option<String> {
            Some("mdi:counter".to_string())
        }

        fn state(&self) -> Option<String> {
            Some(self.polls.load(Ordering::SeqCst).to_string())
        }

        fn should_poll(&self) -> bool {
            self.poll
        }

        async fn update(&mut self) {
            self.polls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn platform(states: &Arc<StateStore>) -> EntityPlatform {
        EntityPlatform::new(Platform::Sensor, "test", states.clone())
    }

    #[tokio::test]
    async fn test_add_entities_writes_state() {
        let states = Arc::new(StateStore::new());
        let polls = Arc::new(AtomicUsize::new(0));
        let platform = platform(&states);

        platform
            .add_entities(vec![Counter::boxed("Front Door", &polls, false)], true)
            .await;

        let state = states.get("sensor.front_door").unwrap();
        assert_eq!(state.state, "1");
        assert_eq!(state.attributes[ATTR_FRIENDLY_NAME], json!("Front Door"));
        assert_eq!(state.attributes[ATTR_ICON], json!("mdi:counter"));
    }

    #[tokio::test]
    async fn test_without_update_before_add() {
        let states = Arc::new(StateStore::new());
        let polls = Arc::new(AtomicUsize::new(0));
        let platform = platform(&states);

        platform
            .add_entities(vec![Counter::boxed("idle", &polls, false)], false)
            .await;
        assert_eq!(states.get_state("sensor.idle").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_duplicate_names_get_suffix() {
        let states = Arc::new(StateStore::new());
        let polls = Arc::new(AtomicUsize::new(0));
        let platform = platform(&states);

        platform
            .add_entities(
                vec![
                    Counter::boxed("feed", &polls, false),
                    Counter::boxed("feed", &polls, false),
                ],
                false,
            )
            .await;

        let ids: Vec<String> = platform.entity_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["sensor.feed", "sensor.feed_2"]);
    }

    #[tokio::test]
    async fn test_unload_removes_states() {
        let states = Arc::new(StateStore::new());
        let polls = Arc::new(AtomicUsize::new(0));
        let platform = platform(&states);

        platform
            .add_entities(vec![Counter::boxed("gone", &polls, true)], false)
            .await;
        assert!(states.contains("sensor.gone"));

        platform.unload();
        assert!(!states.contains("sensor.gone"));
        assert!(platform.entity_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_updates_state() {
        let states = Arc::new(StateStore::new());
        let polls = Arc::new(AtomicUsize::new(0));
        let platform = platform(&states).with_scan_interval(Duration::from_secs(10));

        platform
            .add_entities(vec![Counter::boxed("polled", &polls, true)], false)
            .await;

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(states.get_state("sensor.polled").as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_disabled() {
        let states = Arc::new(StateStore::new());
        let polls = Arc::new(AtomicUsize::new(0));
        let platform = platform(&states)
            .with_scan_interval(Duration::from_secs(10))
            .with_polling(false);

        platform
            .add_entities(vec![Counter::boxed("still", &polls, true)], false)
            .await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh() {
        let states = Arc::new(StateStore::new());
        let polls = Arc::new(AtomicUsize::new(0));
        let platform = platform(&states);

        platform
            .add_entities(vec![Counter::boxed("manual", &polls, false)], false)
            .await;
        let id = platform.entity_ids()[0].clone();

        assert!(platform.refresh(&id).await);
        assert_eq!(states.get_state("sensor.manual").as_deref(), Some("1"));
    }
}
