//! Entity model shared by every platform

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::tts::TextToSpeechEntity;

/// Kind of device an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEntryType {
    /// A remote service rather than a physical device
    Service,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, id)` pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<DeviceEntryType>,
}

/// Something that has a state in the state store
#[async_trait]
pub trait Entity: Send + Sync {
    /// Display name, also used to derive the entity_id
    fn name(&self) -> Option<String>;

    fn unique_id(&self) -> Option<String> {
        None
    }

    fn icon(&self) -> Option<String> {
        None
    }

    /// Current state value; `None` is written as `unknown`
    fn state(&self) -> Option<String> {
        None
    }

    fn attributes(&self) -> HashMap<String, Value> {
        HashMap::new()
    }

    /// Whether the platform should call [`Entity::update`] on an interval
    fn should_poll(&self) -> bool {
        false
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    /// Refresh cached data from the source
    async fn update(&mut self) {}

    /// Text-to-speech view of this entity, if it is one
    fn as_tts(&self) -> Option<&dyn TextToSpeechEntity> {
        None
    }
}

/// An entity owned by a platform, shared with its poller
pub type SharedEntity = Arc<RwLock<Box<dyn Entity>>>;
