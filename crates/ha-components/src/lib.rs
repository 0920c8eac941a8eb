//! Home Assistant Components
//!
//! The entity model, the host that config entries and platforms plug into,
//! and two integrations built on them:
//!
//! - [`reddit`] - subreddit post sensors
//! - [`remotetts`] - text-to-speech through a remote synthesis server

pub mod entity;
pub mod entity_platform;
pub mod hass;
pub mod reddit;
pub mod remotetts;
pub mod sensor;
pub mod tts;

pub use entity::{DeviceEntryType, DeviceInfo, Entity, SharedEntity};
pub use entity_platform::{EntityPlatform, DEFAULT_SCAN_INTERVAL};
pub use hass::{HomeAssistant, Integration};
pub use sensor::SensorEntity;
pub use tts::{get_tts_audio, TextToSpeechEntity, TtsAudio, TtsOptions, Voice};

use std::sync::Arc;

/// Register every integration this crate ships, talking to the real services
pub fn register_builtin_integrations(hass: &Arc<HomeAssistant>) {
    hass.register_integration(Arc::new(reddit::RedditIntegration::default()));
    hass.register_integration(Arc::new(remotetts::RemoteTtsIntegration::default()));
}
