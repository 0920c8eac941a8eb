//! Core types for Home Assistant
//!
//! This crate provides the fundamental types shared by the host runtime and
//! the integrations: EntityId, State, Context, Platform and the host-level
//! error types integrations raise.

mod context;
mod entity_id;
mod error;
mod platform;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use error::{ConfigEntryError, HomeAssistantError};
pub use platform::Platform;
pub use state::State;

/// Maximum length for a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// State value used when actual state exceeds MAX_STATE_LENGTH
pub const STATE_UNKNOWN: &str = "unknown";

/// Configuration keys shared across integrations
pub mod consts {
    pub const CONF_CLIENT_ID: &str = "client_id";
    pub const CONF_CLIENT_SECRET: &str = "client_secret";
    pub const CONF_MAXIMUM: &str = "maximum";
    pub const CONF_NAME: &str = "name";
    pub const CONF_PASSWORD: &str = "password";
    pub const CONF_URL: &str = "url";
    pub const CONF_USERNAME: &str = "username";

    pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
    pub const ATTR_ICON: &str = "icon";
}
