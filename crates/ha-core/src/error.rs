//! Host-level errors raised by integrations

use thiserror::Error;

/// Generic error surfaced to whoever called into an entity (e.g. a TTS
/// request that could not be served)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HomeAssistantError(pub String);

impl HomeAssistantError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Raised from an integration's setup when the entry can never be set up as
/// configured. The entry ends in `SetupError` and is not retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ConfigEntryError(pub String);

impl ConfigEntryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
