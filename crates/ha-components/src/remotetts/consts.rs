//! Constants for the RemoteTTS integration

pub use ha_core::consts::{CONF_NAME, CONF_URL};

pub const DOMAIN: &str = "remotetts";

pub const CONF_LANGUAGE: &str = "language";

pub const ENTRY_TITLE: &str = "RemoteTTS";
pub const DEFAULT_VOICE_NAME: &str = "RemoteTTS Voice";
pub const MANUFACTURER: &str = "RemoteTTS";

// config flow error codes
pub const ERROR_INVALID_URL: &str = "invalid_url";
pub const ERROR_CONNECTION: &str = "connection_error";

pub const ABORT_URL_NOT_ABSOLUTE: &str = "URL must be absolute";
