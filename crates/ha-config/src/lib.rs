//! YAML configuration loading for Home Assistant
//!
//! Loads `configuration.yaml` with Home Assistant's custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! and exposes the `- platform: xyz` blocks under entity domains so
//! integrations can set up legacy YAML platforms.
//!
//! # Example
//!
//! ```ignore
//! use ha_config::Configuration;
//!
//! let config = Configuration::load(Path::new("/config"))?;
//! for block in config.platforms("sensor", Some("reddit")) {
//!     let typed: MySchema = block.parse()?;
//! }
//! ```

mod configuration;
mod error;
mod loader;
mod secrets;

pub use configuration::{Configuration, PlatformConfig, CONFIG_FILE};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::{Secrets, SECRETS_FILE};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
