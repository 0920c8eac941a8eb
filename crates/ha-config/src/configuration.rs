//! Top-level `configuration.yaml` and the platform blocks inside it
//!
//! Entity domains list their platforms as a sequence of mappings, each with a
//! `platform:` key. Home Assistant also accepts suffixed keys such as
//! `sensor feeds:` for the same domain, so all of them are collected.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

pub const CONFIG_FILE: &str = "configuration.yaml";

/// One `- platform: xyz` block under an entity domain
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformConfig {
    pub domain: String,
    pub platform: String,
    /// Block contents, `platform` key included
    pub config: Value,
}

impl PlatformConfig {
    /// Deserialize the block into an integration's typed schema
    pub fn parse<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        serde_yaml::from_value(self.config.clone()).map_err(|e| {
            ConfigError::InvalidPlatformConfig {
                domain: self.domain.clone(),
                platform: self.platform.clone(),
                reason: e.to_string(),
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    root: serde_yaml::Mapping,
}

impl Configuration {
    /// Load `configuration.yaml`; a missing file gives an empty configuration
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        if !config_dir.join(CONFIG_FILE).is_file() {
            debug!("No {} in {:?}", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }
        let value = YamlLoader::new(config_dir)?.load_file(CONFIG_FILE)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> ConfigResult<Self> {
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            _ => Err(ConfigError::InvalidValue {
                key: CONFIG_FILE.to_string(),
                reason: "top level must be a mapping".to_string(),
            }),
        }
    }

    /// Top-level keys present
    pub fn domains(&self) -> Vec<String> {
        self.root
            .keys()
            .filter_map(|k| k.as_str())
            .map(|k| domain_of(k).to_string())
            .collect()
    }

    /// All platform blocks under `domain`, optionally only for one platform
    pub fn platforms(&self, domain: &str, platform: Option<&str>) -> Vec<PlatformConfig> {
        let mut found = Vec::new();

        for (key, value) in &self.root {
            let Some(key) = key.as_str() else { continue };
            if domain_of(key) != domain {
                continue;
            }

            let blocks: Vec<&Value> = match value {
                Value::Sequence(seq) => seq.iter().collect(),
                Value::Mapping(_) => vec![value],
                Value::Null => Vec::new(),
                _ => {
                    warn!("Ignoring {}: expected a list of platforms", key);
                    continue;
                }
            };

            for block in blocks {
                let Some(name) = block.get("platform").and_then(Value::as_str) else {
                    warn!("Ignoring {} entry without a platform key", key);
                    continue;
                };
                if platform.map_or(true, |p| p == name) {
                    found.push(PlatformConfig {
                        domain: domain.to_string(),
                        platform: name.to_string(),
                        config: block.clone(),
                    });
                }
            }
        }

        found
    }
}

/// `sensor feeds` → `sensor`
fn domain_of(key: &str) -> &str {
    key.split_whitespace().next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
homeassistant:
  name: Home
sensor:
  - platform: reddit
    subreddits: rust
  - platform: template
sensor feeds:
  - platform: reddit
    subreddits:
      - news
      - worldnews
"#;

    #[test]
    fn test_platforms_collects_suffixed_keys() {
        let value: Value = serde_yaml::from_str(CONFIG).unwrap();
        let config = Configuration::from_value(value).unwrap();

        let reddit = config.platforms("sensor", Some("reddit"));
        assert_eq!(reddit.len(), 2);
        assert!(reddit.iter().all(|p| p.platform == "reddit"));

        assert_eq!(config.platforms("sensor", None).len(), 3);
        assert!(config.platforms("tts", None).is_empty());
    }

    #[test]
    fn test_parse_typed_block() {
        #[derive(Deserialize)]
        struct Block {
            platform: String,
            subreddits: Value,
        }

        let value: Value = serde_yaml::from_str(CONFIG).unwrap();
        let config = Configuration::from_value(value).unwrap();
        let block: Block = config.platforms("sensor", Some("reddit"))[0].parse().unwrap();
        assert_eq!(block.platform, "reddit");
        assert_eq!(block.subreddits.as_str(), Some("rust"));
    }

    #[test]
    fn test_parse_error_names_platform() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Block {
            missing: String,
        }

        let value: Value = serde_yaml::from_str(CONFIG).unwrap();
        let config = Configuration::from_value(value).unwrap();
        let err = config.platforms("sensor", Some("reddit"))[0]
            .parse::<Block>()
            .unwrap_err();
        assert!(err.to_string().contains("[sensor.reddit]"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = Configuration::load(dir.path()).unwrap();
        assert!(config.domains().is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), CONFIG).unwrap();

        let config = Configuration::load(dir.path()).unwrap();
        let domains = config.domains();
        assert!(domains.contains(&"homeassistant".to_string()));
        assert!(domains.contains(&"sensor".to_string()));
    }
}
