//! YAML loader with Home Assistant's custom tags
//!
//! - `!include path` - Include another YAML file, relative to the including file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files currently being loaded, innermost last
    include_stack: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_stack: Vec::new(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load a file relative to the config directory
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = resolve(&self.config_dir, path.as_ref());
        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }
        debug!("Loading YAML file: {:?}", path);

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.include_stack.push(path.clone());
        let result = self.load_str(&content, &path);
        self.include_stack.pop();
        result
    }

    /// Parse YAML text; `source` names it in errors and anchors relative includes
    pub fn load_str(&mut self, content: &str, source: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source.to_path_buf(),
            source: e,
        })?;
        // an empty document is an empty config, not null
        if value.is_null() {
            return Ok(Value::Mapping(Default::default()));
        }
        self.resolve_value(value, source)
    }

    fn resolve_value(&mut self, value: Value, source: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, source),
            Value::Mapping(map) => {
                let mut resolved = serde_yaml::Mapping::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve_value(value, source)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.resolve_value(v, source))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, source: &Path) -> ConfigResult<Value> {
        trace!("Resolving tag {} in {:?}", tagged.tag, source);

        if tagged.tag == "include" {
            let target = tag_argument("!include", &tagged.value)?;
            let base = source.parent().unwrap_or(&self.config_dir).to_path_buf();
            return self.load_file(resolve(&base, Path::new(target)));
        }
        if tagged.tag == "secret" {
            let key = tag_argument("!secret", &tagged.value)?;
            return Ok(Value::String(self.secrets.get(key)?.to_string()));
        }
        if tagged.tag == "env_var" {
            return env_var(tag_argument("!env_var", &tagged.value)?);
        }

        // unknown tags pass through with their contents resolved
        let value = self.resolve_value(tagged.value, source)?;
        Ok(Value::Tagged(Box::new(TaggedValue {
            tag: tagged.tag,
            value,
        })))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn tag_argument<'a>(tag: &str, value: &'a Value) -> ConfigResult<&'a str> {
    value.as_str().ok_or_else(|| ConfigError::InvalidValue {
        key: tag.to_string(),
        reason: "expected a string argument".to_string(),
    })
}

fn env_var(argument: &str) -> ConfigResult<Value> {
    let mut parts = argument.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let default = parts.next().map(str::trim);

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(Value::String(value)),
        (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
        (Err(_), None) => Err(ConfigError::EnvVarNotFound {
            var: name.to_string(),
        }),
    }
}

/// Load a YAML file with full tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        value.get(key).unwrap()
    }

    #[test]
    fn test_secret_substitution() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "reddit_password: hunter2\n");
        write_file(
            dir.path(),
            "configuration.yaml",
            "sensor:\n  - platform: reddit\n    password: !secret reddit_password\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        let sensor = &get(&value, "sensor")[0];
        assert_eq!(get(sensor, "password").as_str(), Some("hunter2"));
    }

    #[test]
    fn test_missing_secret() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "configuration.yaml", "password: !secret nope\n");

        let result = load_yaml(dir.path(), "configuration.yaml");
        assert!(matches!(result, Err(ConfigError::SecretNotFound { .. })));
    }

    #[test]
    fn test_env_var_with_default() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("HA_CONFIG_TEST_URL", "http://tts.local:5000");
        write_file(
            dir.path(),
            "configuration.yaml",
            "url: !env_var HA_CONFIG_TEST_URL\nlang: !env_var HA_CONFIG_TEST_UNSET en\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(get(&value, "url").as_str(), Some("http://tts.local:5000"));
        assert_eq!(get(&value, "lang").as_str(), Some("en"));
        std::env::remove_var("HA_CONFIG_TEST_URL");
    }

    #[test]
    fn test_env_var_missing() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "configuration.yaml",
            "x: !env_var HA_CONFIG_TEST_DEFINITELY_UNSET\n",
        );

        let result = load_yaml(dir.path(), "configuration.yaml");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
    }

    #[test]
    fn test_include_relative_to_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "packages/feeds.yaml", "- platform: reddit\n");
        write_file(
            dir.path(),
            "configuration.yaml",
            "sensor: !include packages/feeds.yaml\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        let sensor = get(&value, "sensor").as_sequence().unwrap();
        assert_eq!(sensor.len(), 1);
    }

    #[test]
    fn test_circular_include() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "a: !include a.yaml\n");

        let result = load_yaml(dir.path(), "a.yaml");
        assert!(matches!(result, Err(ConfigError::CircularInclude { .. })));
    }

    #[test]
    fn test_empty_file_is_empty_mapping() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "configuration.yaml", "");

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert!(value.as_mapping().unwrap().is_empty());
    }
}
