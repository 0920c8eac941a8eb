//! Config and options flows for RemoteTTS

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{
    ConfigData, ConfigEntries, ConfigEntry, DataSchema, FieldType, FlowError, FlowHandler,
    FlowStep, SchemaField, STEP_INIT, STEP_USER,
};
use serde_json::{json, Value};
use tracing::warn;

use super::api::{RemoteTtsClientFactory, RemoteTtsError};
use super::consts::{
    ABORT_URL_NOT_ABSOLUTE, CONF_LANGUAGE, CONF_NAME, CONF_URL, DEFAULT_VOICE_NAME, ENTRY_TITLE,
    ERROR_CONNECTION, ERROR_INVALID_URL,
};
use super::RemoteTtsData;

pub fn settings_schema() -> DataSchema {
    DataSchema::new()
        .field(SchemaField::required(CONF_NAME, FieldType::String))
        .field(SchemaField::required(CONF_LANGUAGE, FieldType::String))
        .field(SchemaField::required(CONF_URL, FieldType::String))
}

/// Build a client for `url`, check the server answers, and let it go
async fn probe(clients: &dyn RemoteTtsClientFactory, url: &str) -> Result<(), RemoteTtsError> {
    let client = clients.create(url)?;
    let result = client.verify_connection().await;
    client.close().await;
    result
}

fn url_of(input: &ConfigData) -> &str {
    input.get(CONF_URL).and_then(Value::as_str).unwrap_or_default()
}

pub struct RemoteTtsConfigFlow {
    clients: Arc<dyn RemoteTtsClientFactory>,
}

impl RemoteTtsConfigFlow {
    pub const VERSION: u32 = 1;

    pub fn new(clients: Arc<dyn RemoteTtsClientFactory>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl FlowHandler for RemoteTtsConfigFlow {
    fn version(&self) -> u32 {
        Self::VERSION
    }

    async fn step(
        &mut self,
        step_id: &str,
        user_input: Option<ConfigData>,
    ) -> Result<FlowStep, FlowError> {
        if step_id != STEP_USER {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }

        let mut errors = HashMap::new();
        if let Some(input) = user_input {
            match probe(self.clients.as_ref(), url_of(&input)).await {
                Ok(()) => {
                    let initial_options: ConfigData = [
                        (CONF_NAME.to_string(), json!(DEFAULT_VOICE_NAME)),
                        (CONF_LANGUAGE.to_string(), json!("")),
                        (CONF_URL.to_string(), json!("")),
                    ]
                    .into_iter()
                    .collect();
                    return Ok(FlowStep::create_entry(ENTRY_TITLE, input)
                        .with_options(initial_options));
                }
                Err(err) if err.is_api_error() => {
                    warn!("RemoteTTS server check failed: {}", err);
                    errors.insert("base".to_string(), ERROR_INVALID_URL.to_string());
                }
                Err(err) => {
                    warn!("RemoteTTS URL rejected: {}", err);
                    errors.insert("base".to_string(), ERROR_CONNECTION.to_string());
                }
            }
        }

        Ok(FlowStep::form_with_errors(
            STEP_USER,
            settings_schema(),
            errors,
        ))
    }
}

/// Edit name, language and URL of an existing entry
pub struct RemoteTtsOptionsFlow {
    clients: Arc<dyn RemoteTtsClientFactory>,
    current: ConfigData,
}

impl RemoteTtsOptionsFlow {
    /// Seeds the form from the loaded entry, or from its stored data when
    /// setup failed
    pub fn new(
        clients: Arc<dyn RemoteTtsClientFactory>,
        entry: &ConfigEntry,
        entries: &ConfigEntries,
    ) -> Self {
        let current = match entries.runtime_data::<RemoteTtsData>(&entry.entry_id) {
            Some(data) => [
                (CONF_NAME.to_string(), json!(data.name)),
                (CONF_LANGUAGE.to_string(), json!(data.language)),
                (CONF_URL.to_string(), json!(data.url)),
            ]
            .into_iter()
            .collect(),
            None => entry.data.clone(),
        };
        Self { clients, current }
    }
}

#[async_trait]
impl FlowHandler for RemoteTtsOptionsFlow {
    async fn step(
        &mut self,
        step_id: &str,
        user_input: Option<ConfigData>,
    ) -> Result<FlowStep, FlowError> {
        if step_id != STEP_INIT {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }

        let Some(input) = user_input else {
            return Ok(FlowStep::form(
                STEP_INIT,
                settings_schema().with_suggested_values(&self.current),
            ));
        };

        match probe(self.clients.as_ref(), url_of(&input)).await {
            Ok(()) => Ok(FlowStep::create_entry(ENTRY_TITLE, input)),
            Err(RemoteTtsError::InvalidUrl(reason)) => {
                warn!("{}", reason);
                Ok(FlowStep::abort(ABORT_URL_NOT_ABSOLUTE))
            }
            Err(err) => {
                warn!("{}", err);
                Ok(FlowStep::abort(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_schema_requires_all_fields() {
        let input: ConfigData = serde_json::from_value(json!({"name": "Voice"})).unwrap();
        assert!(settings_schema().validate(&input).is_err());

        let input: ConfigData = serde_json::from_value(json!({
            "name": "Voice",
            "language": "en",
            "url": "http://tts.local"
        }))
        .unwrap();
        assert_eq!(settings_schema().validate(&input).unwrap(), input);
    }
}
