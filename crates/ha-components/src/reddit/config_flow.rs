//! Config flow for the Reddit integration
//!
//! Two steps: `user` collects and checks the app credentials, `feed` picks
//! the subreddits and checks that they exist. Both probes hit Reddit live.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{
    ConfigData, DataSchema, FieldType, FlowError, FlowHandler, FlowStep, SchemaField,
    SelectSelector, STEP_USER,
};
use ha_core::consts::{
    CONF_CLIENT_ID, CONF_CLIENT_SECRET, CONF_MAXIMUM, CONF_NAME, CONF_PASSWORD, CONF_USERNAME,
};
use serde_json::{json, Value};
use tracing::debug;

use super::api::{RedditApi, RedditClientFactory, RedditCredentials, RedditError};
use super::consts::{
    CONF_SORT_BY, CONF_SUBREDDITS, DEFAULT_MAXIMUM, DEFAULT_NAME, DEFAULT_SORT_BY,
    ERROR_INVALID_SUBREDDIT, ERROR_NO_SUBREDDITS, ERROR_PRAW, ERROR_UNAUTHORIZED,
    ERROR_UNKNOWN_RESPONSE, LIST_TYPES, STEP_FEED,
};

pub fn user_step_schema() -> DataSchema {
    DataSchema::new()
        .field(SchemaField::required(CONF_NAME, FieldType::String).default(json!(DEFAULT_NAME)))
        .field(SchemaField::required(CONF_CLIENT_ID, FieldType::String))
        .field(SchemaField::required(CONF_CLIENT_SECRET, FieldType::String))
        .field(SchemaField::required(CONF_USERNAME, FieldType::String))
        .field(SchemaField::required(CONF_PASSWORD, FieldType::String))
}

pub fn feed_step_schema() -> DataSchema {
    DataSchema::new()
        .field(
            SchemaField::required(
                CONF_SUBREDDITS,
                FieldType::Select(
                    SelectSelector::new(Vec::<String>::new())
                        .multiple()
                        .custom_value()
                        .sorted(),
                ),
            )
            .default(json!([])),
        )
        .field(
            SchemaField::optional(
                CONF_SORT_BY,
                FieldType::Select(SelectSelector::new(LIST_TYPES).sorted()),
            )
            .default(json!(DEFAULT_SORT_BY)),
        )
        .field(
            SchemaField::optional(CONF_MAXIMUM, FieldType::PositiveInt)
                .default(json!(DEFAULT_MAXIMUM)),
        )
}

/// Wizard error code for a failed credential probe
fn auth_error_code(err: &RedditError) -> &'static str {
    match err.status() {
        Some(401) => ERROR_UNAUTHORIZED,
        Some(_) => ERROR_UNKNOWN_RESPONSE,
        None => ERROR_PRAW,
    }
}

/// Wizard error code for a failed subreddit probe
fn feed_error_code(err: &RedditError) -> &'static str {
    match err {
        RedditError::Redirect(_) => ERROR_INVALID_SUBREDDIT,
        RedditError::NoSubreddits => ERROR_NO_SUBREDDITS,
        other => auth_error_code(other),
    }
}

fn base_error(code: &str) -> HashMap<String, String> {
    HashMap::from([("base".to_string(), code.to_string())])
}

pub struct RedditConfigFlow {
    clients: Arc<dyn RedditClientFactory>,
    auth: Option<ConfigData>,
    client: Option<Arc<dyn RedditApi>>,
}

impl RedditConfigFlow {
    pub const VERSION: u32 = 1;

    pub fn new(clients: Arc<dyn RedditClientFactory>) -> Self {
        Self {
            clients,
            auth: None,
            client: None,
        }
    }

    async fn authenticate(&self, input: &ConfigData) -> Result<Arc<dyn RedditApi>, RedditError> {
        let credentials = RedditCredentials::from_data(input)
            .ok_or_else(|| RedditError::OAuth("incomplete credentials".to_string()))?;
        let client = self.clients.create(&credentials)?;
        if let Err(err) = client.me().await {
            client.close().await;
            return Err(err);
        }
        Ok(client)
    }

    async fn step_user(&mut self, user_input: Option<ConfigData>) -> FlowStep {
        let mut errors = HashMap::new();
        if let Some(input) = user_input {
            match self.authenticate(&input).await {
                Ok(client) => {
                    self.auth = Some(input);
                    self.client = Some(client);
                    return FlowStep::form(STEP_FEED, feed_step_schema());
                }
                Err(err) => {
                    debug!("Reddit authentication failed: {}", err);
                    errors = base_error(auth_error_code(&err));
                }
            }
        }
        FlowStep::form_with_errors(STEP_USER, user_step_schema(), errors)
    }

    async fn step_feed(&mut self, user_input: Option<ConfigData>) -> Result<FlowStep, FlowError> {
        let (Some(auth), Some(client)) = (self.auth.as_ref(), self.client.clone()) else {
            return Err(FlowError::Handler(
                "feed step reached without authentication".to_string(),
            ));
        };

        let mut errors = HashMap::new();
        if let Some(input) = user_input {
            let subreddits: Vec<String> = input
                .get(CONF_SUBREDDITS)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            match client.validate_subreddits(&subreddits).await {
                Ok(()) => {
                    client.close().await;
                    self.client = None;

                    let title = auth
                        .get(CONF_NAME)
                        .and_then(Value::as_str)
                        .unwrap_or(DEFAULT_NAME)
                        .to_string();
                    let mut data = auth.clone();
                    data.extend(input);
                    return Ok(FlowStep::create_entry(title, data));
                }
                Err(err) => {
                    debug!("Subreddit check failed: {}", err);
                    errors = base_error(feed_error_code(&err));
                }
            }
        }
        Ok(FlowStep::form_with_errors(STEP_FEED, feed_step_schema(), errors))
    }
}

#[async_trait]
impl FlowHandler for RedditConfigFlow {
    fn version(&self) -> u32 {
        Self::VERSION
    }

    async fn step(
        &mut self,
        step_id: &str,
        user_input: Option<ConfigData>,
    ) -> Result<FlowStep, FlowError> {
        match step_id {
            STEP_USER => Ok(self.step_user(user_input).await),
            STEP_FEED => self.step_feed(user_input).await,
            other => Err(FlowError::UnknownStep(other.to_string())),
        }
    }

    async fn on_remove(&mut self) {
        if let Some(client) = self.client.take() {
            client.close().await;
        }
    }
}
