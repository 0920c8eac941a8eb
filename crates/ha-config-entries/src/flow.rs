//! Config and options flows
//!
//! A flow is a short interactive wizard. Each step either shows a form, aborts,
//! or creates an entry. The [`FlowManager`] keeps in-progress flows by id,
//! validates submitted input against the form the step showed, and turns a
//! finished flow into a new config entry (config flows) or into new options
//! for an existing entry (options flows).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::entry::{ConfigData, ConfigEntry, ConfigEntrySource};
use crate::manager::{ConfigEntries, ConfigEntriesError};
use crate::schema::{DataSchema, SchemaError};

/// Step id a user-initiated config flow starts at
pub const STEP_USER: &str = "user";
/// Step id an options flow starts at
pub const STEP_INIT: &str = "init";

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("No config flow registered for {0}")]
    UnknownHandler(String),

    #[error("No options flow registered for {0}")]
    NoOptionsFlow(String),

    #[error("Flow not found: {0}")]
    UnknownFlow(String),

    #[error("Flow has no step {0}")]
    UnknownStep(String),

    #[error("Invalid user input: {0}")]
    InvalidData(#[from] SchemaError),

    #[error("Config entry not found: {0}")]
    EntryNotFound(String),

    #[error("Flow cannot continue: {0}")]
    Handler(String),

    #[error(transparent)]
    Entries(#[from] ConfigEntriesError),
}

/// What a step asks the manager to do next
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStep {
    Form {
        step_id: String,
        data_schema: DataSchema,
        errors: HashMap<String, String>,
        last_step: Option<bool>,
    },
    CreateEntry {
        title: String,
        data: ConfigData,
        options: ConfigData,
    },
    Abort {
        reason: String,
    },
}

impl FlowStep {
    pub fn form(step_id: impl Into<String>, data_schema: DataSchema) -> Self {
        Self::form_with_errors(step_id, data_schema, HashMap::new())
    }

    pub fn form_with_errors(
        step_id: impl Into<String>,
        data_schema: DataSchema,
        errors: HashMap<String, String>,
    ) -> Self {
        FlowStep::Form {
            step_id: step_id.into(),
            data_schema,
            errors,
            last_step: None,
        }
    }

    pub fn create_entry(title: impl Into<String>, data: ConfigData) -> Self {
        FlowStep::CreateEntry {
            title: title.into(),
            data,
            options: ConfigData::new(),
        }
    }

    /// Initial options stored alongside a created entry
    pub fn with_options(self, initial: ConfigData) -> Self {
        match self {
            FlowStep::CreateEntry { title, data, .. } => FlowStep::CreateEntry {
                title,
                data,
                options: initial,
            },
            other => other,
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        FlowStep::Abort {
            reason: reason.into(),
        }
    }
}

/// One wizard, config or options
#[async_trait]
pub trait FlowHandler: Send {
    /// Version stamped on entries this flow creates
    fn version(&self) -> u32 {
        1
    }

    /// Run step `step_id`. `user_input` is `None` the first time a step is
    /// shown and the validated form data after the user submits it.
    async fn step(
        &mut self,
        step_id: &str,
        user_input: Option<ConfigData>,
    ) -> Result<FlowStep, FlowError>;

    /// Called when the flow ends without a step creating an entry
    async fn on_remove(&mut self) {}
}

/// Creates a fresh config flow for a domain
pub type ConfigFlowFactory = Arc<dyn Fn() -> Box<dyn FlowHandler> + Send + Sync>;

/// Creates an options flow bound to an existing entry
pub type OptionsFlowFactory = Arc<
    dyn Fn(&ConfigEntry, &ConfigEntries) -> Result<Box<dyn FlowHandler>, FlowError> + Send + Sync,
>;

/// Wrap a constructor as a [`ConfigFlowFactory`]
pub fn config_flow<F, H>(f: F) -> ConfigFlowFactory
where
    F: Fn() -> H + Send + Sync + 'static,
    H: FlowHandler + 'static,
{
    Arc::new(move || Box::new(f()) as Box<dyn FlowHandler>)
}

/// Wrap a constructor as an [`OptionsFlowFactory`]
pub fn options_flow<F, H>(f: F) -> OptionsFlowFactory
where
    F: Fn(&ConfigEntry, &ConfigEntries) -> Result<H, FlowError> + Send + Sync + 'static,
    H: FlowHandler + 'static,
{
    Arc::new(
        move |entry: &ConfigEntry,
              entries: &ConfigEntries|
              -> Result<Box<dyn FlowHandler>, FlowError> {
            let handler = f(entry, entries)?;
            Ok(Box::new(handler))
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    Form,
    CreateEntry,
    Abort,
}

/// Result of starting or continuing a flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub flow_id: String,
    /// Integration domain
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_schema: Option<DataSchema>,
    pub errors: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_step: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ConfigData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ConfigData>,
    /// Entry created (config flow) or updated (options flow)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl FlowResult {
    fn new(flow_id: &str, handler: &str, result_type: FlowResultType) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            handler: handler.to_string(),
            result_type,
            step_id: None,
            data_schema: None,
            errors: HashMap::new(),
            last_step: None,
            title: None,
            reason: None,
            version: None,
            data: None,
            options: None,
            entry_id: None,
        }
    }
}

/// In-progress flow listing entry
#[derive(Debug, Clone, Serialize)]
pub struct FlowProgress {
    pub flow_id: String,
    pub handler: String,
}

#[derive(Debug, Clone)]
enum FlowKind {
    Config { source: ConfigEntrySource },
    Options { entry_id: String },
}

struct ActiveFlow {
    handler: Box<dyn FlowHandler>,
    step_id: String,
    schema: Option<DataSchema>,
}

struct FlowSlot {
    domain: String,
    kind: FlowKind,
    active: Arc<Mutex<ActiveFlow>>,
}

/// Manager for config and options flows
pub struct FlowManager {
    entries: Arc<ConfigEntries>,
    config_flows: DashMap<String, ConfigFlowFactory>,
    options_flows: DashMap<String, OptionsFlowFactory>,
    flows: DashMap<String, FlowSlot>,
}

impl FlowManager {
    pub fn new(entries: Arc<ConfigEntries>) -> Self {
        Self {
            entries,
            config_flows: DashMap::new(),
            options_flows: DashMap::new(),
            flows: DashMap::new(),
        }
    }

    pub fn register_config_flow(&self, domain: &str, factory: ConfigFlowFactory) {
        self.config_flows.insert(domain.to_string(), factory);
        debug!("Registered config flow for {}", domain);
    }

    pub fn register_options_flow(&self, domain: &str, factory: OptionsFlowFactory) {
        self.options_flows.insert(domain.to_string(), factory);
        debug!("Registered options flow for {}", domain);
    }

    /// Whether entries of this domain can be edited through an options flow
    pub fn supports_options(&self, domain: &str) -> bool {
        self.options_flows.contains_key(domain)
    }

    /// Start a user config flow for a domain
    pub async fn init(&self, domain: &str) -> Result<FlowResult, FlowError> {
        let factory = self
            .config_flows
            .get(domain)
            .map(|f| f.value().clone())
            .ok_or_else(|| FlowError::UnknownHandler(domain.to_string()))?;

        let kind = FlowKind::Config {
            source: ConfigEntrySource::User,
        };
        self.start(domain, kind, factory(), STEP_USER).await
    }

    /// Start an options flow for an existing entry
    pub async fn init_options(&self, entry_id: &str) -> Result<FlowResult, FlowError> {
        let entry = self
            .entries
            .get(entry_id)
            .ok_or_else(|| FlowError::EntryNotFound(entry_id.to_string()))?;
        let factory = self
            .options_flows
            .get(&entry.domain)
            .map(|f| f.value().clone())
            .ok_or_else(|| FlowError::NoOptionsFlow(entry.domain.clone()))?;

        let handler = factory(&entry, &self.entries)?;
        let kind = FlowKind::Options {
            entry_id: entry_id.to_string(),
        };
        self.start(&entry.domain, kind, handler, STEP_INIT).await
    }

    async fn start(
        &self,
        domain: &str,
        kind: FlowKind,
        handler: Box<dyn FlowHandler>,
        first_step: &str,
    ) -> Result<FlowResult, FlowError> {
        let flow_id = Ulid::new().to_string();
        let active = Arc::new(Mutex::new(ActiveFlow {
            handler,
            step_id: first_step.to_string(),
            schema: None,
        }));
        self.flows.insert(
            flow_id.clone(),
            FlowSlot {
                domain: domain.to_string(),
                kind: kind.clone(),
                active: active.clone(),
            },
        );
        debug!("Started {:?} flow {} for {}", kind, flow_id, domain);

        let mut guard = active.lock().await;
        let outcome = guard.handler.step(first_step, None).await;
        self.advance(&flow_id, domain, &kind, &mut guard, outcome)
            .await
    }

    /// Submit input to the current step of a flow
    pub async fn configure(
        &self,
        flow_id: &str,
        user_input: ConfigData,
    ) -> Result<FlowResult, FlowError> {
        let (domain, kind, active) = {
            let slot = self
                .flows
                .get(flow_id)
                .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
            (slot.domain.clone(), slot.kind.clone(), slot.active.clone())
        };

        let mut guard = active.lock().await;
        let validated = match &guard.schema {
            Some(schema) => schema.validate(&user_input)?,
            None => user_input,
        };
        let step_id = guard.step_id.clone();
        let outcome = guard.handler.step(&step_id, Some(validated)).await;
        self.advance(flow_id, &domain, &kind, &mut guard, outcome)
            .await
    }

    /// Abandon a flow
    pub async fn abort(&self, flow_id: &str) -> Result<(), FlowError> {
        let (_, slot) = self
            .flows
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        slot.active.lock().await.handler.on_remove().await;
        debug!("Aborted flow {}", flow_id);
        Ok(())
    }

    /// Flows currently waiting for input
    pub fn in_progress(&self) -> Vec<FlowProgress> {
        self.flows
            .iter()
            .map(|slot| FlowProgress {
                flow_id: slot.key().clone(),
                handler: slot.domain.clone(),
            })
            .collect()
    }

    async fn advance(
        &self,
        flow_id: &str,
        domain: &str,
        kind: &FlowKind,
        active: &mut ActiveFlow,
        outcome: Result<FlowStep, FlowError>,
    ) -> Result<FlowResult, FlowError> {
        let step = match outcome {
            Ok(step) => step,
            Err(err) => {
                // a handler failure ends the flow; bad input keeps it open
                if !matches!(err, FlowError::InvalidData(_)) {
                    self.flows.remove(flow_id);
                    active.handler.on_remove().await;
                }
                return Err(err);
            }
        };

        match step {
            FlowStep::Form {
                step_id,
                data_schema,
                errors,
                last_step,
            } => {
                active.step_id = step_id.clone();
                active.schema = Some(data_schema.clone());

                let mut result = FlowResult::new(flow_id, domain, FlowResultType::Form);
                result.step_id = Some(step_id);
                result.data_schema = Some(data_schema);
                result.errors = errors;
                result.last_step = last_step;
                Ok(result)
            }
            FlowStep::Abort { reason } => {
                self.flows.remove(flow_id);
                active.handler.on_remove().await;
                info!("Flow {} for {} aborted: {}", flow_id, domain, reason);

                let mut result = FlowResult::new(flow_id, domain, FlowResultType::Abort);
                result.reason = Some(reason);
                Ok(result)
            }
            FlowStep::CreateEntry {
                title,
                data,
                options,
            } => {
                self.flows.remove(flow_id);
                let mut result = FlowResult::new(flow_id, domain, FlowResultType::CreateEntry);

                match kind {
                    FlowKind::Config { source } => {
                        let version = active.handler.version();
                        let entry = ConfigEntry::new(domain, title.clone())
                            .with_data(data.clone())
                            .with_options(options.clone())
                            .with_source(source.clone())
                            .with_version(version);
                        let entry = self.entries.add(entry).await?;
                        if let Err(err) = self.entries.setup(&entry.entry_id).await {
                            warn!("Entry {} created but setup failed: {}", entry.entry_id, err);
                        }
                        result.version = Some(version);
                        result.entry_id = Some(entry.entry_id);
                    }
                    FlowKind::Options { entry_id } => {
                        self.entries.update_options(entry_id, data.clone()).await?;
                        result.entry_id = Some(entry_id.clone());
                    }
                }

                result.title = Some(title);
                result.data = Some(data);
                result.options = Some(options);
                Ok(result)
            }
        }
    }
}
