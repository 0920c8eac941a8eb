//! Config Entries
//!
//! This crate provides the configuration entry system for Home Assistant.
//! Config entries represent individual integration instances and manage
//! their lifecycle (setup, unload, reload).
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`FlowManager`] - Config and options flows that create and edit entries
//! - [`DataSchema`] - Form description and validation for flow steps
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking for migrations.

pub mod entry;
pub mod flow;
pub mod manager;
pub mod schema;
pub mod state_machine;
pub mod storage;

// Re-export main types
pub use entry::{
    ConfigData, ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, ConfigEntryState,
    ConfigEntryUpdate,
};

pub use flow::{
    config_flow, options_flow, ConfigFlowFactory, FlowError, FlowHandler, FlowManager, FlowProgress, FlowResult,
    FlowResultType, FlowStep, OptionsFlowFactory, STEP_INIT, STEP_USER,
};

pub use manager::{
    update_listener, ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult,
    EntryHandler, RuntimeData, UpdateListener, STORAGE_KEY, STORAGE_MINOR_VERSION,
    STORAGE_VERSION,
};

pub use schema::{DataSchema, FieldType, SchemaError, SchemaField, SelectMode, SelectSelector};
pub use state_machine::InvalidTransition;
pub use storage::{Storage, StorageError, StorageFile, StorageResult};
