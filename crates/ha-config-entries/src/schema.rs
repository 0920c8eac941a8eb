//! Form schemas for flow steps
//!
//! A [`DataSchema`] describes the fields a flow step asks for. The flow
//! manager validates submitted input against the schema of the form it last
//! showed, filling in defaults, before the step sees it.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::entry::ConfigData;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("required key not provided: {0}")]
    MissingRequired(String),

    #[error("extra keys not allowed: {0}")]
    ExtraKey(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// How a select selector renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectMode {
    #[default]
    Dropdown,
    List,
}

/// Choice from a list of options, optionally free-form and/or multiple
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SelectSelector {
    pub options: Vec<String>,
    pub multiple: bool,
    pub custom_value: bool,
    pub sort: bool,
    pub mode: SelectMode,
}

impl SelectSelector {
    pub fn new<S: Into<String>>(options: impl IntoIterator<Item = S>) -> Self {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn custom_value(mut self) -> Self {
        self.custom_value = true;
        self
    }

    pub fn sorted(mut self) -> Self {
        self.sort = true;
        self
    }

    fn check_option(&self, key: &str, value: &Value) -> Result<Value, SchemaError> {
        let Some(choice) = value.as_str() else {
            return Err(invalid(key, "expected a string"));
        };
        if !self.custom_value && !self.options.iter().any(|o| o == choice) {
            return Err(invalid(key, format!("value must be one of {:?}", self.options)));
        }
        Ok(Value::String(choice.to_string()))
    }
}

/// Type of value a field accepts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    String,
    /// Non-negative integer; numeric strings are coerced
    PositiveInt,
    Select(SelectSelector),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaField {
    pub name: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<Value>,
    #[serde(flatten)]
    pub field_type: FieldType,
}

impl SchemaField {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
            suggested_value: None,
            field_type,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn coerce(&self, value: &Value) -> Result<Value, SchemaError> {
        let key = self.name.as_str();
        match &self.field_type {
            FieldType::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                _ => Err(invalid(key, "expected a string")),
            },
            FieldType::PositiveInt => {
                let parsed = match value {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.trim().parse::<u64>().ok(),
                    _ => None,
                };
                parsed
                    .map(Value::from)
                    .ok_or_else(|| invalid(key, "expected a positive integer"))
            }
            FieldType::Select(selector) if selector.multiple => {
                let Some(items) = value.as_array() else {
                    return Err(invalid(key, "expected a list"));
                };
                items
                    .iter()
                    .map(|item| selector.check_option(key, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            FieldType::Select(selector) => selector.check_option(key, value),
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Ordered set of form fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataSchema {
    fields: Vec<SchemaField>,
}

impl DataSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate submitted input, returning it with defaults filled in
    pub fn validate(&self, input: &ConfigData) -> Result<ConfigData, SchemaError> {
        if let Some(extra) = input.keys().find(|k| self.get(k).is_none()) {
            return Err(SchemaError::ExtraKey(extra.clone()));
        }

        let mut validated = ConfigData::new();
        for field in &self.fields {
            match (input.get(&field.name), &field.default) {
                (Some(value), _) => {
                    validated.insert(field.name.clone(), field.coerce(value)?);
                }
                (None, Some(default)) => {
                    validated.insert(field.name.clone(), default.clone());
                }
                (None, None) if field.required => {
                    return Err(SchemaError::MissingRequired(field.name.clone()));
                }
                (None, None) => {}
            }
        }
        Ok(validated)
    }

    /// Copy of the schema with the frontend pre-filling these values
    pub fn with_suggested_values(&self, values: &ConfigData) -> Self {
        let fields = self
            .fields
            .iter()
            .cloned()
            .map(|mut field| {
                if let Some(value) = values.get(&field.name) {
                    field.suggested_value = Some(value.clone());
                }
                field
            })
            .collect();
        Self { fields }
    }
}
