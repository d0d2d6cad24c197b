//! Schema — declarative field rules and validation for entity records.
//!
//! Each entity declares a [`Schema`]: field name → [`FieldRule`]. The
//! [`validate`] function checks a payload against the schema in either
//! [`ValidationMode::Create`] (required fields enforced) or
//! [`ValidationMode::Update`] (partial payloads allowed) and returns a list
//! of structured [`Violation`]s. It is a pure function: no side effects,
//! never panics, an empty list means the payload is valid.
//!
//! Unknown-field policy is strict: payload fields not declared in the schema
//! are rejected with [`ViolationCode::UnknownField`].

mod validate;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use validate::validate;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// ISO-8601 timestamp carried as a string. `date` accepted as an alias.
    #[serde(alias = "date")]
    Timestamp,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

/// String format constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Email,
}

/// Constraints for one schema field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    /// Minimum string length or numeric value, depending on `type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Maximum string length or numeric value, depending on `type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    /// Allowed value set.
    #[serde(
        rename = "enum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed: Option<Vec<Value>>,
    #[serde(
        rename = "minItems",
        alias = "min_items",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// One-way hash this field before storage (credentials).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hash: bool,
}

/// Field name → rule, for one entity. On the wire this is the
/// `{ "fields": { ... } }` object of an entity configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: BTreeMap<String, FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Builder-style field registration.
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    /// Names of fields marked `hash: true`.
    pub fn hashed_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, rule)| rule.hash)
            .map(|(name, _)| name.as_str())
    }
}

/// Validation mode: create enforces required fields, update allows partial
/// payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Create,
    Update,
}

/// Machine-readable violation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    Required,
    TypeMismatch,
    MinLength,
    MaxLength,
    MinValue,
    MaxValue,
    InvalidFormat,
    InvalidValue,
    MinItems,
    UnknownField,
}

/// One schema violation: which field broke which rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub code: ViolationCode,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, code: ViolationCode, message: impl Into<String>) -> Self {
        Violation {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
