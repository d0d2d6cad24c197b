//! Record — one persisted item of an entity.
//!
//! A record is a JSON object (field name → value). Every stored record
//! carries an opaque `id` plus `createdAt`/`updatedAt` ISO-8601 stamps.
//! Patching never mutates in place: [`Record::apply_patch`] returns a new
//! value so a copy held in the cache can never be aliased by a writer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Reserved field carrying the record's unique id.
pub const ID_FIELD: &str = "id";
/// Reserved field carrying the creation timestamp.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Reserved field carrying the last-update timestamp.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Filter map: field name → exact-match value, AND-combined across fields.
pub type Filters = Map<String, Value>;

/// A single entity record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    /// Generate a new opaque record id. UUID v7 — time-ordered prefix,
    /// random suffix; collisions treated as negligible.
    pub fn new_id() -> String {
        Uuid::now_v7().to_string()
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn created_at(&self) -> Option<&str> {
        self.0.get(CREATED_AT_FIELD).and_then(Value::as_str)
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.0.get(UPDATED_AT_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Merge `patch` over this record, returning a new record. Fields absent
    /// from the patch retain their prior values.
    pub fn apply_patch(&self, patch: &Map<String, Value>) -> Record {
        let mut merged = self.0.clone();
        for (field, value) in patch {
            merged.insert(field.clone(), value.clone());
        }
        Record(merged)
    }

    /// Exact-match equality per filter field, AND-combined. An empty filter
    /// map matches everything.
    pub fn matches(&self, filters: &Filters) -> bool {
        filters
            .iter()
            .all(|(field, expected)| self.0.get(field) == Some(expected))
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}
