//! Storage drivers - uniform CRUD contract over concrete storage media.
//!
//! Every backend implements [`StorageDriver`] with identical semantics, so
//! the orchestrator only ever holds a `Box<dyn StorageDriver>`. Backends are
//! a closed set: one module per medium.

mod filesystem;
mod key_value;
mod object_store;
mod spreadsheet;

use std::fmt;

use crate::record::{Filters, Record};

pub use filesystem::{FileDriver, FileFormat};
pub use key_value::{InMemoryKeyValue, KeyValueBackend, KeyValueDriver};
pub use object_store::{InMemoryObjectStore, ObjectStoreBackend, ObjectStoreDriver};
pub use spreadsheet::{InMemorySheet, SheetClient, SpreadsheetDriver};

/// Uniform CRUD contract honored by all backends.
///
/// Filter semantics are exact-match equality per field, AND-combined. No
/// backend is required to push filters down; a linear scan is acceptable.
pub trait StorageDriver: Send + Sync {
    /// Prepare the backend (directories, stores, tabs). Idempotent.
    fn initialize(&self) -> Result<(), DriverError>;

    /// Persist a new record. Never silently overwrites: a key collision is
    /// a [`DriverError::Duplicate`] where the backend can detect it.
    fn create(&self, record: Record) -> Result<Record, DriverError>;

    /// Point lookup on the key field, or a linear-scan filter match.
    /// Returns `Ok(None)` when nothing matches.
    fn read(&self, query: &Filters) -> Result<Option<Record>, DriverError>;

    /// Merge `patch` into the record identified by `id`.
    fn update(&self, id: &str, patch: &Record) -> Result<Record, DriverError>;

    /// Remove the record identified by `id`. After success the record is
    /// invisible to `read` and `list`.
    fn delete(&self, id: &str) -> Result<(), DriverError>;

    /// All records matching `filters` (possibly empty).
    fn list(&self, filters: &Filters) -> Result<Vec<Record>, DriverError>;
}

/// Error type for driver operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// No record with this id.
    NotFound { id: String },
    /// A record with this key already exists.
    Duplicate { id: String },
    /// The backend cannot operate in this runtime.
    Unsupported(String),
    /// I/O or transport failure.
    Io(String),
    /// Serialization/deserialization failure.
    Serde(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::NotFound { id } => write!(f, "record not found: {}", id),
            DriverError::Duplicate { id } => write!(f, "record already exists: {}", id),
            DriverError::Unsupported(msg) => write!(f, "backend unsupported: {}", msg),
            DriverError::Io(msg) => write!(f, "storage i/o error: {}", msg),
            DriverError::Serde(msg) => write!(f, "storage serialization error: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Serde(err.to_string())
    }
}
