//! ObjectStoreDriver - IndexedDB-style backend with per-record storage.
//!
//! Unlike the key-value driver, records live individually in an object store
//! keyed by id, behind [`ObjectStoreBackend`]. Outside a browser the
//! [`InMemoryObjectStore`] shim stands in; a driver constructed without a
//! backend fails `initialize` with `Unsupported`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::{DriverError, StorageDriver};
use crate::record::{Filters, Record};

/// Minimal object-store contract: per-record put/get/remove plus a full
/// scan of one store.
pub trait ObjectStoreBackend: Send + Sync {
    fn put(&self, store: &str, key: &str, value: &str) -> Result<(), DriverError>;
    fn get(&self, store: &str, key: &str) -> Result<Option<String>, DriverError>;
    fn remove(&self, store: &str, key: &str) -> Result<bool, DriverError>;
    fn scan(&self, store: &str) -> Result<Vec<String>, DriverError>;
}

/// In-memory stand-in for a browser object store.
///
/// Keys are `"store/key"`; a BTreeMap keeps scans deterministic.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    items: Arc<RwLock<BTreeMap<String, String>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn composite(store: &str, key: &str) -> String {
        format!("{}/{}", store, key)
    }
}

impl ObjectStoreBackend for InMemoryObjectStore {
    fn put(&self, store: &str, key: &str, value: &str) -> Result<(), DriverError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DriverError::Io("object store lock poisoned".into()))?;
        items.insert(Self::composite(store, key), value.to_string());
        Ok(())
    }

    fn get(&self, store: &str, key: &str) -> Result<Option<String>, DriverError> {
        let items = self
            .items
            .read()
            .map_err(|_| DriverError::Io("object store lock poisoned".into()))?;
        Ok(items.get(&Self::composite(store, key)).cloned())
    }

    fn remove(&self, store: &str, key: &str) -> Result<bool, DriverError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DriverError::Io("object store lock poisoned".into()))?;
        Ok(items.remove(&Self::composite(store, key)).is_some())
    }

    fn scan(&self, store: &str) -> Result<Vec<String>, DriverError> {
        let items = self
            .items
            .read()
            .map_err(|_| DriverError::Io("object store lock poisoned".into()))?;
        let prefix = format!("{}/", store);
        Ok(items
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, value)| value.clone())
            .collect())
    }
}

/// Object-store storage driver.
pub struct ObjectStoreDriver {
    backend: Option<Arc<dyn ObjectStoreBackend>>,
    store: String,
    key_field: String,
}

impl ObjectStoreDriver {
    /// A driver with no backend: `initialize` fails with `Unsupported`.
    pub fn detached(store: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            backend: None,
            store: store.into(),
            key_field: key_field.into(),
        }
    }

    pub fn with_backend(
        backend: Arc<dyn ObjectStoreBackend>,
        store: impl Into<String>,
        key_field: impl Into<String>,
    ) -> Self {
        Self {
            backend: Some(backend),
            store: store.into(),
            key_field: key_field.into(),
        }
    }

    fn backend(&self) -> Result<&Arc<dyn ObjectStoreBackend>, DriverError> {
        self.backend.as_ref().ok_or_else(|| {
            DriverError::Unsupported("no object-store backend available in this runtime".into())
        })
    }

    fn key_of<'a>(&self, record: &'a Record) -> Option<&'a str> {
        record.get(&self.key_field).and_then(Value::as_str)
    }

    fn load_all(&self) -> Result<Vec<Record>, DriverError> {
        self.backend()?
            .scan(&self.store)?
            .iter()
            .map(|text| serde_json::from_str(text).map_err(DriverError::from))
            .collect()
    }
}

impl StorageDriver for ObjectStoreDriver {
    fn initialize(&self) -> Result<(), DriverError> {
        // Nothing to create; probing the backend surfaces Unsupported early.
        self.backend()?.scan(&self.store)?;
        Ok(())
    }

    fn create(&self, record: Record) -> Result<Record, DriverError> {
        let backend = self.backend()?;
        let key = self
            .key_of(&record)
            .ok_or_else(|| DriverError::Serde(format!("record missing key field '{}'", self.key_field)))?
            .to_string();

        if backend.get(&self.store, &key)?.is_some() {
            return Err(DriverError::Duplicate { id: key });
        }

        let text = serde_json::to_string(&record)?;
        backend.put(&self.store, &key, &text)?;
        Ok(record)
    }

    fn read(&self, query: &Filters) -> Result<Option<Record>, DriverError> {
        // Point lookup when the query is exactly the key field.
        if query.len() == 1 {
            if let Some(id) = query.get(&self.key_field).and_then(Value::as_str) {
                return match self.backend()?.get(&self.store, id)? {
                    Some(text) => Ok(Some(serde_json::from_str(&text)?)),
                    None => Ok(None),
                };
            }
        }
        let records = self.load_all()?;
        Ok(records.into_iter().find(|r| r.matches(query)))
    }

    fn update(&self, id: &str, patch: &Record) -> Result<Record, DriverError> {
        let backend = self.backend()?;
        let text = backend
            .get(&self.store, id)?
            .ok_or_else(|| DriverError::NotFound { id: id.to_string() })?;
        let current: Record = serde_json::from_str(&text)?;

        let merged = current.apply_patch(patch.fields());
        backend.put(&self.store, id, &serde_json::to_string(&merged)?)?;
        Ok(merged)
    }

    fn delete(&self, id: &str) -> Result<(), DriverError> {
        if self.backend()?.remove(&self.store, id)? {
            Ok(())
        } else {
            Err(DriverError::NotFound { id: id.to_string() })
        }
    }

    fn list(&self, filters: &Filters) -> Result<Vec<Record>, DriverError> {
        let records = self.load_all()?;
        Ok(records.into_iter().filter(|r| r.matches(filters)).collect())
    }
}
