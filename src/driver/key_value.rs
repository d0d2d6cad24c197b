//! KeyValueDriver - localStorage-style backend.
//!
//! The whole collection is serialized as one JSON array under a single
//! storage key, matching how browser localStorage is actually used. The
//! backend itself sits behind [`KeyValueBackend`] so a browser binding can be
//! plugged in; outside a browser the [`InMemoryKeyValue`] shim stands in.
//! Constructed without any backend, the driver fails `initialize` with
//! `Unsupported` instead of crashing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::{DriverError, StorageDriver};
use crate::record::{Filters, Record};

/// Minimal localStorage-shaped contract.
pub trait KeyValueBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, DriverError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), DriverError>;
    fn remove_item(&self, key: &str) -> Result<(), DriverError>;
}

/// In-memory stand-in for a browser key-value store.
#[derive(Clone, Default)]
pub struct InMemoryKeyValue {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for InMemoryKeyValue {
    fn get_item(&self, key: &str) -> Result<Option<String>, DriverError> {
        let items = self
            .items
            .read()
            .map_err(|_| DriverError::Io("key-value lock poisoned".into()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), DriverError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DriverError::Io("key-value lock poisoned".into()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), DriverError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DriverError::Io("key-value lock poisoned".into()))?;
        items.remove(key);
        Ok(())
    }
}

/// Key-value storage driver.
pub struct KeyValueDriver {
    backend: Option<Arc<dyn KeyValueBackend>>,
    storage_key: String,
    key_field: String,
}

impl KeyValueDriver {
    /// A driver with no backend: `initialize` fails with `Unsupported`.
    pub fn detached(storage_key: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            backend: None,
            storage_key: storage_key.into(),
            key_field: key_field.into(),
        }
    }

    pub fn with_backend(
        backend: Arc<dyn KeyValueBackend>,
        storage_key: impl Into<String>,
        key_field: impl Into<String>,
    ) -> Self {
        Self {
            backend: Some(backend),
            storage_key: storage_key.into(),
            key_field: key_field.into(),
        }
    }

    fn backend(&self) -> Result<&Arc<dyn KeyValueBackend>, DriverError> {
        self.backend.as_ref().ok_or_else(|| {
            DriverError::Unsupported("no key-value backend available in this runtime".into())
        })
    }

    fn load_all(&self) -> Result<Vec<Record>, DriverError> {
        match self.backend()?.get_item(&self.storage_key)? {
            Some(text) if !text.trim().is_empty() => Ok(serde_json::from_str(&text)?),
            _ => Ok(Vec::new()),
        }
    }

    fn store_all(&self, records: &[Record]) -> Result<(), DriverError> {
        let text = serde_json::to_string(records)?;
        self.backend()?.set_item(&self.storage_key, &text)
    }

    fn key_of<'a>(&self, record: &'a Record) -> Option<&'a str> {
        record.get(&self.key_field).and_then(Value::as_str)
    }
}

impl StorageDriver for KeyValueDriver {
    fn initialize(&self) -> Result<(), DriverError> {
        let backend = self.backend()?;
        if backend.get_item(&self.storage_key)?.is_none() {
            backend.set_item(&self.storage_key, "[]")?;
        }
        Ok(())
    }

    fn create(&self, record: Record) -> Result<Record, DriverError> {
        let mut records = self.load_all()?;

        if let Some(key) = self.key_of(&record) {
            if records.iter().any(|r| self.key_of(r) == Some(key)) {
                return Err(DriverError::Duplicate { id: key.to_string() });
            }
        }

        records.push(record.clone());
        self.store_all(&records)?;
        Ok(record)
    }

    fn read(&self, query: &Filters) -> Result<Option<Record>, DriverError> {
        let records = self.load_all()?;
        Ok(records.into_iter().find(|r| r.matches(query)))
    }

    fn update(&self, id: &str, patch: &Record) -> Result<Record, DriverError> {
        let mut records = self.load_all()?;
        let index = records
            .iter()
            .position(|r| self.key_of(r) == Some(id))
            .ok_or_else(|| DriverError::NotFound { id: id.to_string() })?;

        let merged = records[index].apply_patch(patch.fields());
        records[index] = merged.clone();
        self.store_all(&records)?;
        Ok(merged)
    }

    fn delete(&self, id: &str) -> Result<(), DriverError> {
        let mut records = self.load_all()?;
        let before = records.len();
        records.retain(|r| self.key_of(r) != Some(id));
        if records.len() == before {
            return Err(DriverError::NotFound { id: id.to_string() });
        }
        self.store_all(&records)?;
        Ok(())
    }

    fn list(&self, filters: &Filters) -> Result<Vec<Record>, DriverError> {
        let records = self.load_all()?;
        Ok(records.into_iter().filter(|r| r.matches(filters)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record(map),
            _ => panic!("expected object"),
        }
    }

    fn driver() -> KeyValueDriver {
        let driver = KeyValueDriver::with_backend(
            Arc::new(InMemoryKeyValue::new()),
            "alarms",
            "id",
        );
        driver.initialize().unwrap();
        driver
    }

    #[test]
    fn detached_driver_fails_cleanly() {
        let driver = KeyValueDriver::detached("alarms", "id");
        let err = driver.initialize().unwrap_err();
        assert!(matches!(err, DriverError::Unsupported(_)));
    }

    #[test]
    fn crud_round_trip() {
        let driver = driver();

        driver
            .create(record(json!({ "id": "1", "name": "Alarm A" })))
            .unwrap();

        let mut query = Filters::new();
        query.insert("id".into(), json!("1"));
        let loaded = driver.read(&query).unwrap().unwrap();
        assert_eq!(loaded.get("name"), Some(&json!("Alarm A")));

        let updated = driver
            .update("1", &record(json!({ "name": "Alarm B" })))
            .unwrap();
        assert_eq!(updated.get("name"), Some(&json!("Alarm B")));

        driver.delete("1").unwrap();
        assert_eq!(driver.read(&query).unwrap(), None);
        assert_eq!(
            driver.delete("1").unwrap_err(),
            DriverError::NotFound { id: "1".into() }
        );
    }

    #[test]
    fn duplicate_keys_rejected() {
        let driver = driver();
        driver.create(record(json!({ "id": "1" }))).unwrap();
        let err = driver.create(record(json!({ "id": "1" }))).unwrap_err();
        assert_eq!(err, DriverError::Duplicate { id: "1".into() });
    }

    #[test]
    fn backends_are_shared_between_drivers() {
        let backend = Arc::new(InMemoryKeyValue::new());
        let a = KeyValueDriver::with_backend(backend.clone(), "alarms", "id");
        let b = KeyValueDriver::with_backend(backend, "alarms", "id");
        a.initialize().unwrap();

        a.create(record(json!({ "id": "1" }))).unwrap();
        assert_eq!(b.list(&Filters::new()).unwrap().len(), 1);
    }
}
