//! Entity configuration - declarative entity descriptors and the registry.
//!
//! Configuration is read once at startup into an immutable
//! [`ConfigRegistry`] snapshot. "Registering" another entity produces a new
//! snapshot rather than mutating shared state, so concurrent readers are
//! always safe. Hot reloading is out of scope.
//!
//! ## Wire format
//!
//! ```json
//! {
//!   "alarms": {
//!     "id": "alarms",
//!     "name": "alarms",
//!     "schema": { "fields": { "name": { "type": "string", "required": true } } },
//!     "storage": { "driver": "filesystem", "keyField": "id",
//!                  "path": "data/alarms.jsonl", "format": "jsonl" },
//!     "cacheHints": { "ttl": 300 }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::FileFormat;
use crate::schema::Schema;

/// The closed set of storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Filesystem,
    IndexedDb,
    LocalStorage,
    Spreadsheet,
}

fn default_key_field() -> String {
    "id".to_string()
}

/// Driver selection plus driver-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub driver: DriverKind,
    /// Field holding the record key. Defaults to `id`.
    #[serde(
        rename = "keyField",
        alias = "key_field",
        default = "default_key_field"
    )]
    pub key_field: String,
    /// Filesystem: data file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Filesystem: on-disk format. Defaults to `json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FileFormat>,
    /// LocalStorage: storage key holding the collection. Defaults to the
    /// entity name.
    #[serde(
        rename = "storageKey",
        alias = "storage_key",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub storage_key: Option<String>,
    /// IndexedDB: object store name. Defaults to the entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    /// Spreadsheet: tab name. Defaults to the entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
}

impl StorageConfig {
    pub fn new(driver: DriverKind) -> Self {
        Self {
            driver,
            key_field: default_key_field(),
            path: None,
            format: None,
            storage_key: None,
            store: None,
            tab: None,
        }
    }
}

fn default_ttl() -> u64 {
    60
}

/// Per-entity caching hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHints {
    /// TTL in seconds for cached reads and list snapshots. `0` disables
    /// caching for the entity.
    #[serde(alias = "ttlSeconds", default = "default_ttl")]
    pub ttl: u64,
    /// Extra cache keys an operator expects this entity to populate.
    /// Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl Default for CacheHints {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            keys: None,
        }
    }
}

/// Static descriptor of one entity: schema + storage + cache hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,
    pub name: String,
    pub schema: Schema,
    #[serde(alias = "storageConfig")]
    pub storage: StorageConfig,
    #[serde(rename = "cacheHints", alias = "cache", default)]
    pub cache: CacheHints,
}

impl EntityConfig {
    pub fn new(name: impl Into<String>, schema: Schema, storage: StorageConfig) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            schema,
            storage,
            cache: CacheHints::default(),
        }
    }

    pub fn with_cache(mut self, cache: CacheHints) -> Self {
        self.cache = cache;
        self
    }
}

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config i/o error: {}", e),
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

/// Immutable snapshot of all entity configurations.
///
/// Cheap to clone (Arc inside). Adding an entity returns a new snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    entities: Arc<HashMap<String, Arc<EntityConfig>>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry from a JSON mapping of entity name → config.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let parsed: HashMap<String, EntityConfig> = serde_json::from_str(text)?;
        let entities = parsed
            .into_iter()
            .map(|(name, config)| (name, Arc::new(config)))
            .collect();
        Ok(Self {
            entities: Arc::new(entities),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// A new snapshot with `config` added (or replaced) under its name.
    pub fn with_entity(&self, config: EntityConfig) -> Self {
        let mut entities: HashMap<String, Arc<EntityConfig>> =
            self.entities.as_ref().clone();
        entities.insert(config.name.clone(), Arc::new(config));
        Self {
            entities: Arc::new(entities),
        }
    }

    pub fn get(&self, entity: &str) -> Option<Arc<EntityConfig>> {
        self.entities.get(entity).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityConfig>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Persist a pretty-printed copy of each config into `dir/configs/` for
    /// external inspection.
    pub fn export_configs(&self, dir: impl AsRef<Path>) -> Result<(), ConfigError> {
        let configs_dir = dir.as_ref().join("configs");
        fs::create_dir_all(&configs_dir)?;
        for config in self.entities.values() {
            let path = configs_dir.join(format!("{}.json", config.name));
            fs::write(path, serde_json::to_string_pretty(config.as_ref())?)?;
        }
        Ok(())
    }
}
