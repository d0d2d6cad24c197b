//! EntityService - the CRUD orchestrator.
//!
//! Wires a storage driver, the schema validator, and the shared cache for
//! every configured entity, and runs the request state machine: ready gate →
//! entity/action resolution → validation gate → driver dispatch → cache
//! maintenance → envelope. Every failure is folded into the envelope;
//! nothing escapes [`EntityService::process`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use serde_json::Value;

use super::envelope::{Action, ErrorCode, Meta, Request, Response, ServiceError};
use crate::cache::{list_key, record_key, CacheStore, InMemoryCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigRegistry, DriverKind, EntityConfig};
use crate::driver::{
    DriverError, FileDriver, FileFormat, KeyValueBackend, KeyValueDriver, ObjectStoreBackend,
    ObjectStoreDriver, SheetClient, SpreadsheetDriver, StorageDriver,
};
use crate::record::{Filters, Record, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::schema::{validate, Schema, ValidationMode};

/// One configured entity: its config, its driver, and the outcome of
/// warming the driver.
struct EntityRuntime {
    config: Arc<EntityConfig>,
    driver: Box<dyn StorageDriver>,
    init_error: Mutex<Option<DriverError>>,
}

/// Builder for [`EntityService`]. Backends for the browser-style and
/// spreadsheet drivers are injected here; entities configured for a backend
/// that was never injected fail per-request with `UNSUPPORTED` rather than
/// preventing startup.
pub struct EntityServiceBuilder {
    registry: ConfigRegistry,
    cache: Option<Arc<dyn CacheStore>>,
    clock: Arc<dyn Clock>,
    data_dir: PathBuf,
    key_value: Option<Arc<dyn KeyValueBackend>>,
    object_store: Option<Arc<dyn ObjectStoreBackend>>,
    sheets: Option<Arc<dyn SheetClient>>,
}

impl EntityServiceBuilder {
    pub fn new(registry: ConfigRegistry) -> Self {
        Self {
            registry,
            cache: None,
            clock: Arc::new(SystemClock),
            data_dir: PathBuf::from("data"),
            key_value: None,
            object_store: None,
            sheets: None,
        }
    }

    /// Override the shared cache. Defaults to an [`InMemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Override the clock used for timestamps and cache TTLs.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Base directory for filesystem drivers without an explicit path.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn key_value_backend(mut self, backend: Arc<dyn KeyValueBackend>) -> Self {
        self.key_value = Some(backend);
        self
    }

    pub fn object_store_backend(mut self, backend: Arc<dyn ObjectStoreBackend>) -> Self {
        self.object_store = Some(backend);
        self
    }

    pub fn sheet_client(mut self, client: Arc<dyn SheetClient>) -> Self {
        self.sheets = Some(client);
        self
    }

    pub fn build(self) -> EntityService {
        // Drivers first: make_driver borrows the builder, so the cache
        // option must not be consumed until the loop is done.
        let mut entities = HashMap::new();
        for config in self.registry.iter() {
            let driver = self.make_driver(config);
            entities.insert(
                config.name.clone(),
                EntityRuntime {
                    config: config.clone(),
                    driver,
                    init_error: Mutex::new(None),
                },
            );
        }

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryCache::with_clock(self.clock.clone())));

        EntityService {
            registry: self.registry,
            entities,
            cache,
            clock: self.clock,
            ready: AtomicBool::new(false),
        }
    }

    fn make_driver(&self, config: &EntityConfig) -> Box<dyn StorageDriver> {
        let storage = &config.storage;
        let key_field = storage.key_field.clone();
        match storage.driver {
            DriverKind::Filesystem => {
                let format = storage.format.unwrap_or(FileFormat::Json);
                let path = storage.path.clone().unwrap_or_else(|| {
                    let ext = match format {
                        FileFormat::Json => "json",
                        FileFormat::Jsonl => "jsonl",
                        FileFormat::Csv => "csv",
                    };
                    self.data_dir.join(format!("{}.{}", config.name, ext))
                });
                Box::new(FileDriver::new(path, format, key_field))
            }
            DriverKind::LocalStorage => {
                let storage_key = storage
                    .storage_key
                    .clone()
                    .unwrap_or_else(|| config.name.clone());
                match &self.key_value {
                    Some(backend) => Box::new(KeyValueDriver::with_backend(
                        backend.clone(),
                        storage_key,
                        key_field,
                    )),
                    None => Box::new(KeyValueDriver::detached(storage_key, key_field)),
                }
            }
            DriverKind::IndexedDb => {
                let store = storage.store.clone().unwrap_or_else(|| config.name.clone());
                match &self.object_store {
                    Some(backend) => Box::new(ObjectStoreDriver::with_backend(
                        backend.clone(),
                        store,
                        key_field,
                    )),
                    None => Box::new(ObjectStoreDriver::detached(store, key_field)),
                }
            }
            DriverKind::Spreadsheet => {
                let tab = storage.tab.clone().unwrap_or_else(|| config.name.clone());
                match &self.sheets {
                    Some(client) => {
                        Box::new(SpreadsheetDriver::new(client.clone(), tab, key_field))
                    }
                    None => Box::new(DetachedDriver("no sheet client configured")),
                }
            }
        }
    }
}

/// Placeholder driver for a backend that was never injected.
struct DetachedDriver(&'static str);

impl DetachedDriver {
    fn unsupported(&self) -> DriverError {
        DriverError::Unsupported(self.0.to_string())
    }
}

impl StorageDriver for DetachedDriver {
    fn initialize(&self) -> Result<(), DriverError> {
        Err(self.unsupported())
    }
    fn create(&self, _record: Record) -> Result<Record, DriverError> {
        Err(self.unsupported())
    }
    fn read(&self, _query: &Filters) -> Result<Option<Record>, DriverError> {
        Err(self.unsupported())
    }
    fn update(&self, _id: &str, _patch: &Record) -> Result<Record, DriverError> {
        Err(self.unsupported())
    }
    fn delete(&self, _id: &str) -> Result<(), DriverError> {
        Err(self.unsupported())
    }
    fn list(&self, _filters: &Filters) -> Result<Vec<Record>, DriverError> {
        Err(self.unsupported())
    }
}

/// The entity orchestrator.
pub struct EntityService {
    registry: ConfigRegistry,
    entities: HashMap<String, EntityRuntime>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ready: AtomicBool,
}

impl EntityService {
    pub fn builder(registry: ConfigRegistry) -> EntityServiceBuilder {
        EntityServiceBuilder::new(registry)
    }

    /// Warm every driver and mark the service ready.
    ///
    /// A driver that fails to warm does not prevent startup: its entity
    /// answers every request with the stored error (`UNSUPPORTED` for a
    /// missing runtime, `EXECUTION_ERROR` otherwise) while other entities
    /// work normally. Idempotent.
    pub fn initialize(&self) {
        for (name, runtime) in &self.entities {
            let outcome = runtime.driver.initialize();
            let mut slot = runtime
                .init_error
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match outcome {
                Ok(()) => *slot = None,
                Err(e) => {
                    log::warn!("driver initialization failed for entity '{}': {}", name, e);
                    *slot = Some(e);
                }
            }
        }
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Names of all configured entities.
    pub fn entity_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    /// Process one request, returning the uniform envelope. Never panics on
    /// bad input; every failure is mapped into `error`.
    pub fn process(&self, request: &Request) -> Response {
        let outcome = self.execute(request);

        let (cache_hit, success) = match &outcome {
            Ok((_, hit)) => (*hit, true),
            Err(_) => (false, false),
        };
        log::debug!(
            "processed {} {} success={} cache_hit={}",
            request.entity,
            request.action,
            success,
            cache_hit
        );

        let meta = Meta {
            entity: request.entity.clone(),
            action: request.action.clone(),
            timestamp: self.clock.now_rfc3339(),
            cache_hit,
            context: HashMap::new(),
        };

        match outcome {
            Ok((data, _)) => Response::ok(data, meta),
            Err(error) => Response::err(error, meta),
        }
    }

    fn execute(&self, request: &Request) -> Result<(Value, bool), ServiceError> {
        if !self.is_ready() {
            return Err(ServiceError::not_ready());
        }

        let runtime = self
            .entities
            .get(&request.entity)
            .ok_or_else(|| ServiceError::unknown_entity(&request.entity))?;
        let action = Action::parse(&request.action)
            .ok_or_else(|| ServiceError::unknown_action(&request.action))?;

        if let Some(err) = runtime
            .init_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(err.into());
        }

        match action {
            Action::Create => self.create(runtime, request),
            Action::Read => {
                let id = request.id.as_deref().ok_or_else(|| ServiceError::missing_id("read"))?;
                let (record, hit) = self.read_record(runtime, id)?;
                Ok((record.into(), hit))
            }
            Action::Update => self.update(runtime, request),
            Action::Delete => self.delete(runtime, request),
            Action::List => self.list(runtime, request),
        }
    }

    fn create(
        &self,
        runtime: &EntityRuntime,
        request: &Request,
    ) -> Result<(Value, bool), ServiceError> {
        let schema = &runtime.config.schema;
        let mut record = Record(request.data.clone().unwrap_or_default());
        apply_defaults(&mut record, schema);

        let violations = validate(record.fields(), schema, ValidationMode::Create);
        if !violations.is_empty() {
            return Err(ServiceError::validation(violations));
        }

        let now = self.clock.now_rfc3339();
        record.set(ID_FIELD, Value::String(Record::new_id()));
        record.set(CREATED_AT_FIELD, Value::String(now.clone()));
        record.set(UPDATED_AT_FIELD, Value::String(now));
        hash_credential_fields(&mut record, schema)?;

        let stored = runtime.driver.create(record)?;

        // The list snapshot is stale the moment the write lands.
        self.cache.delete(&list_key(&runtime.config.name));

        Ok((stored.into(), false))
    }

    fn update(
        &self,
        runtime: &EntityRuntime,
        request: &Request,
    ) -> Result<(Value, bool), ServiceError> {
        let id = request
            .id
            .as_deref()
            .ok_or_else(|| ServiceError::missing_id("update"))?;
        let schema = &runtime.config.schema;
        let payload = request.data.clone().unwrap_or_default();

        let violations = validate(&payload, schema, ValidationMode::Update);
        if !violations.is_empty() {
            return Err(ServiceError::validation(violations));
        }

        // Existence check through the same cache-or-driver read path.
        self.read_record(runtime, id)?;

        let mut patch = Record(payload);
        patch.set(UPDATED_AT_FIELD, Value::String(self.clock.now_rfc3339()));
        hash_credential_fields(&mut patch, schema)?;

        let updated = runtime.driver.update(id, &patch)?;

        let entity = &runtime.config.name;
        self.cache.delete(&record_key(entity, id));
        self.cache.delete(&list_key(entity));

        Ok((updated.into(), false))
    }

    fn delete(
        &self,
        runtime: &EntityRuntime,
        request: &Request,
    ) -> Result<(Value, bool), ServiceError> {
        let id = request
            .id
            .as_deref()
            .ok_or_else(|| ServiceError::missing_id("delete"))?;

        // Verify existence first so a second delete reports NOT_FOUND.
        self.read_record(runtime, id)?;
        runtime.driver.delete(id)?;

        let entity = &runtime.config.name;
        self.cache.delete(&record_key(entity, id));
        self.cache.delete(&list_key(entity));

        Ok((serde_json::json!({ "deleted": true, "id": id }), false))
    }

    fn list(
        &self,
        runtime: &EntityRuntime,
        request: &Request,
    ) -> Result<(Value, bool), ServiceError> {
        let filters = request.data.clone().unwrap_or_default();
        let (records, hit) = self.list_records(runtime)?;

        // Filtering is always in-process against the unfiltered snapshot;
        // drivers are not asked to push filters down here.
        let filtered: Vec<Record> = records
            .into_iter()
            .filter(|record| record.matches(&filters))
            .collect();

        Ok((serde_json::to_value(filtered).unwrap_or(Value::Null), hit))
    }

    /// Cache-or-driver read of one record.
    fn read_record(
        &self,
        runtime: &EntityRuntime,
        id: &str,
    ) -> Result<(Record, bool), ServiceError> {
        let entity = &runtime.config.name;
        let key = record_key(entity, id);

        if let Some(value) = self.cache.get(&key) {
            match serde_json::from_value::<Record>(value) {
                Ok(record) => return Ok((record, true)),
                // A malformed cache entry degrades to a miss.
                Err(e) => log::warn!("discarding malformed cache entry {}: {}", key, e),
            }
        }

        let mut query = Filters::new();
        query.insert(
            runtime.config.storage.key_field.clone(),
            Value::String(id.to_string()),
        );
        let record = runtime.driver.read(&query)?.ok_or_else(|| {
            ServiceError::new(
                ErrorCode::NotFound,
                format!("no '{}' record with id '{}'", entity, id),
            )
        })?;

        let ttl = runtime.config.cache.ttl;
        if ttl > 0 {
            self.cache
                .set(&key, record.clone().into(), Duration::from_secs(ttl));
        }

        Ok((record, false))
    }

    /// Cache-or-driver load of the full, unfiltered collection.
    fn list_records(
        &self,
        runtime: &EntityRuntime,
    ) -> Result<(Vec<Record>, bool), ServiceError> {
        let entity = &runtime.config.name;
        let key = list_key(entity);

        if let Some(value) = self.cache.get(&key) {
            match serde_json::from_value::<Vec<Record>>(value) {
                Ok(records) => return Ok((records, true)),
                Err(e) => log::warn!("discarding malformed cache entry {}: {}", key, e),
            }
        }

        let records = runtime.driver.list(&Filters::new())?;

        let ttl = runtime.config.cache.ttl;
        if ttl > 0 {
            match serde_json::to_value(&records) {
                Ok(value) => self.cache.set(&key, value, Duration::from_secs(ttl)),
                Err(e) => log::warn!("skipping cache fill for {}: {}", key, e),
            }
        }

        Ok((records, false))
    }
}

/// Fill absent fields from schema defaults. Runs before validation so a
/// required field with a default passes.
fn apply_defaults(record: &mut Record, schema: &Schema) {
    for (name, rule) in &schema.fields {
        if let Some(default) = &rule.default {
            if !record.contains(name) {
                record.set(name.clone(), default.clone());
            }
        }
    }
}

/// One-way hash every `hash: true` string field present in the record.
/// Argon2id — the stored value can be verified but never decoded.
fn hash_credential_fields(record: &mut Record, schema: &Schema) -> Result<(), ServiceError> {
    let fields: Vec<String> = schema.hashed_fields().map(str::to_string).collect();
    for field in fields {
        let Some(Value::String(plain)) = record.get(&field).cloned() else {
            continue;
        };
        if plain.is_empty() {
            continue;
        }
        let salt = SaltString::generate(&mut OsRng);
        let hashed = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                ServiceError::new(
                    ErrorCode::ExecutionError,
                    format!("credential hashing failed: {}", e),
                )
            })?
            .to_string();
        record.set(field, Value::String(hashed));
    }
    Ok(())
}
