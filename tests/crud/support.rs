//! Test domain: an "alarms" entity wired to each storage backend.

use std::sync::Arc;

use action_store::driver::{InMemoryKeyValue, InMemoryObjectStore, InMemorySheet};
use action_store::{
    CacheHints, ConfigRegistry, DriverKind, EntityConfig, EntityService, FieldRule, FieldType,
    FileFormat, ManualClock, Schema, StorageConfig,
};
use serde_json::{Map, Value};
use tempfile::TempDir;

/// A ready-to-use service plus the clock driving it. The temp dir (for
/// filesystem backends) lives as long as the service.
pub struct TestService {
    pub service: EntityService,
    pub clock: ManualClock,
    _dir: Option<TempDir>,
}

pub fn alarm_schema() -> Schema {
    Schema::new()
        .field(
            "name",
            FieldRule {
                field_type: Some(FieldType::String),
                required: true,
                ..Default::default()
            },
        )
        .field(
            "severity",
            FieldRule {
                field_type: Some(FieldType::String),
                ..Default::default()
            },
        )
        .field(
            "status",
            FieldRule {
                field_type: Some(FieldType::String),
                ..Default::default()
            },
        )
}

fn registry(storage: StorageConfig) -> ConfigRegistry {
    let config = EntityConfig::new("alarms", alarm_schema(), storage).with_cache(CacheHints {
        ttl: 300,
        keys: None,
    });
    ConfigRegistry::new().with_entity(config)
}

fn finish(builder: action_store::service::EntityServiceBuilder, dir: Option<TempDir>) -> TestService {
    let clock = ManualClock::starting_now();
    let service = builder.clock(Arc::new(clock.clone())).build();
    service.initialize();
    TestService {
        service,
        clock,
        _dir: dir,
    }
}

pub fn filesystem_service(format: FileFormat) -> TestService {
    let dir = TempDir::new().unwrap();
    let mut storage = StorageConfig::new(DriverKind::Filesystem);
    storage.format = Some(format);
    let builder = EntityService::builder(registry(storage)).data_dir(dir.path());
    finish(builder, Some(dir))
}

pub fn localstorage_service() -> TestService {
    let storage = StorageConfig::new(DriverKind::LocalStorage);
    let builder = EntityService::builder(registry(storage))
        .key_value_backend(Arc::new(InMemoryKeyValue::new()));
    finish(builder, None)
}

pub fn indexeddb_service() -> TestService {
    let storage = StorageConfig::new(DriverKind::IndexedDb);
    let builder = EntityService::builder(registry(storage))
        .object_store_backend(Arc::new(InMemoryObjectStore::new()));
    finish(builder, None)
}

pub fn spreadsheet_service() -> TestService {
    let storage = StorageConfig::new(DriverKind::Spreadsheet);
    let builder =
        EntityService::builder(registry(storage)).sheet_client(Arc::new(InMemorySheet::new()));
    finish(builder, None)
}

/// Every backend, labeled for assertion messages.
pub fn all_backends() -> Vec<(&'static str, TestService)> {
    vec![
        ("filesystem-json", filesystem_service(FileFormat::Json)),
        ("filesystem-jsonl", filesystem_service(FileFormat::Jsonl)),
        ("filesystem-csv", filesystem_service(FileFormat::Csv)),
        ("localstorage", localstorage_service()),
        ("indexeddb", indexeddb_service()),
        ("spreadsheet", spreadsheet_service()),
    ]
}

pub fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}
