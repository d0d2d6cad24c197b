//! action_store — entity CRUD over pluggable storage backends.
//!
//! Entities are declared in a [`ConfigRegistry`] (schema + storage + cache
//! hints). The [`EntityService`] orchestrator validates payloads against the
//! schema, dispatches to the configured [`driver::StorageDriver`], keeps a
//! best-effort TTL [`cache`], and answers every request with the uniform
//! `{success, data, meta, error}` envelope.

pub mod cache;
pub mod clock;
pub mod config;
pub mod driver;
#[cfg(feature = "http")]
pub mod http;
pub mod record;
pub mod schema;
pub mod service;

pub use cache::{CacheStore, InMemoryCache, SweepHandle, SweepStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheHints, ConfigError, ConfigRegistry, DriverKind, EntityConfig, StorageConfig};
pub use driver::{DriverError, FileDriver, FileFormat, StorageDriver};
pub use record::{Filters, Record};
pub use schema::{FieldRule, FieldType, Schema, ValidationMode, Violation, ViolationCode};
pub use service::{Action, ErrorBody, ErrorCode, EntityService, Meta, Request, Response};
