//! Service - the entity orchestrator and its request/response envelope.
//!
//! ## Example
//!
//! ```ignore
//! use action_store::{ConfigRegistry, EntityService, Request};
//!
//! let registry = ConfigRegistry::from_file("entities.json")?;
//! let service = EntityService::builder(registry).build();
//! service.initialize();
//!
//! let response = service.process(&Request::read("alarms", "a1"));
//! assert!(response.success);
//! ```

mod entity_service;
mod envelope;

pub use entity_service::{EntityService, EntityServiceBuilder};
pub use envelope::{Action, ErrorBody, ErrorCode, Meta, Request, Response, ServiceError};
