//! Orchestrated CRUD integration tests across all storage backends.

mod caching;
mod lifecycle;
mod support;
