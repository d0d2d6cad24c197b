//! HTTP transport — maps HTTP requests to entity actions.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `POST /:entity/:action` — process a request. The JSON body carries the
//!   payload: either `{ "data": {...}, "id": "..." }` or a bare data object;
//!   `?id=` works too. The response is the envelope serialized as JSON with
//!   the envelope's status mapped to an HTTP status.
//! - `GET /health` — `{ "ok": true, "ready": ..., "entities": [...] }`.
//!
//! An inbound `x-correlation-id` header is echoed on the response and in
//! `meta.context`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use action_store::{http, ConfigRegistry, EntityService};
//!
//! let service = Arc::new(EntityService::builder(registry).build());
//! service.initialize();
//!
//! // Compose with other axum routes, or serve directly:
//! http::serve(service, "0.0.0.0:3000").await?;
//! ```

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::record::Filters;
use crate::service::{EntityService, Request};

const CORRELATION_HEADER: &str = "x-correlation-id";

/// Build an axum `Router` over the given service.
pub fn router(service: Arc<EntityService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/:entity/:action", post(action_handler))
        .with_state(service)
}

/// Serve the service over HTTP at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve(service: Arc<EntityService>, addr: &str) -> Result<(), std::io::Error> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler(State(service): State<Arc<EntityService>>) -> impl IntoResponse {
    let mut entities = service.entity_names();
    entities.sort_unstable();
    Json(json!({
        "ok": true,
        "ready": service.is_ready(),
        "entities": entities,
    }))
}

#[derive(serde::Deserialize)]
struct ActionParams {
    id: Option<String>,
}

async fn action_handler(
    State(service): State<Arc<EntityService>>,
    Path((entity, action)): Path<(String, String)>,
    Query(params): Query<ActionParams>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let body = body.map(|Json(value)| value).unwrap_or(Value::Null);
    let (data, body_id) = split_body(body);

    let mut request = Request::new(entity, action);
    request.data = data;
    request.id = params.id.or(body_id);

    let mut response = service.process(&request);

    let correlation = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(correlation) = &correlation {
        response
            .meta
            .context
            .insert(CORRELATION_HEADER.to_string(), correlation.clone());
    }

    let status = match &response.error {
        None => StatusCode::OK,
        Some(error) => StatusCode::from_u16(error.code.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let mut response_headers = HeaderMap::new();
    if let Some(correlation) = correlation.and_then(|c| HeaderValue::from_str(&c).ok()) {
        response_headers.insert(CORRELATION_HEADER, correlation);
    }

    (status, response_headers, Json(response))
}

/// Pull `data` and `id` out of the request body. A bare object body (no
/// `data` key) is treated as the payload itself.
fn split_body(body: Value) -> (Option<Filters>, Option<String>) {
    let Value::Object(map) = body else {
        return (None, None);
    };

    let id = map.get("id").and_then(Value::as_str).map(str::to_string);
    let data = match map.get("data") {
        Some(Value::Object(inner)) => Some(inner.clone()),
        _ => {
            let mut bare = map;
            bare.remove("id");
            if bare.is_empty() {
                None
            } else {
                Some(bare)
            }
        }
    };

    (data, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Filters {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn split_body_prefers_data_envelope() {
        let (data, id) = split_body(json!({ "data": { "name": "A" }, "id": "1" }));
        assert_eq!(data, Some(obj(json!({ "name": "A" }))));
        assert_eq!(id.as_deref(), Some("1"));
    }

    #[test]
    fn split_body_accepts_bare_payload() {
        let (data, id) = split_body(json!({ "name": "A" }));
        assert_eq!(data, Some(obj(json!({ "name": "A" }))));
        assert_eq!(id, None);
    }

    #[test]
    fn split_body_id_only() {
        let (data, id) = split_body(json!({ "id": "1" }));
        assert_eq!(data, None);
        assert_eq!(id.as_deref(), Some("1"));
    }

    #[test]
    fn split_body_non_object() {
        let (data, id) = split_body(Value::Null);
        assert_eq!(data, None);
        assert_eq!(id, None);
    }
}
