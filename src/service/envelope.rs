//! Request / response envelope types.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::driver::DriverError;
use crate::record::Filters;
use crate::schema::Violation;

/// The five orchestrated actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Action {
    /// Parse an action name. Unknown names are a request-level error, not a
    /// decode failure, so the request carries the raw string.
    pub fn parse(name: &str) -> Option<Action> {
        match name {
            "create" => Some(Action::Create),
            "read" => Some(Action::Read),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            "list" => Some(Action::List),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::List => "list",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound entity request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub entity: String,
    /// Action name; resolved against [`Action`] during processing.
    pub action: String,
    /// Payload for `create`/`update`; filter map for `list`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Filters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Request {
    pub fn new(entity: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            action: action.into(),
            data: None,
            id: None,
        }
    }

    pub fn create(entity: impl Into<String>, data: Filters) -> Self {
        let mut request = Self::new(entity, "create");
        request.data = Some(data);
        request
    }

    pub fn read(entity: impl Into<String>, id: impl Into<String>) -> Self {
        let mut request = Self::new(entity, "read");
        request.id = Some(id.into());
        request
    }

    pub fn update(entity: impl Into<String>, id: impl Into<String>, data: Filters) -> Self {
        let mut request = Self::new(entity, "update");
        request.id = Some(id.into());
        request.data = Some(data);
        request
    }

    pub fn delete(entity: impl Into<String>, id: impl Into<String>) -> Self {
        let mut request = Self::new(entity, "delete");
        request.id = Some(id.into());
        request
    }

    pub fn list(entity: impl Into<String>) -> Self {
        Self::new(entity, "list")
    }

    pub fn list_filtered(entity: impl Into<String>, filters: Filters) -> Self {
        let mut request = Self::new(entity, "list");
        request.data = Some(filters);
        request
    }
}

/// Machine-readable request error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotReady,
    UnknownEntity,
    UnknownAction,
    ValidationFailed,
    NotFound,
    Duplicate,
    Unsupported,
    ExecutionError,
}

/// Error payload of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    /// The full violation list for `VALIDATION_FAILED`, never truncated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

/// Request metadata echoed on every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub entity: String,
    pub action: String,
    pub timestamp: String,
    #[serde(rename = "cacheHit")]
    pub cache_hit: bool,
    /// Correlation variables supplied by a transport, echoed back.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

/// The uniform response envelope. Exactly one of `data`/`error` is
/// meaningful depending on `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub data: Value,
    pub meta: Meta,
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(data: Value, meta: Meta) -> Self {
        Self {
            success: true,
            data,
            meta,
            error: None,
        }
    }

    pub fn err(error: ServiceError, meta: Meta) -> Self {
        Self {
            success: false,
            data: Value::Null,
            meta,
            error: Some(ErrorBody {
                code: error.code,
                message: error.message,
                violations: error.violations,
            }),
        }
    }
}

/// Internal error carried through request processing before it is folded
/// into the envelope.
#[derive(Debug, Clone)]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub violations: Vec<Violation>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn not_ready() -> Self {
        Self::new(
            ErrorCode::NotReady,
            "service not initialized; call initialize() first",
        )
    }

    pub fn unknown_entity(entity: &str) -> Self {
        Self::new(
            ErrorCode::UnknownEntity,
            format!("no configuration for entity '{}'", entity),
        )
    }

    pub fn unknown_action(action: &str) -> Self {
        Self::new(
            ErrorCode::UnknownAction,
            format!("unsupported action '{}'", action),
        )
    }

    pub fn validation(violations: Vec<Violation>) -> Self {
        Self {
            code: ErrorCode::ValidationFailed,
            message: format!("validation failed with {} violation(s)", violations.len()),
            violations,
        }
    }

    pub fn missing_id(action: &str) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            format!("action '{}' requires an id", action),
        )
    }

    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }
}

impl ErrorCode {
    /// HTTP-style status code for this error class.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::NotReady => 503,
            ErrorCode::UnknownEntity => 404,
            ErrorCode::UnknownAction => 400,
            ErrorCode::ValidationFailed => 422,
            ErrorCode::NotFound => 404,
            ErrorCode::Duplicate => 409,
            ErrorCode::Unsupported => 501,
            ErrorCode::ExecutionError => 500,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<DriverError> for ServiceError {
    fn from(err: DriverError) -> Self {
        let code = match &err {
            DriverError::NotFound { .. } => ErrorCode::NotFound,
            DriverError::Duplicate { .. } => ErrorCode::Duplicate,
            DriverError::Unsupported(_) => ErrorCode::Unsupported,
            DriverError::Io(_) | DriverError::Serde(_) => ErrorCode::ExecutionError,
        };
        Self::new(code, err.to_string())
    }
}
