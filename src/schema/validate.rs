//! The validation pass itself.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::{FieldRule, FieldType, Format, Schema, ValidationMode, Violation, ViolationCode};
use crate::record::{CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Bookkeeping fields stamped by the orchestrator, never declared in schemas.
const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// Validate `payload` against `schema`.
///
/// Create mode enforces required fields (present and non-empty — not null,
/// not an empty string). Update mode skips required checks entirely; only
/// fields present in the payload are constraint-checked. Payload fields not
/// declared in the schema are rejected, except the reserved bookkeeping
/// fields.
pub fn validate(
    payload: &Map<String, Value>,
    schema: &Schema,
    mode: ValidationMode,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    if mode == ValidationMode::Create {
        for (name, rule) in &schema.fields {
            if !rule.required {
                continue;
            }
            let empty = match payload.get(name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if empty {
                violations.push(Violation::new(
                    name.clone(),
                    ViolationCode::Required,
                    format!("field '{}' is required", name),
                ));
            }
        }
    }

    for (name, value) in payload {
        if RESERVED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        match schema.rule(name) {
            Some(rule) => check_field(name, value, rule, &mut violations),
            None => violations.push(Violation::new(
                name.clone(),
                ViolationCode::UnknownField,
                format!("field '{}' is not declared in the schema", name),
            )),
        }
    }

    violations
}

fn check_field(name: &str, value: &Value, rule: &FieldRule, out: &mut Vec<Violation>) {
    // Null is "absent" for constraint purposes; create-mode required checks
    // already flagged it.
    if value.is_null() {
        return;
    }

    if let Some(field_type) = rule.field_type {
        if !type_matches(value, field_type) {
            out.push(Violation::new(
                name,
                ViolationCode::TypeMismatch,
                format!("expected {}, got {}", field_type, json_type_name(value)),
            ));
            return;
        }
    }

    match value {
        Value::String(s) => check_string(name, s, rule, out),
        Value::Number(n) => {
            if let Some(n) = n.as_f64() {
                check_number(name, n, rule, out);
            }
        }
        Value::Array(items) => {
            if let Some(min_items) = rule.min_items {
                if items.len() < min_items {
                    out.push(Violation::new(
                        name,
                        ViolationCode::MinItems,
                        format!("must contain at least {} items", min_items),
                    ));
                }
            }
        }
        _ => {}
    }

    if let Some(allowed) = &rule.allowed {
        if !allowed.contains(value) {
            out.push(Violation::new(
                name,
                ViolationCode::InvalidValue,
                format!("value is not one of the allowed set for '{}'", name),
            ));
        }
    }
}

fn check_string(name: &str, s: &str, rule: &FieldRule, out: &mut Vec<Violation>) {
    let len = s.chars().count() as f64;
    if let Some(min) = rule.min {
        if len < min {
            out.push(Violation::new(
                name,
                ViolationCode::MinLength,
                format!("must be at least {} characters", min),
            ));
        }
    }
    if let Some(max) = rule.max {
        if len > max {
            out.push(Violation::new(
                name,
                ViolationCode::MaxLength,
                format!("must be at most {} characters", max),
            ));
        }
    }
    if rule.format == Some(Format::Email) && !EMAIL_RE.is_match(s) {
        out.push(Violation::new(
            name,
            ViolationCode::InvalidFormat,
            "must be a valid email address",
        ));
    }
    if rule.field_type == Some(FieldType::Timestamp)
        && chrono::DateTime::parse_from_rfc3339(s).is_err()
    {
        out.push(Violation::new(
            name,
            ViolationCode::InvalidFormat,
            "must be an ISO-8601 timestamp",
        ));
    }
}

fn check_number(name: &str, n: f64, rule: &FieldRule, out: &mut Vec<Violation>) {
    if let Some(min) = rule.min {
        if n < min {
            out.push(Violation::new(
                name,
                ViolationCode::MinValue,
                format!("must be at least {}", min),
            ));
        }
    }
    if let Some(max) = rule.max {
        if n > max {
            out.push(Violation::new(
                name,
                ViolationCode::MaxValue,
                format!("must be at most {}", max),
            ));
        }
    }
}

fn type_matches(value: &Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String | FieldType::Timestamp => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Array => value.is_array(),
        FieldType::Object => value.is_object(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
