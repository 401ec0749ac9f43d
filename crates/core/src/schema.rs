//! Schema validation for tool inputs/outputs and decision payloads.
//!
//! Schemas are plain `serde_json::Value` documents using a subset of JSON
//! Schema: `type`, `properties`, `required`, `additionalProperties`, `items`,
//! `enum`, `minLength`/`maxLength`, `minimum`/`maximum`,
//! `minItems`/`maxItems` and `default`.
//!
//! Validation never stops at the first problem: every violation is collected
//! with a path so callers get field-level detail. A successful validation
//! returns the *validated* payload, which is the input with `default` values
//! filled in for absent optional properties.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchemaError;

/// A single field-level schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Location of the offending value, e.g. `/params/path` (`""` is the root).
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {}", self.message)
    }
}

/// A payload failed its schema. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldViolation::new(path, message)])
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Registry of named schemas plus the validation engine.
///
/// Owned by the host and shared by `Arc`; there is no global instance.
#[derive(Debug, Default, Clone)]
pub struct SchemaValidator {
    schemas: HashMap<String, Value>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator with the four phase-decision schemas pre-registered.
    pub fn with_decision_schemas() -> Self {
        let mut validator = Self::new();
        for (name, schema) in crate::decision::decision_schemas() {
            validator.register(name, schema);
        }
        validator
    }

    /// Register (or replace) a named schema.
    pub fn register(&mut self, name: impl Into<String>, schema: Value) {
        let name = name.into();
        if self.schemas.insert(name.clone(), schema).is_some() {
            tracing::warn!(schema = %name, "Schema re-registered, previous definition replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Validate `payload` against the schema registered as `name`.
    ///
    /// The outer error is a configuration problem (unknown schema); the inner
    /// one is the validation result.
    pub fn validate(
        &self,
        name: &str,
        payload: &Value,
    ) -> Result<Result<Value, ValidationError>, SchemaError> {
        let schema = self
            .schemas
            .get(name)
            .ok_or_else(|| SchemaError::UnknownSchema(name.to_string()))?;
        Ok(validate_against(schema, payload))
    }
}

/// Validate `payload` against an inline schema.
pub fn validate_against(schema: &Value, payload: &Value) -> Result<Value, ValidationError> {
    let mut violations = Vec::new();
    let validated = check(schema, payload, "", &mut violations);
    if violations.is_empty() {
        Ok(validated)
    } else {
        Err(ValidationError::new(violations))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        "number" => value.is_number(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        // Unknown type keywords are permissive
        _ => true,
    }
}

fn child_path(parent: &str, key: &str) -> String {
    format!("{parent}/{key}")
}

/// Recursively check `value`, pushing violations, and return the validated copy.
fn check(schema: &Value, value: &Value, path: &str, violations: &mut Vec<FieldViolation>) -> Value {
    let Some(schema) = schema.as_object() else {
        // `true`, `{}` or anything unrecognised accepts everything
        return value.clone();
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(|t| t.as_str()).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            violations.push(FieldViolation::new(
                path,
                format!("expected {}, got {}", allowed.join(" or "), type_name(value)),
            ));
            return value.clone();
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum")
        && !options.contains(value)
    {
        let rendered: Vec<String> = options.iter().map(|o| o.to_string()).collect();
        violations.push(FieldViolation::new(
            path,
            format!("must be one of [{}]", rendered.join(", ")),
        ));
    }

    match value {
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
                && len < min
            {
                violations.push(FieldViolation::new(
                    path,
                    format!("must be at least {min} characters"),
                ));
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
                && len > max
            {
                violations.push(FieldViolation::new(
                    path,
                    format!("must be at most {max} characters"),
                ));
            }
            value.clone()
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or_default();
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
                && n < min
            {
                violations.push(FieldViolation::new(path, format!("must be >= {min}")));
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
                && n > max
            {
                violations.push(FieldViolation::new(path, format!("must be <= {max}")));
            }
            value.clone()
        }
        Value::Array(items) => {
            let len = items.len() as u64;
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
                && len < min
            {
                violations.push(FieldViolation::new(
                    path,
                    format!("must contain at least {min} items"),
                ));
            }
            if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
                && len > max
            {
                violations.push(FieldViolation::new(
                    path,
                    format!("must contain at most {max} items"),
                ));
            }
            match schema.get("items") {
                Some(item_schema) => Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            check(item_schema, item, &child_path(path, &i.to_string()), violations)
                        })
                        .collect(),
                ),
                None => value.clone(),
            }
        }
        Value::Object(fields) => check_object(schema, fields, path, violations),
        _ => value.clone(),
    }
}

fn check_object(
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    violations: &mut Vec<FieldViolation>,
) -> Value {
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            // An explicit null counts as missing
            if fields.get(name).is_none_or(Value::is_null) {
                violations.push(FieldViolation::new(child_path(path, name), "is required"));
            }
        }
    }

    let mut validated = Map::new();
    for (key, field_value) in fields {
        let field_path = child_path(path, key);
        match properties.get(key) {
            Some(field_schema) => {
                let checked = check(field_schema, field_value, &field_path, violations);
                validated.insert(key.clone(), checked);
            }
            None => match schema.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    violations.push(FieldViolation::new(field_path, "is not an allowed property"));
                }
                Some(extra @ Value::Object(_)) => {
                    let checked = check(extra, field_value, &field_path, violations);
                    validated.insert(key.clone(), checked);
                }
                _ => {
                    validated.insert(key.clone(), field_value.clone());
                }
            },
        }
    }

    // Fill defaults for absent optional properties
    for (key, field_schema) in properties {
        if !validated.contains_key(key)
            && let Some(default) = field_schema.get("default")
        {
            validated.insert(key.clone(), default.clone());
        }
    }

    Value::Object(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1 },
                "maxDepth": { "type": "integer", "minimum": 1, "default": 8 },
                "mode": { "type": "string", "enum": ["read", "write"] }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    #[test]
    fn valid_payload_passes_and_gets_defaults() {
        let validated = validate_against(&file_schema(), &json!({"path": "src/main.rs"})).unwrap();
        assert_eq!(validated["path"], "src/main.rs");
        assert_eq!(validated["maxDepth"], 8);
    }

    #[test]
    fn explicit_values_are_not_overwritten_by_defaults() {
        let validated =
            validate_against(&file_schema(), &json!({"path": "a", "maxDepth": 2})).unwrap();
        assert_eq!(validated["maxDepth"], 2);
    }

    #[test]
    fn missing_required_field_reported_with_path() {
        let err = validate_against(&file_schema(), &json!({})).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].path, "/path");
        assert_eq!(err.violations[0].message, "is required");
    }

    #[test]
    fn null_counts_as_missing() {
        let err = validate_against(&file_schema(), &json!({"path": null})).unwrap_err();
        assert!(err.violations.iter().any(|v| v.message == "is required"));
    }

    #[test]
    fn collects_every_violation() {
        let err = validate_against(
            &file_schema(),
            &json!({"path": "", "maxDepth": 0, "mode": "delete", "extra": true}),
        )
        .unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"/path"));
        assert!(paths.contains(&"/maxDepth"));
        assert!(paths.contains(&"/mode"));
        assert!(paths.contains(&"/extra"));
    }

    #[test]
    fn type_mismatch_reported() {
        let err = validate_against(&file_schema(), &json!({"path": 42})).unwrap_err();
        assert_eq!(err.violations[0].message, "expected string, got integer");
        let err = validate_against(&file_schema(), &json!("not an object")).unwrap_err();
        assert_eq!(err.violations[0].path, "");
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        let schema = json!({"type": "integer"});
        assert!(validate_against(&schema, &json!(3.0)).is_ok());
        assert!(validate_against(&schema, &json!(3.5)).is_err());
    }

    #[test]
    fn array_items_validated_with_indexes() {
        let schema = json!({
            "type": "array",
            "items": { "type": "string" },
            "maxItems": 3
        });
        let err = validate_against(&schema, &json!(["a", 1, "c", "d"])).unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"/1"));
        assert!(paths.contains(&""));
    }

    #[test]
    fn nested_objects_validated() {
        let schema = json!({
            "type": "object",
            "properties": {
                "matches": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "line": { "type": "integer" } },
                        "required": ["line"]
                    }
                }
            }
        });
        let err =
            validate_against(&schema, &json!({"matches": [{"line": 1}, {"text": "x"}]})).unwrap_err();
        assert_eq!(err.violations[0].path, "/matches/1/line");
    }

    #[test]
    fn union_types() {
        let schema = json!({"type": ["string", "null"]});
        assert!(validate_against(&schema, &json!(null)).is_ok());
        assert!(validate_against(&schema, &json!("x")).is_ok());
        assert!(validate_against(&schema, &json!(1)).is_err());
    }

    #[test]
    fn unknown_schema_name_is_configuration_error() {
        let validator = SchemaValidator::new();
        let err = validator.validate("nope", &json!({})).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownSchema(name) if name == "nope"));
    }

    #[test]
    fn named_schema_validation() {
        let mut validator = SchemaValidator::new();
        validator.register("file", file_schema());
        assert!(validator.contains("file"));
        let inner = validator.validate("file", &json!({"path": "x"})).unwrap();
        assert!(inner.is_ok());
        let inner = validator.validate("file", &json!({})).unwrap();
        assert!(inner.is_err());
    }

    #[test]
    fn validation_error_display_lists_fields() {
        let err = ValidationError::new(vec![
            FieldViolation::new("/path", "is required"),
            FieldViolation::new("", "expected object, got string"),
        ]);
        assert_eq!(
            err.to_string(),
            "/path: is required; /: expected object, got string"
        );
    }
}
