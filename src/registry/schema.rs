//! Validation of capability arguments against declared schemas.
//!
//! Capability declarations carry JSON Schema fragments, as every MCP tool
//! listing does on the wire. This validator covers the subset those
//! declarations actually use:
//!
//! - `type` (single name or array of names)
//! - `properties` / `required` / `additionalProperties`
//! - `enum`
//! - `items`
//!
//! Anything outside the subset is ignored rather than rejected, so a
//! declaration may carry richer annotations (descriptions, formats)
//! without tripping validation.

use serde_json::Value;
use thiserror::Error;

/// A schema violation, located by a JSONPath-style path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct SchemaError {
    /// Path of the offending value, `$` for the root.
    pub path: String,
    /// What was violated.
    pub message: String,
}

impl SchemaError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Validates `value` against `schema`.
///
/// # Errors
///
/// Returns the first violation found, depth-first.
pub fn validate(value: &Value, schema: &Value) -> Result<(), SchemaError> {
    check(value, schema, "$")
}

fn check(value: &Value, schema: &Value, path: &str) -> Result<(), SchemaError> {
    let schema = match schema {
        // Boolean schemas: `true` admits everything, `false` nothing.
        Value::Bool(true) => return Ok(()),
        Value::Bool(false) => return Err(SchemaError::new(path, "schema admits no value")),
        Value::Object(obj) => obj,
        // Anything else is not a constraint we understand; admit.
        _ => return Ok(()),
    };

    if let Some(types) = schema.get("type") {
        check_type(value, types, path)?;
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(SchemaError::new(
                path,
                format!("value {value} is not one of the allowed values"),
            ));
        }
    }

    if let Value::Object(fields) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    return Err(SchemaError::new(
                        path,
                        format!("missing required property {name:?}"),
                    ));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        if let Some(properties) = properties {
            for (name, prop_schema) in properties {
                if let Some(field) = fields.get(name) {
                    check(field, prop_schema, &format!("{path}.{name}"))?;
                }
            }
        }

        if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
            for name in fields.keys() {
                if !properties.is_some_and(|p| p.contains_key(name)) {
                    return Err(SchemaError::new(
                        path,
                        format!("unexpected property {name:?}"),
                    ));
                }
            }
        }
    }

    if let (Value::Array(elements), Some(item_schema)) = (value, schema.get("items")) {
        for (index, element) in elements.iter().enumerate() {
            check(element, item_schema, &format!("{path}[{index}]"))?;
        }
    }

    Ok(())
}

fn check_type(value: &Value, types: &Value, path: &str) -> Result<(), SchemaError> {
    let matches_one = match types {
        Value::String(name) => matches_type(value, name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type(value, name)),
        _ => true,
    };

    if matches_one {
        Ok(())
    } else {
        Err(SchemaError::new(
            path,
            format!("expected type {types}, got {}", type_name(value)),
        ))
    }
}

fn matches_type(value: &Value, name: &str) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grade_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "grade": { "type": "integer" }
            },
            "required": ["grade"]
        })
    }

    #[test]
    fn accepts_matching_object() {
        assert_eq!(validate(&json!({"grade": 86}), &grade_schema()), Ok(()));
    }

    #[test]
    fn rejects_missing_required_property() {
        let err = validate(&json!({}), &grade_schema()).unwrap_err();
        assert!(err.message.contains("grade"));
        assert_eq!(err.path, "$");
    }

    #[test]
    fn rejects_wrong_property_type() {
        let err = validate(&json!({"grade": "eighty-six"}), &grade_schema()).unwrap_err();
        assert_eq!(err.path, "$.grade");
    }

    #[test]
    fn integer_rejects_fractional_numbers() {
        let err = validate(&json!({"grade": 86.5}), &grade_schema()).unwrap_err();
        assert_eq!(err.path, "$.grade");
    }

    #[test]
    fn enum_constrains_values() {
        let schema = json!({"type": "string", "enum": ["M", "N", "L"]});
        assert_eq!(validate(&json!("N"), &schema), Ok(()));
        assert!(validate(&json!("X"), &schema).is_err());
    }

    #[test]
    fn additional_properties_false_rejects_unknown_keys() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "additionalProperties": false
        });
        assert_eq!(validate(&json!({"name": "a"}), &schema), Ok(()));
        assert!(validate(&json!({"name": "a", "extra": 1}), &schema).is_err());
    }

    #[test]
    fn items_are_validated_elementwise() {
        let schema = json!({"type": "array", "items": {"type": "integer"}});
        assert_eq!(validate(&json!([1, 2, 3]), &schema), Ok(()));
        let err = validate(&json!([1, "two"]), &schema).unwrap_err();
        assert_eq!(err.path, "$[1]");
    }

    #[test]
    fn type_arrays_accept_any_listed_type() {
        let schema = json!({"type": ["string", "null"]});
        assert_eq!(validate(&json!("x"), &schema), Ok(()));
        assert_eq!(validate(&Value::Null, &schema), Ok(()));
        assert!(validate(&json!(3), &schema).is_err());
    }

    #[test]
    fn unknown_keywords_are_tolerated() {
        let schema = json!({"type": "string", "format": "uri", "description": "a link"});
        assert_eq!(validate(&json!("https://quiz.xyz"), &schema), Ok(()));
    }

    #[test]
    fn boolean_schemas() {
        assert_eq!(validate(&json!(1), &json!(true)), Ok(()));
        assert!(validate(&json!(1), &json!(false)).is_err());
    }
}
