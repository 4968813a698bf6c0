//! Recursive schema checker.
//!
//! [`SchemaNode`] is a closed tagged variant over the JSON types, with one
//! check function per variant and explicit dispatch — no dynamic property
//! probing. It covers the subset needed for action input schemas: type,
//! numeric range, string length/pattern/enum, required fields, and optional
//! rejection of additional properties.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ValidationError, codes};

/// One node of a schema tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaNode {
    /// A string, optionally constrained.
    String {
        /// Minimum length in characters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        /// Maximum length in characters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        /// Regex the value must match.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        /// Closed set of allowed values.
        #[serde(
            rename = "enum",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        enum_values: Option<Vec<String>>,
    },
    /// A number, optionally range-constrained.
    Number {
        /// Inclusive lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
        /// Whether only integers are accepted.
        #[serde(default)]
        integer: bool,
    },
    /// A boolean.
    Boolean,
    /// JSON null.
    Null,
    /// An array with an optional item schema.
    Array {
        /// Schema every item must satisfy.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<Box<SchemaNode>>,
        /// Minimum item count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        /// Maximum item count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    /// An object with named properties.
    Object {
        /// Property schemas.
        #[serde(default)]
        properties: BTreeMap<String, SchemaNode>,
        /// Names that must be present.
        #[serde(default)]
        required: Vec<String>,
        /// Whether properties outside `properties` are allowed.
        #[serde(default = "default_true")]
        additional_properties: bool,
    },
}

const fn default_true() -> bool {
    true
}

/// Validate `value` against `schema`, returning every problem found.
#[must_use]
pub fn validate_value(schema: &SchemaNode, value: &Value) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    check_node(schema, value, "$", &mut errors);
    errors
}

fn check_node(schema: &SchemaNode, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    match schema {
        SchemaNode::String {
            min_length,
            max_length,
            pattern,
            enum_values,
        } => check_string(
            value,
            path,
            *min_length,
            *max_length,
            pattern.as_deref(),
            enum_values.as_deref(),
            errors,
        ),
        SchemaNode::Number {
            minimum,
            maximum,
            integer,
        } => check_number(value, path, *minimum, *maximum, *integer, errors),
        SchemaNode::Boolean => check_boolean(value, path, errors),
        SchemaNode::Null => check_null(value, path, errors),
        SchemaNode::Array {
            items,
            min_items,
            max_items,
        } => check_array(value, path, items.as_deref(), *min_items, *max_items, errors),
        SchemaNode::Object {
            properties,
            required,
            additional_properties,
        } => check_object(value, path, properties, required, *additional_properties, errors),
    }
}

fn check_string(
    value: &Value,
    path: &str,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<&str>,
    enum_values: Option<&[String]>,
    errors: &mut Vec<ValidationError>,
) {
    let Some(s) = value.as_str() else {
        errors.push(type_mismatch(path, "string", value));
        return;
    };

    let len = s.chars().count();
    if let Some(min) = min_length {
        if len < min {
            errors.push(ValidationError::new(
                path,
                codes::LENGTH,
                format!("string length {len} is below minimum {min}"),
            ));
        }
    }
    if let Some(max) = max_length {
        if len > max {
            errors.push(ValidationError::new(
                path,
                codes::LENGTH,
                format!("string length {len} exceeds maximum {max}"),
            ));
        }
    }

    if let Some(pattern) = pattern {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(s) {
                    errors.push(ValidationError::new(
                        path,
                        codes::PATTERN_MISMATCH,
                        format!("value does not match pattern '{pattern}'"),
                    ));
                }
            }
            Err(_) => errors.push(ValidationError::new(
                path,
                codes::INVALID_PATTERN,
                format!("schema pattern '{pattern}' does not compile"),
            )),
        }
    }

    if let Some(allowed) = enum_values {
        if !allowed.iter().any(|a| a == s) {
            errors.push(ValidationError::new(
                path,
                codes::ENUM_MISMATCH,
                format!("'{s}' is not one of the allowed values"),
            ));
        }
    }
}

fn check_number(
    value: &Value,
    path: &str,
    minimum: Option<f64>,
    maximum: Option<f64>,
    integer: bool,
    errors: &mut Vec<ValidationError>,
) {
    let Some(n) = value.as_f64() else {
        errors.push(type_mismatch(path, "number", value));
        return;
    };

    if integer && value.as_i64().is_none() && value.as_u64().is_none() {
        errors.push(ValidationError::new(
            path,
            codes::TYPE_MISMATCH,
            format!("expected integer, got {n}"),
        ));
    }

    if let Some(min) = minimum {
        if n < min {
            errors.push(ValidationError::new(
                path,
                codes::OUT_OF_RANGE,
                format!("{n} is below minimum {min}"),
            ));
        }
    }
    if let Some(max) = maximum {
        if n > max {
            errors.push(ValidationError::new(
                path,
                codes::OUT_OF_RANGE,
                format!("{n} exceeds maximum {max}"),
            ));
        }
    }
}

fn check_boolean(value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    if !value.is_boolean() {
        errors.push(type_mismatch(path, "boolean", value));
    }
}

fn check_null(value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    if !value.is_null() {
        errors.push(type_mismatch(path, "null", value));
    }
}

fn check_array(
    value: &Value,
    path: &str,
    items: Option<&SchemaNode>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    errors: &mut Vec<ValidationError>,
) {
    let Some(arr) = value.as_array() else {
        errors.push(type_mismatch(path, "array", value));
        return;
    };

    if let Some(min) = min_items {
        if arr.len() < min {
            errors.push(ValidationError::new(
                path,
                codes::LENGTH,
                format!("array length {} is below minimum {min}", arr.len()),
            ));
        }
    }
    if let Some(max) = max_items {
        if arr.len() > max {
            errors.push(ValidationError::new(
                path,
                codes::LENGTH,
                format!("array length {} exceeds maximum {max}", arr.len()),
            ));
        }
    }

    if let Some(item_schema) = items {
        for (i, item) in arr.iter().enumerate() {
            check_node(item_schema, item, &format!("{path}[{i}]"), errors);
        }
    }
}

fn check_object(
    value: &Value,
    path: &str,
    properties: &BTreeMap<String, SchemaNode>,
    required: &[String],
    additional_properties: bool,
    errors: &mut Vec<ValidationError>,
) {
    let Some(map) = value.as_object() else {
        errors.push(type_mismatch(path, "object", value));
        return;
    };

    for name in required {
        if !map.contains_key(name) {
            errors.push(ValidationError::new(
                format!("{path}.{name}"),
                codes::MISSING_REQUIRED,
                format!("required field '{name}' is missing"),
            ));
        }
    }

    for (name, child) in map {
        let child_path = format!("{path}.{name}");
        if let Some(schema) = properties.get(name) {
            check_node(schema, child, &child_path, errors);
        } else if !additional_properties {
            errors.push(ValidationError::new(
                child_path,
                codes::ADDITIONAL_PROPERTY,
                format!("field '{name}' is not allowed by the schema"),
            ));
        }
    }
}

fn type_mismatch(path: &str, expected: &str, value: &Value) -> ValidationError {
    let actual = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ValidationError::new(
        path,
        codes::TYPE_MISMATCH,
        format!("expected {expected}, got {actual}"),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
