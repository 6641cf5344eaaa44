/// Output sanitization.
///
/// Downstream consumers are JSON clients; JSON has no representation for
/// NaN or infinity, and a bare "NaN" token in a payload breaks strict
/// parsers. This module guarantees every numeric value leaving the pipeline
/// is finite or null: a typed helper for `Option<f64>` fields, and a
/// recursive walker applied to the fully serialized response as the final
/// step. Structure (objects, arrays) is preserved unchanged.

use serde_json::Value;

/// Null out a non-finite optional numeric value.
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Recursively replace any non-finite number in a JSON tree with null.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Number(n) => {
            if n.as_f64().is_some_and(|f| !f.is_finite()) {
                Value::Null
            } else {
                Value::Number(n)
            }
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| (key, sanitize_value(inner)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(sanitize_value).collect())
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
