//! The four scoring rubrics

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvalScore {
    pub passed: bool,
    pub reason: String,
}

impl EvalScore {
    fn pass(reason: &str) -> Self {
        Self {
            passed: true,
            reason: reason.to_string(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

pub fn exact_match(actual: &str, expected: &str) -> EvalScore {
    if actual.trim() == expected.trim() {
        EvalScore::pass("exact match")
    } else {
        EvalScore::fail(format!("expected {expected:?} got {actual:?}"))
    }
}

/// Case-insensitive, dot-all regex search.
pub fn regex_match(actual: &str, pattern: &str) -> EvalScore {
    let compiled = match Regex::new(&format!("(?is){pattern}")) {
        Ok(compiled) => compiled,
        Err(e) => return EvalScore::fail(format!("invalid pattern: {e}")),
    };
    if compiled.is_match(actual) {
        EvalScore::pass("regex match")
    } else {
        EvalScore::fail(format!("pattern {pattern:?} not found"))
    }
}

fn shape_matches(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Object(expected_map) => {
            let Value::Object(actual_map) = actual else {
                return false;
            };
            expected_map.iter().all(|(key, value)| {
                actual_map
                    .get(key)
                    .map(|actual_value| shape_matches(actual_value, value))
                    .unwrap_or(false)
            })
        }
        Value::Array(expected_items) => {
            let Value::Array(actual_items) = actual else {
                return false;
            };
            let Some(prototype) = expected_items.first() else {
                return true;
            };
            actual_items.iter().all(|item| shape_matches(item, prototype))
        }
        Value::String(_) => actual.is_string(),
        Value::Number(_) => actual.is_number(),
        Value::Bool(_) => actual.is_boolean(),
        Value::Null => actual.is_null(),
    }
}

/// Recursive key/type containment: every expected key must exist with a
/// value of the same JSON type.
pub fn json_schema_match(actual: &str, expected: &Value) -> EvalScore {
    let Ok(data) = serde_json::from_str::<Value>(actual) else {
        return EvalScore::fail("invalid JSON");
    };
    if shape_matches(&data, expected) {
        EvalScore::pass("schema match")
    } else {
        EvalScore::fail("schema mismatch")
    }
}

fn normalize_tool_call(actual: &Value) -> Option<Value> {
    match actual {
        Value::Object(_) => Some(actual.clone()),
        Value::Array(items) => items.first().filter(|item| item.is_object()).cloned(),
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|parsed| normalize_tool_call(&parsed)),
        _ => None,
    }
}

/// Name must match and every expected argument key must carry the expected
/// value.
pub fn tool_call_match(actual: &str, expected: &Value) -> EvalScore {
    let Some(data) = normalize_tool_call(&Value::String(actual.to_string())) else {
        return EvalScore::fail("no tool call payload");
    };
    let name_match = data.get("name") == expected.get("name");
    let empty = serde_json::Map::new();
    let expected_args = expected
        .get("arguments")
        .and_then(|v| v.as_object())
        .unwrap_or(&empty);
    let actual_args = data.get("arguments").and_then(|v| v.as_object());
    let args_match = expected_args.iter().all(|(key, value)| {
        actual_args
            .and_then(|args| args.get(key))
            .map(|actual_value| actual_value == value)
            .unwrap_or(false)
    });
    if name_match && args_match {
        EvalScore::pass("tool call match")
    } else {
        EvalScore::fail("tool call mismatch")
    }
}
