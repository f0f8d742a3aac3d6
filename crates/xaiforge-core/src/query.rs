//! Small trace query language: `field=value AND field~substring`
//!
//! `=` compares the stringified field exactly, `~` matches a
//! case-insensitive substring. Conditions are AND-ed. The `task` field is
//! resolved against the manifest; everything else against each event line.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::{list_manifests, TraceReader};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Contains,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

pub fn parse_query(expression: &str) -> Result<Vec<Condition>> {
    let splitter = Regex::new(r"(?i)\s+AND\s+").expect("static regex");
    let mut conditions = Vec::new();
    for part in splitter.split(expression) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (field, operator, value) = if let Some((field, value)) = part.split_once('~') {
            (field, Operator::Contains, value)
        } else if let Some((field, value)) = part.split_once('=') {
            (field, Operator::Equals, value)
        } else {
            return Err(Error::bad_input(format!("invalid query condition: {part}")));
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        conditions.push(Condition {
            field: field.trim().to_string(),
            operator,
            value: value.to_string(),
        });
    }
    if conditions.is_empty() {
        return Err(Error::bad_input("query expression is empty"));
    }
    Ok(conditions)
}

fn field_value<'a>(event: &'a Value, manifest_task: &'a str, field: &str) -> Option<String> {
    let key = match field {
        "tool" => "tool_name",
        other => other,
    };
    if field == "task" {
        return Some(manifest_task.to_string());
    }
    event.get(key).map(stringify)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(event: &Value, manifest_task: &str, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| {
        let Some(value) = field_value(event, manifest_task, &condition.field) else {
            return false;
        };
        match condition.operator {
            Operator::Equals => value == condition.value,
            Operator::Contains => value
                .to_lowercase()
                .contains(&condition.value.to_lowercase()),
        }
    })
}

/// Evaluate a query over every sealed trace, returning per-trace match
/// counts for traces with at least one matching event.
pub fn query_traces(base_dir: &Path, expression: &str) -> Result<BTreeMap<String, u64>> {
    let conditions = parse_query(expression)?;
    let mut results = BTreeMap::new();
    for summary in list_manifests(base_dir) {
        let manifest = &summary.manifest;
        let reader = TraceReader::new(base_dir, &manifest.trace_id);
        let Ok(values) = reader.read_values() else {
            continue;
        };
        let count = values
            .iter()
            .filter(|event| matches(event, &manifest.task, &conditions))
            .count() as u64;
        if count > 0 {
            results.insert(manifest.trace_id.clone(), count);
        }
    }
    Ok(results)
}
