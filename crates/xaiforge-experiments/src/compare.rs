//! Response comparison: token-level stability and positional tool-call diff

use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{Algorithm, DiffTag, TextDiff};

use xaiforge_gateway::ToolCall;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiffSummary {
    pub score: f64,
    pub summary: String,
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

fn tag_name(tag: DiffTag) -> &'static str {
    match tag {
        DiffTag::Equal => "equal",
        DiffTag::Delete => "delete",
        DiffTag::Insert => "insert",
        DiffTag::Replace => "replace",
    }
}

/// Stability is the sequence-matcher ratio between whitespace tokenizations,
/// a value in [0, 1]; the summary lists the non-equal opcodes.
pub fn compare_text(primary: &str, secondary: &str) -> DiffSummary {
    let primary_tokens = tokenize(primary);
    let secondary_tokens = tokenize(secondary);
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&primary_tokens, &secondary_tokens);
    let score = f64::from(diff.ratio());
    let mut chunks = Vec::new();
    for op in diff.ops() {
        if op.tag() == DiffTag::Equal {
            continue;
        }
        let before = primary_tokens[op.old_range()].join(" ");
        let after = secondary_tokens[op.new_range()].join(" ");
        chunks.push(format!("{}: '{}' -> '{}'", tag_name(op.tag()), before, after));
    }
    let summary = if chunks.is_empty() {
        "no_diff".to_string()
    } else {
        chunks.join(" | ")
    };
    DiffSummary { score, summary }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MismatchedCall {
    pub index: usize,
    pub primary: Value,
    pub secondary: Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolCallDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub mismatched: Vec<MismatchedCall>,
}

/// `added`/`removed` compare tool names by membership; `mismatched` compares
/// arguments positionally.
pub fn compare_tool_calls(primary: &[ToolCall], secondary: &[ToolCall]) -> ToolCallDiff {
    let primary_names: Vec<&str> = primary.iter().map(|call| call.name.as_str()).collect();
    let secondary_names: Vec<&str> = secondary.iter().map(|call| call.name.as_str()).collect();
    let added = secondary_names
        .iter()
        .filter(|name| !primary_names.contains(name))
        .map(|name| name.to_string())
        .collect();
    let removed = primary_names
        .iter()
        .filter(|name| !secondary_names.contains(name))
        .map(|name| name.to_string())
        .collect();
    let mut mismatched = Vec::new();
    for (index, primary_call) in primary.iter().enumerate() {
        let Some(secondary_call) = secondary.get(index) else {
            continue;
        };
        if primary_call.arguments != secondary_call.arguments {
            mismatched.push(MismatchedCall {
                index,
                primary: Value::Object(primary_call.arguments.clone()),
                secondary: Value::Object(secondary_call.arguments.clone()),
            });
        }
    }
    ToolCallDiff {
        added,
        removed,
        mismatched,
    }
}
