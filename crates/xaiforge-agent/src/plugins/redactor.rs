//! Redactor plugin - scrubs secrets and PII from every event
//!
//! Rewrites string fields replacing emails, `sk-…`/`xai-…` style API keys
//! and bearer tokens with fixed redaction markers, and blanks values stored
//! under secret-ish keys. Constructs a new event each time; nothing is
//! retained across events or runs.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use xaiforge_core::Event;

use crate::plugins::{Plugin, PluginContext, PluginError};

const SECRET_KEYS: [&str; 4] = ["api_key", "token", "authorization", "secret"];

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex")
    })
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(sk-[A-Za-z0-9]{16,}|xai-[A-Za-z0-9]{16,})\b").expect("static regex")
    })
}

fn bearer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Bearer\s+[A-Za-z0-9\-._~+/]+=*").expect("static regex"))
}

fn redact_string(value: &str) -> String {
    let value = email_re().replace_all(value, "[redacted-email]");
    let value = token_re().replace_all(&value, "[redacted-token]");
    bearer_re()
        .replace_all(&value, "Bearer [redacted-token]")
        .into_owned()
}

fn redact_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_string(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if SECRET_KEYS.contains(&key.to_lowercase().as_str()) {
                        (key, Value::String("[redacted]".to_string()))
                    } else {
                        (key, redact_value(value))
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

pub struct Redactor;

impl Plugin for Redactor {
    fn name(&self) -> &str {
        "redactor"
    }

    fn on_event(&mut self, _ctx: &PluginContext, event: Event) -> Result<Event, PluginError> {
        let payload = serde_json::to_value(&event)
            .map_err(|e| PluginError::new("redactor", e.to_string()))?;
        let sanitized = redact_value(payload);
        serde_json::from_value(sanitized).map_err(|e| PluginError::new("redactor", e.to_string()))
    }
}
