//! Built-in formatters

use super::template::{bool_text, value_text, Template};
use super::{FormattedMessage, Formatter};
use crate::entry::LogEntry;
use serde_json::{json, Map, Value};

// =============================================================================
// Structured
// =============================================================================

/// `Method T.M executed in Nms - Success: True | Input: .. | Output: ..`
#[derive(Debug, Default)]
pub struct StructuredFormatter;

impl StructuredFormatter {
    fn line(entry: &LogEntry) -> String {
        let mut line = format!(
            "Method {}.{} executed in {}ms - Success: {}",
            entry.type_name(),
            entry.method_name(),
            entry.duration().as_millis(),
            bool_text(entry.success())
        );
        if let Some(input) = entry.input() {
            line.push_str(" | Input: ");
            line.push_str(&value_text(input));
        }
        if let Some(output) = entry.output() {
            line.push_str(" | Output: ");
            line.push_str(&value_text(output));
        }
        if let Some(message) = entry.exception_message() {
            line.push_str(&format!(
                " | Exception: {}: {}",
                entry.exception_type().unwrap_or("Error"),
                message
            ));
        }
        line
    }
}

impl Formatter for StructuredFormatter {
    fn name(&self) -> &str {
        "structured"
    }

    fn format(&self, entry: &LogEntry) -> FormattedMessage {
        FormattedMessage::Success(Self::line(entry))
    }
}

// =============================================================================
// JSON
// =============================================================================

/// One compact JSON object per entry
#[derive(Debug, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    fn metadata(entry: &LogEntry) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), json!(entry.id().to_string()));
        map.insert(
            "timestamp".into(),
            json!(entry.timestamp().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        map.insert("level".into(), json!(entry.effective_severity().as_str()));
        map.insert("success".into(), json!(entry.success()));
        map.insert(
            "duration_ms".into(),
            json!(entry.duration().as_secs_f64() * 1000.0),
        );
        if let Some(target) = entry.target() {
            map.insert("target".into(), json!(target));
        }
        map
    }
}

impl Formatter for JsonFormatter {
    fn name(&self) -> &str {
        "json"
    }

    fn format(&self, entry: &LogEntry) -> FormattedMessage {
        let mut map = Self::metadata(entry);
        map.insert("type".into(), json!(entry.type_name()));
        map.insert("method".into(), json!(entry.method_name()));
        if let Some(input) = entry.input() {
            map.insert("input".into(), input.clone());
        }
        if let Some(output) = entry.output() {
            map.insert("output".into(), output.clone());
        }
        if let Some(message) = entry.exception_message() {
            map.insert(
                "exception".into(),
                json!({ "type": entry.exception_type(), "message": message }),
            );
        }
        match serde_json::to_string(&Value::Object(map)) {
            Ok(text) => FormattedMessage::Success(text),
            Err(e) => FormattedMessage::Failure(e.to_string()),
        }
    }
}

// =============================================================================
// Hybrid
// =============================================================================

/// Structured line followed by JSON metadata
#[derive(Debug, Default)]
pub struct HybridFormatter;

impl Formatter for HybridFormatter {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn format(&self, entry: &LogEntry) -> FormattedMessage {
        let metadata = Value::Object(JsonFormatter::metadata(entry));
        match serde_json::to_string(&metadata) {
            Ok(meta) => {
                FormattedMessage::Success(format!("{} | {}", StructuredFormatter::line(entry), meta))
            }
            Err(e) => FormattedMessage::Failure(e.to_string()),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Renders one user template; a template that does not parse fails every entry
#[derive(Debug)]
pub struct TemplateFormatter {
    name: String,
    template: Result<Template, String>,
}

impl TemplateFormatter {
    pub fn new(name: impl Into<String>, text: &str) -> Self {
        Self {
            name: name.into(),
            template: Template::parse(text),
        }
    }
}

impl Formatter for TemplateFormatter {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self, entry: &LogEntry) -> FormattedMessage {
        match &self.template {
            Ok(template) => FormattedMessage::Success(template.render(entry)),
            Err(reason) => FormattedMessage::Failure(reason.clone()),
        }
    }
}

/// Picks the success or error template by call outcome
#[derive(Debug)]
pub struct OutcomeFormatter {
    success: TemplateFormatter,
    error: TemplateFormatter,
}

impl OutcomeFormatter {
    pub fn new(success_text: &str, error_text: &str) -> Self {
        Self {
            success: TemplateFormatter::new("outcome.success", success_text),
            error: TemplateFormatter::new("outcome.error", error_text),
        }
    }
}

impl Formatter for OutcomeFormatter {
    fn name(&self) -> &str {
        "outcome"
    }

    fn format(&self, entry: &LogEntry) -> FormattedMessage {
        if entry.success() {
            self.success.format(entry)
        } else {
            self.error.format(entry)
        }
    }
}
