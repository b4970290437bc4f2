//! `{Placeholder}` message templates
//!
//! Templates are parsed once. Strict parsing rejects unknown placeholders
//! and unbalanced braces; lenient rendering (used by the fallback path)
//! leaves anything it does not recognise untouched and cannot fail.

use crate::entry::LogEntry;
use serde_json::Value;

/// Values a template can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Id,
    Timestamp,
    TypeName,
    MethodName,
    Success,
    Duration,
    Level,
    InputParameters,
    Output,
    ExceptionType,
    ExceptionMessage,
    Target,
}

impl Placeholder {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "Id" => Self::Id,
            "Timestamp" => Self::Timestamp,
            "TypeName" => Self::TypeName,
            "MethodName" => Self::MethodName,
            "Success" => Self::Success,
            "Duration" => Self::Duration,
            "Level" => Self::Level,
            "InputParameters" => Self::InputParameters,
            "Output" => Self::Output,
            "ExceptionType" => Self::ExceptionType,
            "ExceptionMessage" => Self::ExceptionMessage,
            "Target" => Self::Target,
            _ => return None,
        })
    }

    /// Render this value for `entry`; absent optional values render empty
    pub fn render(self, entry: &LogEntry) -> String {
        match self {
            Self::Id => entry.id().to_string(),
            Self::Timestamp => entry.timestamp().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            Self::TypeName => entry.type_name().to_string(),
            Self::MethodName => entry.method_name().to_string(),
            Self::Success => bool_text(entry.success()).to_string(),
            Self::Duration => entry.duration().as_millis().to_string(),
            Self::Level => entry.effective_severity().to_string(),
            Self::InputParameters => entry.input().map(value_text).unwrap_or_default(),
            Self::Output => entry.output().map(value_text).unwrap_or_default(),
            Self::ExceptionType => entry.exception_type().unwrap_or_default().to_string(),
            Self::ExceptionMessage => entry.exception_message().unwrap_or_default().to_string(),
            Self::Target => entry.target().unwrap_or_default().to_string(),
        }
    }
}

/// `True`/`False`, the casing log consumers of this format expect
pub fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Strings render bare, everything else as compact JSON
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse strictly: unknown placeholders and unclosed braces are errors
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| format!("unclosed '{{' in template \"{}\"", text))?;
            let name = &after[..close];
            let placeholder = Placeholder::parse(name)
                .ok_or_else(|| format!("unknown placeholder {{{}}}", name))?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Field(placeholder));
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, entry: &LogEntry) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(placeholder) => out.push_str(&placeholder.render(entry)),
            }
        }
        out
    }
}

/// Substitute the placeholders it knows and copy everything else verbatim
pub fn render_lenient(text: &str, entry: &LogEntry) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => match Placeholder::parse(&after[..close]) {
                Some(placeholder) => {
                    out.push_str(&placeholder.render(entry));
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
