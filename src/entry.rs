//! Log entry types
//!
//! A `LogEntry` is built in two steps: [`PendingEntry::begin`] pre-populates it
//! when the intercepted call starts, and one of the `complete_*` methods
//! consumes the pending value when the call returns. Completion fields are
//! therefore set exactly once and the finished entry is read-only.

use crate::decision::InterceptionDecision;
use crate::level::Severity;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Exception details captured from a failed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub type_name: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Build from any displayable error, using its Rust type name
    pub fn from_error<E: std::fmt::Display>(error: &E) -> Self {
        Self::new(std::any::type_name::<E>(), error.to_string())
    }
}

/// One completed method-execution record
#[derive(Debug, Clone)]
pub struct LogEntry {
    id: Uuid,
    timestamp: DateTime<Utc>,
    type_name: String,
    method_name: String,
    success: bool,
    duration: Duration,
    level: Severity,
    exception_level: Severity,
    input: Option<Value>,
    output: Option<Value>,
    error: Option<ErrorInfo>,
    target: Option<String>,
    template_name: Option<String>,
}

impl LogEntry {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn exception_level(&self) -> Severity {
        self.exception_level
    }

    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn exception_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn exception_type(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.type_name.as_str())
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    /// Severity to emit with: the exception level whenever an exception was recorded
    pub fn effective_severity(&self) -> Severity {
        if self.error.is_some() {
            self.exception_level
        } else {
            self.level
        }
    }
}

/// Entry pre-populated at call start, waiting for the call outcome
#[derive(Debug)]
pub struct PendingEntry {
    entry: LogEntry,
    capture_output: bool,
}

impl PendingEntry {
    /// Pre-populate an entry from the resolved decision.
    ///
    /// `input` is only kept when the decision captures input.
    pub fn begin(
        type_name: impl Into<String>,
        method_name: impl Into<String>,
        decision: &InterceptionDecision,
        input: Option<Value>,
    ) -> Self {
        let behavior = decision.behavior;
        Self {
            entry: LogEntry {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                type_name: type_name.into(),
                method_name: method_name.into(),
                success: false,
                duration: Duration::ZERO,
                level: decision.level,
                exception_level: decision.exception_level,
                input: input.filter(|_| behavior.captures_input()),
                output: None,
                error: None,
                target: decision.target.clone(),
                template_name: decision.template.clone(),
            },
            capture_output: behavior.captures_output(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.entry.id
    }

    /// Whether the caller should bother serializing the return value
    pub fn wants_output(&self) -> bool {
        self.capture_output
    }

    /// Complete a call that returned normally
    pub fn complete_success(self, duration: Duration, output: Option<Value>) -> LogEntry {
        let capture_output = self.capture_output;
        LogEntry {
            success: true,
            duration,
            output: output.filter(|_| capture_output),
            ..self.entry
        }
    }

    /// Complete a call that failed
    pub fn complete_failure(self, duration: Duration, error: ErrorInfo) -> LogEntry {
        LogEntry {
            success: false,
            duration,
            error: Some(error),
            ..self.entry
        }
    }
}
