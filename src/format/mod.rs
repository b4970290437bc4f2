//! Message formatting
//!
//! Separates what is logged from how it is written:
//! - **Formatter**: turns a `LogEntry` into text (this module)
//! - **Writer**: puts text somewhere (see `writer`)
//!
//! # Adding a new formatter
//!
//! 1. Implement the `Formatter` trait
//! 2. Register it on the `FormatterSelector` with `override_kind` or `register_named`
//! 3. No other changes needed

pub mod builtin;
pub mod selector;
pub mod template;

pub use builtin::{
    HybridFormatter, JsonFormatter, OutcomeFormatter, StructuredFormatter, TemplateFormatter,
};
pub use selector::{FormatterSelector, RenderOutcome, Rendered};
pub use template::Template;

use crate::entry::LogEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in formatter families selectable from config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatterKind {
    /// Human-readable line with optional input/output/exception parts
    #[default]
    Structured,
    /// One JSON object per entry
    Json,
    /// Structured line followed by JSON metadata
    Hybrid,
    /// `formatting.custom_template`
    Custom,
    /// `formatting.success_template` / `formatting.error_template` by outcome
    Outcome,
}

impl fmt::Display for FormatterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Structured => "structured",
            Self::Json => "json",
            Self::Hybrid => "hybrid",
            Self::Custom => "custom",
            Self::Outcome => "outcome",
        };
        f.write_str(name)
    }
}

/// Result of formatting: rendered text or the reason it failed, never both
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedMessage {
    Success(String),
    Failure(String),
}

impl FormattedMessage {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Turns entries into message text
pub trait Formatter: Send + Sync + fmt::Debug {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Format one entry. Failures are returned, not raised; a panic is
    /// treated as a failure by the selector.
    fn format(&self, entry: &LogEntry) -> FormattedMessage;
}
