//! Centralized error types for the pipeline
//!
//! All pipeline errors are represented by the `PipelineError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, PipelineError>`.
//!
//! None of these ever reach an intercepted caller: the decision, enqueue and
//! processing paths record failures on the diagnostics channel instead.

use std::fmt;
use std::path::PathBuf;

/// All pipeline errors
#[derive(Debug)]
pub enum PipelineError {
    // === Config ===
    /// Config file could not be read
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file is not valid TOML for the expected shape
    ConfigParse { path: PathBuf, reason: String },
    /// Invalid config value
    ConfigValidation { field: String, reason: String },

    // === Writers ===
    /// No factory registered for a target kind
    UnknownTargetKind { target: String, kind: String },
    /// A writer could not be constructed
    WriterInit {
        target: String,
        source: std::io::Error,
    },
    /// A writer rejected a message
    WriterRejected { target: String, reason: String },

    // === Service ===
    /// `start()` called on a service that already left `Created`
    AlreadyStarted,
    /// Lifecycle operation on a service that was never started
    NotStarted,
    /// The consumer task terminated abnormally
    ServiceFault { reason: String },
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigRead { source, .. } | Self::WriterInit { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigRead { path, .. } => write!(f, "Cannot read config: {}", path.display()),
            Self::ConfigParse { path, reason } => {
                write!(f, "Invalid config {}: {}", path.display(), reason)
            }
            Self::ConfigValidation { field, reason } => write!(f, "Invalid {}: {}", field, reason),
            Self::UnknownTargetKind { target, kind } => {
                write!(f, "Target '{}' has unknown kind '{}'", target, kind)
            }
            Self::WriterInit { target, source } => {
                write!(f, "Cannot open writer for target '{}': {}", target, source)
            }
            Self::WriterRejected { target, reason } => {
                write!(f, "Target '{}' rejected message: {}", target, reason)
            }
            Self::AlreadyStarted => write!(f, "Background service already started"),
            Self::NotStarted => write!(f, "Background service not started"),
            Self::ServiceFault { reason } => write!(f, "Background service faulted: {}", reason),
        }
    }
}

/// Alias for Result with PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
