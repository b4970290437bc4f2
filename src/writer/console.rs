//! Console writer

use super::LogWriter;
use crate::config::TargetDefinition;
use crate::entry::ErrorInfo;
use crate::error::Result;
use crate::level::{NativeLevel, Severity};
use chrono::Utc;
use std::io::{self, Write};

/// Console level set, with the short labels printed in front of each line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConsoleLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
    None,
}

impl ConsoleLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Trace => "trce",
            Self::Debug => "dbug",
            Self::Information => "info",
            Self::Warning => "warn",
            Self::Error => "fail",
            Self::Critical => "crit",
            Self::None => "none",
        }
    }
}

impl NativeLevel for ConsoleLevel {
    fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Trace => Self::Trace,
            Severity::Debug => Self::Debug,
            Severity::Info => Self::Information,
            Severity::Warn => Self::Warning,
            Severity::Error => Self::Error,
            Severity::Critical => Self::Critical,
            Severity::Off => Self::None,
        }
    }

    fn to_severity(self) -> Severity {
        match self {
            Self::Trace => Severity::Trace,
            Self::Debug => Severity::Debug,
            Self::Information => Severity::Info,
            Self::Warning => Severity::Warn,
            Self::Error => Severity::Error,
            Self::Critical => Severity::Critical,
            Self::None => Severity::Off,
        }
    }
}

/// Writes one line per message; error and above go to stderr
#[derive(Debug)]
pub struct ConsoleWriter {
    min_level: ConsoleLevel,
    timestamps: bool,
}

impl ConsoleWriter {
    pub fn new(min_level: Severity) -> Self {
        Self {
            min_level: ConsoleLevel::from_severity(min_level),
            timestamps: true,
        }
    }

    /// Properties: `timestamps` (bool, default true)
    pub fn from_target(target: &TargetDefinition) -> Result<Self> {
        Ok(Self {
            min_level: ConsoleLevel::from_severity(target.min_level),
            timestamps: target.parsed_property("timestamps", true)?,
        })
    }

    fn line(&self, level: ConsoleLevel, message: &str) -> String {
        if self.timestamps {
            format!(
                "{} {}: {}",
                Utc::now().format("%H:%M:%S%.3f"),
                level.label(),
                message
            )
        } else {
            format!("{}: {}", level.label(), message)
        }
    }
}

impl LogWriter for ConsoleWriter {
    fn is_enabled_for(&self, severity: Severity) -> bool {
        let level = ConsoleLevel::from_severity(severity);
        self.min_level != ConsoleLevel::None && level != ConsoleLevel::None && level >= self.min_level
    }

    fn write(&self, severity: Severity, message: &str, _error: Option<&ErrorInfo>) -> Result<()> {
        let level = ConsoleLevel::from_severity(severity);
        let line = self.line(level, message);
        // A closed stdout must not fail the pipeline
        if level >= ConsoleLevel::Error {
            let _ = writeln!(io::stderr().lock(), "{}", line);
        } else {
            let _ = writeln!(io::stdout().lock(), "{}", line);
        }
        Ok(())
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}
