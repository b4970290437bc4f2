//! Severity levels
//!
//! `Severity` is the pipeline's closed ordinal level set. Each writer adapter
//! has its own native level type and translates through [`NativeLevel`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generic severity, ordered `Trace < Debug < Info < Warn < Error < Critical < Off`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
    Off,
}

impl Severity {
    /// Every level in ordinal order
    pub const ALL: [Severity; 7] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Critical,
        Severity::Off,
    ];

    /// Ordinal position (0 = trace, 6 = off)
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Severity::ordinal`]
    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Whether a message at `self` passes a `minimum` admission level.
    ///
    /// `Off` never passes and a minimum of `Off` admits nothing.
    pub fn admits(minimum: Severity, level: Severity) -> bool {
        level != Severity::Off && minimum != Severity::Off && level >= minimum
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Off => "off",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Accepts the canonical names plus the common aliases used by
    /// other logging stacks (`information`, `warning`, `fatal`, `none`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "verbose" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" | "information" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "critical" | "fatal" => Ok(Severity::Critical),
            "off" | "none" => Ok(Severity::Off),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Translation between `Severity` and a writer's native level enumeration.
///
/// Implementations must be lossless: `to_severity(from_severity(s)) == s`
/// for every `s` in [`Severity::ALL`].
pub trait NativeLevel: Copy + Sized {
    fn from_severity(severity: Severity) -> Self;
    fn to_severity(self) -> Severity;
}

impl NativeLevel for Severity {
    fn from_severity(severity: Severity) -> Self {
        severity
    }

    fn to_severity(self) -> Severity {
        self
    }
}
