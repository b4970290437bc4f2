//! Interception decisions
//!
//! Decides, per method, whether a call is logged and what is captured:
//! - `metadata` - type/method descriptors (the introspection table)
//! - `pattern` - type-name rules and method-exclusion patterns
//! - `cache` - `DecisionCache`, the per-type memoized resolver

pub mod cache;
pub mod metadata;
pub mod pattern;

pub use cache::DecisionCache;
pub use metadata::{
    MethodAnnotation, MethodDescriptor, MethodHandle, MethodKind, MethodSignature,
    TypeDescriptor, TypeRegistry, Visibility,
};
pub use pattern::{ExclusionPattern, RuleSet, TypePattern};

use crate::level::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an intercepted call records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBehavior {
    Input,
    Output,
    Both,
}

impl CaptureBehavior {
    /// Behavior for a pair of capture flags; `None` when neither is set
    pub fn from_flags(input: bool, output: bool) -> Option<Self> {
        match (input, output) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Input),
            (false, true) => Some(Self::Output),
            (false, false) => None,
        }
    }

    pub fn captures_input(self) -> bool {
        matches!(self, Self::Input | Self::Both)
    }

    pub fn captures_output(self) -> bool {
        matches!(self, Self::Output | Self::Both)
    }
}

/// Resolved logging policy for one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionDecision {
    pub behavior: CaptureBehavior,
    pub level: Severity,
    pub exception_level: Severity,
    /// Explicit target; `None` routes to the default target
    pub target: Option<String>,
    /// Named template for the formatter
    pub template: Option<String>,
}

impl fmt::Display for InterceptionDecision {
    /// `both info/error -> audit (template: short)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let behavior = match self.behavior {
            CaptureBehavior::Input => "input",
            CaptureBehavior::Output => "output",
            CaptureBehavior::Both => "both",
        };
        write!(f, "{} {}/{}", behavior, self.level, self.exception_level)?;
        if let Some(target) = &self.target {
            write!(f, " -> {}", target)?;
        }
        if let Some(template) = &self.template {
            write!(f, " (template: {})", template)?;
        }
        Ok(())
    }
}

impl InterceptionDecision {
    /// Decision used for auto-intercepted methods
    pub fn auto() -> Self {
        Self {
            behavior: CaptureBehavior::Input,
            level: Severity::Info,
            exception_level: Severity::Error,
            target: None,
            template: None,
        }
    }
}
