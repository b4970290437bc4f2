//! Routes messages to target writers
//!
//! Target resolution for an entry, first configured name wins:
//! 1. the entry's own target
//! 2. the pipeline's default target
//! 3. the entry's type name

use super::{LogWriter, WriterRegistry};
use crate::config::PipelineConfig;
use crate::entry::{ErrorInfo, LogEntry};
use crate::error::Result;
use crate::format::FormatterKind;
use crate::level::Severity;
use std::collections::HashMap;
use std::sync::Arc;

/// What happened to a dispatched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Written,
    /// The target's minimum level rejected the severity
    Filtered,
    /// No writer is configured under the resolved name
    Unrouted,
}

#[derive(Debug)]
struct Target {
    writer: Arc<dyn LogWriter>,
    formatter: Option<FormatterKind>,
}

#[derive(Debug, Default)]
pub struct LogDispatcher {
    targets: HashMap<String, Target>,
    default_target: Option<String>,
}

impl LogDispatcher {
    pub fn new(default_target: Option<String>) -> Self {
        Self {
            targets: HashMap::new(),
            default_target,
        }
    }

    /// Build writers for every enabled configured target
    pub fn from_config(config: &PipelineConfig, registry: &WriterRegistry) -> Result<Self> {
        let mut dispatcher = Self::new(config.pipeline.default_target.clone());
        for (name, writer) in registry.build_all(&config.targets)? {
            let formatter = config.targets.get(&name).and_then(|t| t.formatter);
            dispatcher.add_target(name, writer, formatter);
        }
        Ok(dispatcher)
    }

    pub fn add_target(
        &mut self,
        name: impl Into<String>,
        writer: Arc<dyn LogWriter>,
        formatter: Option<FormatterKind>,
    ) {
        self.targets.insert(name.into(), Target { writer, formatter });
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn target_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.targets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Name of the target `entry` goes to, if any is configured
    pub fn resolve_target<'a>(&'a self, entry: &'a LogEntry) -> Option<&'a str> {
        [
            entry.target(),
            self.default_target.as_deref(),
            Some(entry.type_name()),
        ]
        .into_iter()
        .flatten()
        .find(|name| self.targets.contains_key(*name))
    }

    /// Formatter override configured on a target
    pub fn formatter_for(&self, target: &str) -> Option<FormatterKind> {
        self.targets.get(target).and_then(|t| t.formatter)
    }

    /// Whether `target` would emit at `severity`
    pub fn is_enabled(&self, target: &str, severity: Severity) -> bool {
        self.targets
            .get(target)
            .is_some_and(|t| t.writer.is_enabled_for(severity))
    }

    /// Write through a target, honouring its admission check
    pub fn write(
        &self,
        target: &str,
        severity: Severity,
        message: &str,
        error: Option<&ErrorInfo>,
    ) -> Result<DispatchOutcome> {
        let Some(t) = self.targets.get(target) else {
            return Ok(DispatchOutcome::Unrouted);
        };
        if !t.writer.is_enabled_for(severity) {
            return Ok(DispatchOutcome::Filtered);
        }
        t.writer.write(severity, message, error)?;
        Ok(DispatchOutcome::Written)
    }

    pub fn flush_all(&self) {
        for target in self.targets.values() {
            target.writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{CaptureBehavior, InterceptionDecision};
    use crate::entry::PendingEntry;
    use crate::writer::MemoryWriter;
    use std::time::Duration;

    fn entry(type_name: &str, target: Option<&str>) -> LogEntry {
        let decision = InterceptionDecision {
            behavior: CaptureBehavior::Input,
            level: Severity::Info,
            exception_level: Severity::Error,
            target: target.map(String::from),
            template: None,
        };
        PendingEntry::begin(type_name, "Run", &decision, None)
            .complete_success(Duration::ZERO, None)
    }

    fn dispatcher() -> LogDispatcher {
        let mut d = LogDispatcher::new(Some("console".into()));
        d.add_target("console", Arc::new(MemoryWriter::new(Severity::Info)), None);
        d.add_target(
            "audit",
            Arc::new(MemoryWriter::new(Severity::Warn)),
            Some(FormatterKind::Json),
        );
        d.add_target("Jobs.Nightly", Arc::new(MemoryWriter::new(Severity::Trace)), None);
        d
    }

    #[test]
    fn test_resolution_order() {
        let d = dispatcher();
        assert_eq!(d.resolve_target(&entry("Shop.Orders", Some("audit"))), Some("audit"));
        assert_eq!(d.resolve_target(&entry("Shop.Orders", None)), Some("console"));
        // Unconfigured explicit target falls through to the default
        assert_eq!(d.resolve_target(&entry("Shop.Orders", Some("gone"))), Some("console"));

        let mut no_default = dispatcher();
        no_default.default_target = None;
        assert_eq!(no_default.resolve_target(&entry("Jobs.Nightly", None)), Some("Jobs.Nightly"));
        assert_eq!(no_default.resolve_target(&entry("Shop.Orders", None)), None);
    }

    #[test]
    fn test_write_filters_below_min_level() {
        let d = dispatcher();
        assert_eq!(
            d.write("audit", Severity::Info, "quiet", None).unwrap(),
            DispatchOutcome::Filtered
        );
        assert_eq!(
            d.write("audit", Severity::Error, "loud", None).unwrap(),
            DispatchOutcome::Written
        );
        assert_eq!(
            d.write("missing", Severity::Error, "lost", None).unwrap(),
            DispatchOutcome::Unrouted
        );
    }

    #[test]
    fn test_formatter_override() {
        let d = dispatcher();
        assert_eq!(d.formatter_for("audit"), Some(FormatterKind::Json));
        assert_eq!(d.formatter_for("console"), None);
        assert_eq!(d.target_names(), vec!["Jobs.Nightly", "audit", "console"]);
    }

    #[test]
    fn test_from_config() {
        let config = crate::config::from_toml_str(
            r#"
[pipeline]
default_target = "mem"

[targets.mem]
kind = "memory"
formatter = "outcome"
"#,
        )
        .unwrap();
        let d = LogDispatcher::from_config(&config, &WriterRegistry::with_defaults()).unwrap();
        assert!(d.has_target("mem"));
        assert_eq!(d.formatter_for("mem"), Some(FormatterKind::Outcome));
    }
}
