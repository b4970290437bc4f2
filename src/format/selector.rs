//! Formatter selection and fallback
//!
//! Precedence for one entry:
//! 1. the entry's template name (a registered formatter or `formatting.templates`)
//! 2. the target's formatter kind
//! 3. `formatting.default_kind`
//!
//! Whatever is selected, a message always comes out: a failing or panicking
//! formatter is replaced by the fallback template, or by a bracketed
//! diagnostic when fallback is disabled.

use super::builtin::{
    HybridFormatter, JsonFormatter, OutcomeFormatter, StructuredFormatter, TemplateFormatter,
};
use super::template::render_lenient;
use super::{FormattedMessage, Formatter, FormatterKind};
use crate::config::FormattingConfig;
use crate::constants::DIAGNOSTICS_TARGET;
use crate::entry::LogEntry;
use crate::error::panic_message;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

/// How a message was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The selected formatter succeeded
    Primary,
    /// The selected formatter failed; the fallback template was used
    Fallback,
    /// The selected formatter failed and fallback is disabled
    Diagnostic,
}

/// Final message text handed to a writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub outcome: RenderOutcome,
}

#[derive(Debug)]
pub struct FormatterSelector {
    default_kind: FormatterKind,
    fallback_enabled: bool,
    fallback_template: String,
    kinds: HashMap<FormatterKind, Arc<dyn Formatter>>,
    templates: BTreeMap<String, String>,
    /// Named formatters, registered up front or built lazily from `templates`
    named: DashMap<String, Arc<dyn Formatter>>,
}

impl FormatterSelector {
    pub fn new(config: &FormattingConfig) -> Self {
        let mut kinds: HashMap<FormatterKind, Arc<dyn Formatter>> = HashMap::new();
        kinds.insert(FormatterKind::Structured, Arc::new(StructuredFormatter));
        kinds.insert(FormatterKind::Json, Arc::new(JsonFormatter));
        kinds.insert(FormatterKind::Hybrid, Arc::new(HybridFormatter));
        kinds.insert(
            FormatterKind::Custom,
            Arc::new(TemplateFormatter::new("custom", &config.custom_template)),
        );
        kinds.insert(
            FormatterKind::Outcome,
            Arc::new(OutcomeFormatter::new(
                &config.success_template,
                &config.error_template,
            )),
        );

        Self {
            default_kind: config.default_kind,
            fallback_enabled: config.fallback_enabled,
            fallback_template: config.fallback_template.clone(),
            kinds,
            templates: config.templates.clone(),
            named: DashMap::new(),
        }
    }

    /// Replace the formatter used for a kind
    pub fn override_kind(&mut self, kind: FormatterKind, formatter: Arc<dyn Formatter>) {
        self.kinds.insert(kind, formatter);
    }

    /// Register a formatter selectable by entry template name
    pub fn register_named(&self, name: impl Into<String>, formatter: Arc<dyn Formatter>) {
        self.named.insert(name.into(), formatter);
    }

    pub fn default_kind(&self) -> FormatterKind {
        self.default_kind
    }

    fn named(&self, name: &str) -> Option<Arc<dyn Formatter>> {
        if let Some(formatter) = self.named.get(name) {
            return Some(Arc::clone(formatter.value()));
        }
        let text = self.templates.get(name)?;
        let formatter = self
            .named
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TemplateFormatter::new(name, text)));
        Some(Arc::clone(formatter.value()))
    }

    fn select(
        &self,
        entry: &LogEntry,
        target_kind: Option<FormatterKind>,
    ) -> Result<Arc<dyn Formatter>, String> {
        if let Some(name) = entry.template_name() {
            return self
                .named(name)
                .ok_or_else(|| format!("template '{}' not found", name));
        }
        let kind = target_kind.unwrap_or(self.default_kind);
        self.kinds
            .get(&kind)
            .cloned()
            .ok_or_else(|| format!("no formatter for kind '{}'", kind))
    }

    /// Produce the message for `entry`. Never fails.
    pub fn format(&self, entry: &LogEntry, target_kind: Option<FormatterKind>) -> Rendered {
        let result = match self.select(entry, target_kind) {
            Ok(formatter) => catch_unwind(AssertUnwindSafe(|| formatter.format(entry)))
                .unwrap_or_else(|payload| {
                    FormattedMessage::Failure(format!(
                        "formatter '{}' panicked: {}",
                        formatter.name(),
                        panic_message(payload.as_ref())
                    ))
                }),
            Err(reason) => FormattedMessage::Failure(reason),
        };

        match result {
            FormattedMessage::Success(text) => Rendered {
                text,
                outcome: RenderOutcome::Primary,
            },
            FormattedMessage::Failure(reason) => {
                debug!(
                    target: DIAGNOSTICS_TARGET,
                    "Formatting {}.{} failed: {}",
                    entry.type_name(),
                    entry.method_name(),
                    reason
                );
                if self.fallback_enabled {
                    Rendered {
                        text: render_lenient(&self.fallback_template, entry),
                        outcome: RenderOutcome::Fallback,
                    }
                } else {
                    Rendered {
                        text: format!("[Formatting Error: {}]", reason),
                        outcome: RenderOutcome::Diagnostic,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{CaptureBehavior, InterceptionDecision};
    use crate::entry::PendingEntry;
    use crate::level::Severity;
    use std::time::Duration;

    #[derive(Debug)]
    struct Failing;

    impl Formatter for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn format(&self, _entry: &LogEntry) -> FormattedMessage {
            FormattedMessage::Failure("always fails".into())
        }
    }

    #[derive(Debug)]
    struct Panicking;

    impl Formatter for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn format(&self, _entry: &LogEntry) -> FormattedMessage {
            panic!("formatter exploded")
        }
    }

    fn entry_with(template: Option<&str>) -> LogEntry {
        let decision = InterceptionDecision {
            behavior: CaptureBehavior::Input,
            level: Severity::Info,
            exception_level: Severity::Error,
            target: None,
            template: template.map(String::from),
        };
        PendingEntry::begin("Foo", "Bar", &decision, None)
            .complete_success(Duration::from_millis(1), None)
    }

    fn selector(config: FormattingConfig) -> FormatterSelector {
        FormatterSelector::new(&config)
    }

    #[test]
    fn test_default_kind_is_used() {
        let rendered = selector(FormattingConfig::default()).format(&entry_with(None), None);
        assert_eq!(rendered.outcome, RenderOutcome::Primary);
        assert!(rendered.text.starts_with("Method Foo.Bar executed in"));
    }

    #[test]
    fn test_target_kind_beats_default() {
        let rendered = selector(FormattingConfig::default())
            .format(&entry_with(None), Some(FormatterKind::Json));
        assert!(rendered.text.starts_with('{'));
    }

    #[test]
    fn test_entry_template_beats_target_kind() {
        let mut config = FormattingConfig::default();
        config
            .templates
            .insert("audit".into(), "AUDIT {TypeName}.{MethodName}".into());
        let selector = selector(config);

        let rendered = selector.format(&entry_with(Some("audit")), Some(FormatterKind::Json));
        assert_eq!(rendered.text, "AUDIT Foo.Bar");
        // Second lookup hits the cached formatter
        let rendered = selector.format(&entry_with(Some("audit")), None);
        assert_eq!(rendered.text, "AUDIT Foo.Bar");
    }

    #[test]
    fn test_failing_formatter_uses_fallback() {
        let mut selector = selector(FormattingConfig::default());
        selector.override_kind(FormatterKind::Structured, Arc::new(Failing));

        let rendered = selector.format(&entry_with(None), None);
        assert_eq!(rendered.outcome, RenderOutcome::Fallback);
        assert_eq!(rendered.text, "Method Foo.Bar - Status: True");
    }

    #[test]
    fn test_disabled_fallback_embeds_reason() {
        let config = FormattingConfig {
            fallback_enabled: false,
            ..FormattingConfig::default()
        };
        let mut selector = selector(config);
        selector.override_kind(FormatterKind::Structured, Arc::new(Failing));

        let rendered = selector.format(&entry_with(None), None);
        assert_eq!(rendered.outcome, RenderOutcome::Diagnostic);
        assert_eq!(rendered.text, "[Formatting Error: always fails]");
    }

    #[test]
    fn test_panicking_formatter_is_contained() {
        let mut selector = selector(FormattingConfig {
            fallback_enabled: false,
            ..FormattingConfig::default()
        });
        selector.override_kind(FormatterKind::Json, Arc::new(Panicking));

        let rendered = selector.format(&entry_with(None), Some(FormatterKind::Json));
        assert!(rendered.text.contains("formatter exploded"));
    }

    #[test]
    fn test_unknown_template_name_falls_back() {
        let rendered = selector(FormattingConfig::default()).format(&entry_with(Some("nope")), None);
        assert_eq!(rendered.outcome, RenderOutcome::Fallback);
        assert!(rendered.text.contains("Foo.Bar"));
    }

    #[test]
    fn test_registered_named_formatter() {
        let selector = selector(FormattingConfig {
            fallback_enabled: false,
            ..FormattingConfig::default()
        });
        selector.register_named("strict", Arc::new(Failing));
        let rendered = selector.format(&entry_with(Some("strict")), None);
        assert!(rendered.text.contains("always fails"));
    }
}
