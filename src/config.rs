//! Configuration management
//!
//! The pipeline is configured from a single TOML file. Every section is
//! `#[serde(default)]`, so a partial file only overrides what it names.
//! Rules and targets are read-only once loaded.

use crate::constants::{
    DEFAULT_BATCH_TIMEOUT_MS, DEFAULT_CAPTURE_DISABLING_DEPENDENCIES, DEFAULT_CUSTOM_TEMPLATE,
    DEFAULT_ERROR_TEMPLATE, DEFAULT_FALLBACK_TEMPLATE, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_SUCCESS_TEMPLATE,
    FALLBACK_REQUIRED_PLACEHOLDERS,
};
use crate::error::{PipelineError, Result};
use crate::format::FormatterKind;
use crate::level::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

// =============================================================================
// Root
// =============================================================================

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline: PipelineSettings,
    pub formatting: FormattingConfig,
    /// Type-name pattern -> rule
    pub rules: BTreeMap<String, InterceptionRule>,
    /// Target name -> definition
    pub targets: BTreeMap<String, TargetDefinition>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert("console".to_string(), TargetDefinition::default());
        Self {
            pipeline: PipelineSettings::default(),
            formatting: FormattingConfig::default(),
            rules: BTreeMap::new(),
            targets,
        }
    }
}

// =============================================================================
// Pipeline settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Log methods that no rule or annotation covers
    pub auto_intercept: bool,
    /// Bounded capacity of the background queue
    pub queue_capacity: usize,
    /// Entries per batch
    pub max_batch_size: usize,
    /// Partial batch flush window (milliseconds)
    pub batch_timeout_ms: u64,
    /// Time allowed for an in-flight batch at shutdown (milliseconds)
    pub shutdown_grace_ms: u64,
    /// Target used when an entry carries no explicit target
    pub default_target: Option<String>,
    /// Whether method-exclusion patterns compare case-sensitively
    pub exclusion_case_sensitive: bool,
    /// Types whose constructor takes one of these already log on their own
    pub capture_disabling_dependencies: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            auto_intercept: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_timeout_ms: DEFAULT_BATCH_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            default_target: Some("console".to_string()),
            exclusion_case_sensitive: true,
            capture_disabling_dependencies: DEFAULT_CAPTURE_DISABLING_DEPENDENCIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl PipelineSettings {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// =============================================================================
// Formatting
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingConfig {
    /// Formatter used when neither the entry nor its target picks one
    pub default_kind: FormatterKind,
    /// Render the fallback template when the selected formatter fails
    pub fallback_enabled: bool,
    pub fallback_template: String,
    /// Template for `FormatterKind::Custom`
    pub custom_template: String,
    /// Templates for `FormatterKind::Outcome`
    pub success_template: String,
    pub error_template: String,
    /// Named templates selectable per entry
    pub templates: BTreeMap<String, String>,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            default_kind: FormatterKind::Structured,
            fallback_enabled: true,
            fallback_template: DEFAULT_FALLBACK_TEMPLATE.to_string(),
            custom_template: DEFAULT_CUSTOM_TEMPLATE.to_string(),
            success_template: DEFAULT_SUCCESS_TEMPLATE.to_string(),
            error_template: DEFAULT_ERROR_TEMPLATE.to_string(),
            templates: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Interception rule for types matching a name pattern
///
/// The pattern (map key) is either an exact type name or a namespace
/// prefix ending in `*` (e.g. `MyApp.Services.*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptionRule {
    pub log_input: bool,
    pub log_output: bool,
    pub level: Severity,
    pub exception_level: Severity,
    pub target: Option<String>,
    pub template: Option<String>,
    /// Method names to skip: `Name`, `Prefix*`, `*Suffix` or `*Contains*`
    pub exclude_methods: Vec<String>,
}

impl Default for InterceptionRule {
    fn default() -> Self {
        Self {
            log_input: true,
            log_output: false,
            level: Severity::Info,
            exception_level: Severity::Error,
            target: None,
            template: None,
            exclude_methods: Vec::new(),
        }
    }
}

// =============================================================================
// Targets
// =============================================================================

/// Named output target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetDefinition {
    /// Writer kind, resolved through the writer registry (`console`, `file`, `memory`)
    pub kind: String,
    pub enabled: bool,
    /// Minimum admitted severity
    pub min_level: Severity,
    /// Formatter override for entries routed here
    pub formatter: Option<FormatterKind>,
    /// Kind-specific settings
    pub properties: BTreeMap<String, String>,
}

impl Default for TargetDefinition {
    fn default() -> Self {
        Self {
            kind: "console".to_string(),
            enabled: true,
            min_level: Severity::Info,
            formatter: None,
            properties: BTreeMap::new(),
        }
    }
}

impl TargetDefinition {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Parse a property, falling back to `default` when absent.
    pub fn parsed_property<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.property(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| PipelineError::ConfigValidation {
                field: format!("targets.properties.{}", key),
                reason: format!("cannot parse '{}'", raw),
            }),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

impl PipelineConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.queue_capacity == 0 {
            return Err(invalid("pipeline.queue_capacity", "must be greater than zero"));
        }
        if p.max_batch_size == 0 {
            return Err(invalid("pipeline.max_batch_size", "must be greater than zero"));
        }
        if p.batch_timeout_ms == 0 {
            return Err(invalid("pipeline.batch_timeout_ms", "must be greater than zero"));
        }
        let fallback = &self.formatting.fallback_template;
        if fallback.trim().is_empty() {
            return Err(invalid("formatting.fallback_template", "must not be empty"));
        }
        for required in FALLBACK_REQUIRED_PLACEHOLDERS {
            if !fallback.contains(required) {
                return Err(invalid(
                    "formatting.fallback_template",
                    &format!("must contain {}", required),
                ));
            }
        }

        for pattern in self.rules.keys() {
            validate_type_pattern(pattern)?;
        }

        for (name, target) in &self.targets {
            if target.kind.trim().is_empty() {
                return Err(invalid(&format!("targets.{}.kind", name), "must not be empty"));
            }
        }

        if let Some(default) = &p.default_target {
            if !self.targets.contains_key(default) {
                warn!(
                    "default_target '{}' is not a configured target, entries fall back to type name routing",
                    default
                );
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> PipelineError {
    PipelineError::ConfigValidation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// A type pattern is an exact name or a prefix with a single trailing `*`
fn validate_type_pattern(pattern: &str) -> Result<()> {
    let field = format!("rules.\"{}\"", pattern);
    if pattern.trim().is_empty() {
        return Err(invalid(&field, "pattern must not be empty"));
    }
    let stars = pattern.matches('*').count();
    if stars > 1 || (stars == 1 && !pattern.ends_with('*')) {
        return Err(invalid(&field, "wildcard is only allowed as a trailing '*'"));
    }
    Ok(())
}

// =============================================================================
// Loading
// =============================================================================

/// Parse config from a TOML string and validate it
pub fn from_toml_str(content: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig =
        toml::from_str(content).map_err(|e| PipelineError::ConfigParse {
            path: "<inline>".into(),
            reason: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

/// Load and validate config from a file
pub fn load(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path).map_err(|e| PipelineError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: PipelineConfig =
        toml::from_str(&content).map_err(|e| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

/// Load config from file, using defaults when it is missing or broken
pub fn load_or_default(path: &Path) -> PipelineConfig {
    if !path.exists() {
        return PipelineConfig::default();
    }
    match load(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            PipelineConfig::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
