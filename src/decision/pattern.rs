//! Type-name rules and method-exclusion patterns

use crate::config::InterceptionRule;
use std::collections::{BTreeMap, HashMap};

/// Pattern matching a declaring type name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
    /// Whole type name
    Exact(String),
    /// Everything starting with the prefix (`MyApp.Services.*`, `*`)
    Prefix(String),
}

impl TypePattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            Self::Exact(name) => name == type_name,
            Self::Prefix(prefix) => type_name.starts_with(prefix.as_str()),
        }
    }
}

/// Method-name exclusion pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionPattern {
    /// `Name`
    Exact(String),
    /// `Prefix*`
    Prefix(String),
    /// `*Suffix`
    Suffix(String),
    /// `*Contains*`
    Contains(String),
}

impl ExclusionPattern {
    pub fn parse(pattern: &str) -> Self {
        let leading = pattern.starts_with('*');
        let trailing = pattern.len() > 1 && pattern.ends_with('*');
        match (leading, trailing) {
            (true, true) => Self::Contains(pattern[1..pattern.len() - 1].to_string()),
            (true, false) => Self::Suffix(pattern[1..].to_string()),
            (false, true) => Self::Prefix(pattern[..pattern.len() - 1].to_string()),
            (false, false) => Self::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, method_name: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            return self.matches_exactly(method_name, self.text());
        }
        let name = method_name.to_lowercase();
        let text = self.text().to_lowercase();
        self.matches_exactly(&name, &text)
    }

    fn text(&self) -> &str {
        match self {
            Self::Exact(s) | Self::Prefix(s) | Self::Suffix(s) | Self::Contains(s) => s,
        }
    }

    fn matches_exactly(&self, name: &str, text: &str) -> bool {
        match self {
            Self::Exact(_) => name == text,
            Self::Prefix(_) => name.starts_with(text),
            Self::Suffix(_) => name.ends_with(text),
            Self::Contains(_) => name.contains(text),
        }
    }
}

/// A rule with its exclusion patterns pre-parsed
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub pattern: String,
    pub rule: InterceptionRule,
    exclusions: Vec<ExclusionPattern>,
}

impl CompiledRule {
    fn new(pattern: &str, rule: &InterceptionRule) -> Self {
        Self {
            pattern: pattern.to_string(),
            exclusions: rule
                .exclude_methods
                .iter()
                .map(|p| ExclusionPattern::parse(p))
                .collect(),
            rule: rule.clone(),
        }
    }

    pub fn excludes(&self, method_name: &str, case_sensitive: bool) -> bool {
        self.exclusions
            .iter()
            .any(|p| p.matches(method_name, case_sensitive))
    }
}

/// Configured rules indexed for lookup by type name.
///
/// Exact patterns win over prefix patterns; among prefixes the longest wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    exact: HashMap<String, CompiledRule>,
    /// Sorted by prefix length, longest first
    prefixes: Vec<(String, CompiledRule)>,
}

impl RuleSet {
    pub fn new(rules: &BTreeMap<String, InterceptionRule>) -> Self {
        let mut set = Self::default();
        for (pattern, rule) in rules {
            let compiled = CompiledRule::new(pattern, rule);
            match TypePattern::parse(pattern) {
                TypePattern::Exact(name) => {
                    set.exact.insert(name, compiled);
                }
                TypePattern::Prefix(prefix) => set.prefixes.push((prefix, compiled)),
            }
        }
        set.prefixes
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        set
    }

    pub fn find(&self, type_name: &str) -> Option<&CompiledRule> {
        self.exact.get(type_name).or_else(|| {
            self.prefixes
                .iter()
                .find(|(prefix, _)| type_name.starts_with(prefix.as_str()))
                .map(|(_, rule)| rule)
        })
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
