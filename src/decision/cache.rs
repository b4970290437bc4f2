//! Per-type memoized interception decisions
//!
//! Resolution order for a method, first definitive answer wins:
//! 1. not eligible (non-public, static, constructor, special) -> none
//! 2. `NoLog` annotation -> none
//! 3. `Capture` annotation -> decision from the annotation
//! 4. cached per-type table
//! 5. configured rule (exact before prefix), exclusions, self-logging types
//! 6. interfaces only: decision of an already scanned implementation
//! 7. global auto-intercept default
//!
//! The first lookup of a type scans all its eligible methods in one pass.
//! Reads are lock-free per shard; concurrent scans of the same type compute
//! identical tables and the first insert wins.

use super::metadata::{MethodDescriptor, MethodHandle, MethodSignature, TypeDescriptor, TypeRegistry};
use super::pattern::{CompiledRule, RuleSet};
use super::{CaptureBehavior, InterceptionDecision};
use crate::config::PipelineConfig;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Cached outcome for one method
#[derive(Debug, Clone, PartialEq, Eq)]
enum CachedDecision {
    Resolved(Option<InterceptionDecision>),
    /// Interface method with no rule of its own; answered at lookup time
    ViaImplementation,
}

type TypeTable = HashMap<MethodSignature, CachedDecision>;

/// Decision inputs taken from config once
#[derive(Debug, Clone)]
struct Policy {
    rules: RuleSet,
    auto_intercept: bool,
    case_sensitive: bool,
    disabling_dependencies: Vec<String>,
}

impl Policy {
    fn from_config(config: &PipelineConfig) -> Self {
        Self {
            rules: RuleSet::new(&config.rules),
            auto_intercept: config.pipeline.auto_intercept,
            case_sensitive: config.pipeline.exclusion_case_sensitive,
            disabling_dependencies: config.pipeline.capture_disabling_dependencies.clone(),
        }
    }

    /// Constructor takes a logger of its own (`ILogger`, `ILogger<T>`)
    fn logs_itself(&self, ty: &TypeDescriptor) -> bool {
        ty.constructor_dependencies.iter().any(|dep| {
            self.disabling_dependencies.iter().any(|d| {
                dep == d || dep.strip_prefix(d.as_str()).is_some_and(|rest| rest.starts_with('<'))
            })
        })
    }

    fn global_default(&self, ty: &TypeDescriptor) -> Option<InterceptionDecision> {
        if self.auto_intercept && !self.logs_itself(ty) {
            Some(InterceptionDecision::auto())
        } else {
            None
        }
    }
}

/// Resolves and memoizes `InterceptionDecision`s per method
#[derive(Debug)]
pub struct DecisionCache {
    policy: Policy,
    types: Arc<TypeRegistry>,
    tables: DashMap<String, Arc<TypeTable>>,
    /// Interface method -> implementing method, filled when implementations are scanned
    implementations: DashMap<MethodHandle, MethodHandle>,
}

impl DecisionCache {
    pub fn new(config: &PipelineConfig, types: Arc<TypeRegistry>) -> Self {
        Self {
            policy: Policy::from_config(config),
            types,
            tables: DashMap::new(),
            implementations: DashMap::new(),
        }
    }

    /// Decide whether and how `handle` is logged. Never fails: anything
    /// unknown or ambiguous is "do not intercept".
    pub fn resolve(&self, handle: &MethodHandle) -> Option<InterceptionDecision> {
        let ty = self.types.get(&handle.type_name)?;
        let method = ty.find_method(&handle.signature)?;
        if !method.is_eligible() {
            return None;
        }
        if let Some(annotation) = &method.annotation {
            return annotation.decision();
        }

        let table = self.table_for(&ty);
        match table.get(&handle.signature)? {
            CachedDecision::Resolved(decision) => decision.clone(),
            CachedDecision::ViaImplementation => self
                .implementation_decision(handle)
                .unwrap_or_else(|| self.policy.global_default(&ty)),
        }
    }

    /// Number of types scanned so far
    pub fn cached_types(&self) -> usize {
        self.tables.len()
    }

    fn table_for(&self, ty: &TypeDescriptor) -> Arc<TypeTable> {
        if let Some(table) = self.tables.get(&ty.name) {
            return Arc::clone(table.value());
        }

        let table = Arc::new(self.scan(ty));
        if !ty.is_interface {
            self.map_interfaces(ty);
        }
        debug!("Scanned {} ({} methods)", ty.name, table.len());

        let entry = self
            .tables
            .entry(ty.name.clone())
            .or_insert_with(|| Arc::clone(&table));
        Arc::clone(entry.value())
    }

    /// Decide every eligible method of a type in one pass
    fn scan(&self, ty: &TypeDescriptor) -> TypeTable {
        let rule = self.policy.rules.find(&ty.name);
        ty.methods
            .iter()
            .filter(|m| m.is_eligible())
            .map(|m| (m.signature(), self.decide(ty, m, rule)))
            .collect()
    }

    fn decide(
        &self,
        ty: &TypeDescriptor,
        method: &MethodDescriptor,
        rule: Option<&CompiledRule>,
    ) -> CachedDecision {
        if let Some(annotation) = &method.annotation {
            return CachedDecision::Resolved(annotation.decision());
        }

        let Some(rule) = rule else {
            if ty.is_interface {
                return CachedDecision::ViaImplementation;
            }
            return CachedDecision::Resolved(self.policy.global_default(ty));
        };

        if rule.excludes(&method.name, self.policy.case_sensitive) || self.policy.logs_itself(ty) {
            return CachedDecision::Resolved(None);
        }

        let decision = CaptureBehavior::from_flags(rule.rule.log_input, rule.rule.log_output).map(
            |behavior| InterceptionDecision {
                behavior,
                level: rule.rule.level,
                exception_level: rule.rule.exception_level,
                target: rule.rule.target.clone(),
                template: rule.rule.template.clone(),
            },
        );
        CachedDecision::Resolved(decision)
    }

    /// Record which implementation method backs each interface method.
    ///
    /// Exact parameter types win; otherwise a unique method with the same
    /// name and arity is accepted.
    fn map_interfaces(&self, ty: &TypeDescriptor) {
        for interface_name in &ty.interfaces {
            let Some(interface) = self.types.get(interface_name) else {
                continue;
            };
            for iface_method in &interface.methods {
                let signature = iface_method.signature();
                let implementation = ty.find_method(&signature).or_else(|| {
                    let mut same_arity = ty.methods.iter().filter(|m| {
                        m.name == signature.name && m.parameters.len() == signature.arity()
                    });
                    match (same_arity.next(), same_arity.next()) {
                        (Some(only), None) => Some(only),
                        _ => None,
                    }
                });
                if let Some(implementation) = implementation {
                    self.implementations
                        .entry(MethodHandle::new(interface.name.clone(), signature))
                        .or_insert_with(|| ty.handle(implementation));
                }
            }
        }
    }

    /// Decision of the implementation behind an interface method, if that
    /// implementation has already been scanned
    fn implementation_decision(&self, handle: &MethodHandle) -> Option<Option<InterceptionDecision>> {
        let implementation = self.implementations.get(handle)?.value().clone();
        let ty = self.types.get(&implementation.type_name)?;
        let method = ty.find_method(&implementation.signature)?;
        if !method.is_eligible() {
            return Some(None);
        }
        if let Some(annotation) = &method.annotation {
            return Some(annotation.decision());
        }
        let table = self.tables.get(&implementation.type_name)?;
        match table.get(&implementation.signature)? {
            CachedDecision::Resolved(decision) => Some(decision.clone()),
            CachedDecision::ViaImplementation => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterceptionRule;
    use crate::decision::metadata::{MethodAnnotation, MethodKind, Visibility};
    use crate::level::Severity;

    fn registry(types: Vec<TypeDescriptor>) -> Arc<TypeRegistry> {
        let registry = TypeRegistry::new();
        for ty in types {
            registry.register(ty);
        }
        Arc::new(registry)
    }

    fn config_with_rules(rules: Vec<(&str, InterceptionRule)>) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        for (pattern, rule) in rules {
            config.rules.insert(pattern.to_string(), rule);
        }
        config
    }

    fn orders_type() -> TypeDescriptor {
        TypeDescriptor::class("Shop.Services.Orders")
            .method(MethodDescriptor::public("Place").with_parameters(["Order"]))
            .method(MethodDescriptor::public("GetOrder").with_parameters(["int"]))
            .method(MethodDescriptor::public("Cancel"))
    }

    // =========================================================================
    // Annotation tier
    // =========================================================================

    #[test]
    fn test_nolog_beats_matching_rule() {
        let ty = TypeDescriptor::class("Shop.Orders")
            .method(MethodDescriptor::public("Secret").with_annotation(MethodAnnotation::NoLog));
        let config = config_with_rules(vec![("Shop.Orders", InterceptionRule::default())]);
        let cache = DecisionCache::new(&config, registry(vec![ty]));

        assert_eq!(cache.resolve(&MethodHandle::simple("Shop.Orders", "Secret")), None);
    }

    #[test]
    fn test_capture_annotation_beats_rule() {
        let ty = TypeDescriptor::class("Shop.Orders").method(
            MethodDescriptor::public("Place").with_annotation(MethodAnnotation::Capture {
                behavior: CaptureBehavior::Both,
                level: Some(Severity::Warn),
                exception_level: None,
                target: Some("audit".into()),
                template: None,
            }),
        );
        let config = config_with_rules(vec![(
            "Shop.Orders",
            InterceptionRule {
                exclude_methods: vec!["Place".into()],
                ..Default::default()
            },
        )]);
        let cache = DecisionCache::new(&config, registry(vec![ty]));

        let decision = cache.resolve(&MethodHandle::simple("Shop.Orders", "Place")).unwrap();
        assert_eq!(decision.behavior, CaptureBehavior::Both);
        assert_eq!(decision.level, Severity::Warn);
        assert_eq!(decision.exception_level, Severity::Error);
        assert_eq!(decision.target.as_deref(), Some("audit"));
    }

    // =========================================================================
    // Rule tier
    // =========================================================================

    #[test]
    fn test_exact_rule_wins_over_wildcard() {
        let config = config_with_rules(vec![
            (
                "Shop.Services.*",
                InterceptionRule {
                    level: Severity::Debug,
                    ..Default::default()
                },
            ),
            (
                "Shop.Services.Orders",
                InterceptionRule {
                    log_output: true,
                    level: Severity::Warn,
                    target: Some("file".into()),
                    ..Default::default()
                },
            ),
        ]);
        let cache = DecisionCache::new(&config, registry(vec![orders_type()]));

        let decision = cache.resolve(&MethodHandle::simple("Shop.Services.Orders", "Cancel")).unwrap();
        assert_eq!(decision.level, Severity::Warn);
        assert_eq!(decision.behavior, CaptureBehavior::Both);
        assert_eq!(decision.target.as_deref(), Some("file"));
    }

    #[test]
    fn test_exclusions_apply() {
        let config = config_with_rules(vec![(
            "Shop.Services.*",
            InterceptionRule {
                exclude_methods: vec!["Get*".into()],
                ..Default::default()
            },
        )]);
        let cache = DecisionCache::new(&config, registry(vec![orders_type()]));

        let get = MethodHandle::new("Shop.Services.Orders", MethodSignature::new("GetOrder", ["int"]));
        let place = MethodHandle::new("Shop.Services.Orders", MethodSignature::new("Place", ["Order"]));
        assert_eq!(cache.resolve(&get), None);
        assert!(cache.resolve(&place).is_some());
    }

    #[test]
    fn test_rule_without_capture_flags_disables() {
        let config = config_with_rules(vec![(
            "Shop.Services.Orders",
            InterceptionRule {
                log_input: false,
                log_output: false,
                ..Default::default()
            },
        )]);
        let cache = DecisionCache::new(&config, registry(vec![orders_type()]));
        assert_eq!(cache.resolve(&MethodHandle::simple("Shop.Services.Orders", "Cancel")), None);
    }

    #[test]
    fn test_self_logging_type_is_skipped() {
        let ty = TypeDescriptor::class("Shop.Payments")
            .depends_on("ILogger<Payments>")
            .method(MethodDescriptor::public("Charge"));
        let config = config_with_rules(vec![("Shop.*", InterceptionRule::default())]);
        let cache = DecisionCache::new(&config, registry(vec![ty]));

        assert_eq!(cache.resolve(&MethodHandle::simple("Shop.Payments", "Charge")), None);
    }

    #[test]
    fn test_dependency_with_shared_prefix_does_not_disable() {
        let ty = TypeDescriptor::class("Shop.Payments")
            .depends_on("ILoggerFactoryOptions")
            .method(MethodDescriptor::public("Charge"));
        let config = config_with_rules(vec![("Shop.*", InterceptionRule::default())]);
        let cache = DecisionCache::new(&config, registry(vec![ty]));

        assert!(cache.resolve(&MethodHandle::simple("Shop.Payments", "Charge")).is_some());
    }

    // =========================================================================
    // Global default tier
    // =========================================================================

    #[test]
    fn test_global_default() {
        let mut config = PipelineConfig::default();
        let types = registry(vec![orders_type()]);
        let handle = MethodHandle::simple("Shop.Services.Orders", "Cancel");

        assert_eq!(DecisionCache::new(&config, types.clone()).resolve(&handle), None);

        config.pipeline.auto_intercept = true;
        let decision = DecisionCache::new(&config, types).resolve(&handle).unwrap();
        assert_eq!(decision, InterceptionDecision::auto());
    }

    // =========================================================================
    // Eligibility and caching
    // =========================================================================

    #[test]
    fn test_ineligible_methods_never_intercepted() {
        let ty = TypeDescriptor::class("Shop.Orders")
            .method(
                MethodDescriptor::public("Build")
                    .with_kind(MethodKind::Static)
                    .with_annotation(MethodAnnotation::capture(CaptureBehavior::Both)),
            )
            .method(MethodDescriptor::public("Hidden").with_visibility(Visibility::Internal));
        let mut config = PipelineConfig::default();
        config.pipeline.auto_intercept = true;
        let cache = DecisionCache::new(&config, registry(vec![ty]));

        assert_eq!(cache.resolve(&MethodHandle::simple("Shop.Orders", "Build")), None);
        assert_eq!(cache.resolve(&MethodHandle::simple("Shop.Orders", "Hidden")), None);
        assert_eq!(cache.resolve(&MethodHandle::simple("Unknown.Type", "Run")), None);
        assert_eq!(cache.resolve(&MethodHandle::simple("Shop.Orders", "Missing")), None);
    }

    #[test]
    fn test_type_scanned_once() {
        let config = config_with_rules(vec![("Shop.*", InterceptionRule::default())]);
        let cache = DecisionCache::new(&config, registry(vec![orders_type()]));

        let first = cache.resolve(&MethodHandle::simple("Shop.Services.Orders", "Cancel"));
        assert_eq!(cache.cached_types(), 1);
        let again = cache.resolve(&MethodHandle::simple("Shop.Services.Orders", "Cancel"));
        let sibling = cache.resolve(&MethodHandle::new(
            "Shop.Services.Orders",
            MethodSignature::new("Place", ["Order"]),
        ));
        assert_eq!(cache.cached_types(), 1);
        assert_eq!(first, again);
        assert!(sibling.is_some());
    }

    #[test]
    fn test_concurrent_resolution_converges() {
        let config = config_with_rules(vec![("Shop.*", InterceptionRule::default())]);
        let cache = Arc::new(DecisionCache::new(&config, registry(vec![orders_type()])));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.resolve(&MethodHandle::simple("Shop.Services.Orders", "Cancel"))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.iter().all(|r| r == &results[0]));
        assert_eq!(cache.cached_types(), 1);
    }

    // =========================================================================
    // Interface tier
    // =========================================================================

    fn interface_pair() -> Vec<TypeDescriptor> {
        vec![
            TypeDescriptor::interface("Shop.IOrders")
                .method(MethodDescriptor::public("Place").with_parameters(["Order"])),
            TypeDescriptor::class("Shop.Impl.Orders")
                .implements("Shop.IOrders")
                .method(MethodDescriptor::public("Place").with_parameters(["Order"])),
        ]
    }

    #[test]
    fn test_interface_uses_scanned_implementation() {
        let config = config_with_rules(vec![(
            "Shop.Impl.*",
            InterceptionRule {
                level: Severity::Warn,
                ..Default::default()
            },
        )]);
        let cache = DecisionCache::new(&config, registry(interface_pair()));
        let iface = MethodHandle::new("Shop.IOrders", MethodSignature::new("Place", ["Order"]));
        let imp = MethodHandle::new("Shop.Impl.Orders", MethodSignature::new("Place", ["Order"]));

        // Implementation not scanned yet: global default (off)
        assert_eq!(cache.resolve(&iface), None);

        let direct = cache.resolve(&imp).unwrap();
        assert_eq!(direct.level, Severity::Warn);
        assert_eq!(cache.resolve(&iface), Some(direct));
    }

    #[test]
    fn test_interface_rule_is_direct() {
        let config = config_with_rules(vec![(
            "Shop.IOrders",
            InterceptionRule {
                level: Severity::Critical,
                ..Default::default()
            },
        )]);
        let cache = DecisionCache::new(&config, registry(interface_pair()));
        let iface = MethodHandle::new("Shop.IOrders", MethodSignature::new("Place", ["Order"]));

        assert_eq!(cache.resolve(&iface).unwrap().level, Severity::Critical);
    }

    #[test]
    fn test_interface_matches_by_arity() {
        let types = vec![
            TypeDescriptor::interface("Shop.IOrders")
                .method(MethodDescriptor::public("Place").with_parameters(["T"])),
            TypeDescriptor::class("Shop.Orders")
                .implements("Shop.IOrders")
                .method(MethodDescriptor::public("Place").with_parameters(["Order"])),
        ];
        let config = config_with_rules(vec![("Shop.Orders", InterceptionRule::default())]);
        let cache = DecisionCache::new(&config, registry(types));

        let imp = MethodHandle::new("Shop.Orders", MethodSignature::new("Place", ["Order"]));
        let iface = MethodHandle::new("Shop.IOrders", MethodSignature::new("Place", ["T"]));
        let direct = cache.resolve(&imp);
        assert!(direct.is_some());
        assert_eq!(cache.resolve(&iface), direct);
    }
}
