//! Type and method descriptors
//!
//! Interception markers and method shapes are plain data here: a host
//! registers a `TypeDescriptor` per intercepted type once (by hand, from
//! generated code, or from a TOML manifest), and the decision cache reads
//! them instead of inspecting code at runtime.

use super::{CaptureBehavior, InterceptionDecision};
use crate::error::{PipelineError, Result};
use crate::level::Severity;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    #[default]
    Instance,
    Static,
    Constructor,
    /// Compiler-generated members: accessors, operators, event hooks
    Special,
}

/// Explicit per-method marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MethodAnnotation {
    /// Never log this method
    NoLog,
    /// Log with the given capture behavior
    Capture {
        behavior: CaptureBehavior,
        #[serde(default)]
        level: Option<Severity>,
        #[serde(default)]
        exception_level: Option<Severity>,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        template: Option<String>,
    },
}

impl MethodAnnotation {
    /// Shorthand for a capture marker with default severities
    pub fn capture(behavior: CaptureBehavior) -> Self {
        Self::Capture {
            behavior,
            level: None,
            exception_level: None,
            target: None,
            template: None,
        }
    }

    /// The decision this marker stands for (`None` for `NoLog`)
    pub fn decision(&self) -> Option<InterceptionDecision> {
        match self {
            Self::NoLog => None,
            Self::Capture {
                behavior,
                level,
                exception_level,
                target,
                template,
            } => {
                let auto = InterceptionDecision::auto();
                Some(InterceptionDecision {
                    behavior: *behavior,
                    level: level.unwrap_or(auto.level),
                    exception_level: exception_level.unwrap_or(auto.exception_level),
                    target: target.clone(),
                    template: template.clone(),
                })
            }
        }
    }
}

/// Method identity within a type: name plus parameter type names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSignature {
    pub name: String,
    pub parameters: Vec<String>,
}

impl MethodSignature {
    pub fn new<I, S>(name: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.parameters.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub kind: MethodKind,
    #[serde(default)]
    pub annotation: Option<MethodAnnotation>,
}

impl MethodDescriptor {
    /// Public instance method without parameters or annotation
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            visibility: Visibility::Public,
            kind: MethodKind::Instance,
            annotation: None,
        }
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_annotation(mut self, annotation: MethodAnnotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn with_kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn signature(&self) -> MethodSignature {
        MethodSignature::new(self.name.clone(), self.parameters.iter().cloned())
    }

    /// Only public instance methods are ever intercepted
    pub fn is_eligible(&self) -> bool {
        self.visibility == Visibility::Public && self.kind == MethodKind::Instance
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Fully qualified name, e.g. `MyApp.Services.OrderService`
    pub name: String,
    #[serde(default)]
    pub is_interface: bool,
    /// Interfaces this type implements
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Constructor parameter type names
    #[serde(default)]
    pub constructor_dependencies: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
}

impl TypeDescriptor {
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_interface: false,
            interfaces: Vec::new(),
            constructor_dependencies: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            is_interface: true,
            ..Self::class(name)
        }
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.constructor_dependencies.push(dependency.into());
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn find_method(&self, signature: &MethodSignature) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.name == signature.name && m.parameters == signature.parameters)
    }

    pub fn handle(&self, method: &MethodDescriptor) -> MethodHandle {
        MethodHandle::new(self.name.clone(), method.signature())
    }
}

/// Reference to one method of one registered type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    pub type_name: String,
    pub signature: MethodSignature,
}

impl MethodHandle {
    pub fn new(type_name: impl Into<String>, signature: MethodSignature) -> Self {
        Self {
            type_name: type_name.into(),
            signature,
        }
    }

    /// Handle for a parameterless method
    pub fn simple(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(type_name, MethodSignature::new(method, Vec::<String>::new()))
    }

    pub fn method_name(&self) -> &str {
        &self.signature.name
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.signature)
    }
}

/// TOML manifest listing type descriptors (`[[types]]` tables)
#[derive(Debug, Default, Deserialize)]
struct TypeManifest {
    #[serde(default)]
    types: Vec<TypeDescriptor>,
}

/// Concurrent table of known types, keyed by full type name
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: DashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: TypeDescriptor) {
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(type_name).map(|d| Arc::clone(d.value()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All registered types, sorted by name
    pub fn all(&self) -> Vec<Arc<TypeDescriptor>> {
        let mut all: Vec<_> = self.types.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Parse a `[[types]]` manifest
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let manifest: TypeManifest =
            toml::from_str(content).map_err(|e| PipelineError::ConfigParse {
                path: "<types>".into(),
                reason: e.to_string(),
            })?;
        let registry = Self::new();
        for descriptor in manifest.types {
            registry.register(descriptor);
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            PipelineError::ConfigParse { reason, .. } => PipelineError::ConfigParse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }
}
