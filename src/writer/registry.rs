//! Target kind registry
//!
//! Maps a target `kind` string to the function that builds its writer.
//! Kinds that are not registered are simply unavailable: targets using them
//! are skipped with a warning instead of failing startup.

use super::{ConsoleWriter, FileWriter, LogWriter, MemoryWriter};
use crate::config::TargetDefinition;
use crate::constants::DIAGNOSTICS_TARGET;
use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Builds a writer for `(target name, definition)`
pub type WriterFactory =
    dyn Fn(&str, &TargetDefinition) -> Result<Arc<dyn LogWriter>> + Send + Sync;

pub struct WriterRegistry {
    factories: HashMap<String, Arc<WriterFactory>>,
}

impl fmt::Debug for WriterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("WriterRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for WriterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl WriterRegistry {
    /// Registry with no kinds
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// `console`, `file` and `memory`
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("console", |_, target| {
            Ok(Arc::new(ConsoleWriter::from_target(target)?) as Arc<dyn LogWriter>)
        });
        registry.register("file", |name, target| {
            Ok(Arc::new(FileWriter::from_target(name, target)?) as Arc<dyn LogWriter>)
        });
        registry.register("memory", |_, target| {
            Ok(Arc::new(MemoryWriter::from_target(target)) as Arc<dyn LogWriter>)
        });
        registry
    }

    /// Add or replace the factory for `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &TargetDefinition) -> Result<Arc<dyn LogWriter>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Build the writer for one target
    pub fn build(&self, name: &str, target: &TargetDefinition) -> Result<Arc<dyn LogWriter>> {
        let factory =
            self.factories
                .get(&target.kind)
                .ok_or_else(|| PipelineError::UnknownTargetKind {
                    target: name.to_string(),
                    kind: target.kind.clone(),
                })?;
        factory(name, target)
    }

    /// Build writers for every enabled target.
    ///
    /// Unknown kinds are skipped with a warning; construction errors of known
    /// kinds are returned.
    pub fn build_all<'a, I>(&self, targets: I) -> Result<Vec<(String, Arc<dyn LogWriter>)>>
    where
        I: IntoIterator<Item = (&'a String, &'a TargetDefinition)>,
    {
        let mut writers = Vec::new();
        for (name, target) in targets {
            if !target.enabled {
                continue;
            }
            match self.build(name, target) {
                Ok(writer) => writers.push((name.clone(), writer)),
                Err(e @ PipelineError::UnknownTargetKind { .. }) => {
                    warn!(target: DIAGNOSTICS_TARGET, "{}, target skipped", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(writers)
    }
}
