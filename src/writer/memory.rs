//! In-memory writer
//!
//! Keeps every admitted message. Clones share the same record buffer, so a
//! test or the demo command can hold one clone while the pipeline writes
//! through another.

use super::LogWriter;
use crate::config::TargetDefinition;
use crate::entry::ErrorInfo;
use crate::error::Result;
use crate::level::Severity;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One message as received by the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenRecord {
    pub severity: Severity,
    pub message: String,
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone)]
pub struct MemoryWriter {
    min_level: Severity,
    records: Arc<Mutex<Vec<WrittenRecord>>>,
    flushes: Arc<AtomicUsize>,
}

impl MemoryWriter {
    pub fn new(min_level: Severity) -> Self {
        Self {
            min_level,
            records: Arc::new(Mutex::new(Vec::new())),
            flushes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_target(target: &TargetDefinition) -> Self {
        Self::new(target.min_level)
    }

    /// Copy of everything written so far
    pub fn records(&self) -> Vec<WrittenRecord> {
        self.records.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times `flush` was called
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl LogWriter for MemoryWriter {
    fn is_enabled_for(&self, severity: Severity) -> bool {
        Severity::admits(self.min_level, severity)
    }

    fn write(&self, severity: Severity, message: &str, error: Option<&ErrorInfo>) -> Result<()> {
        self.records.lock().push(WrittenRecord {
            severity,
            message: message.to_string(),
            error: error.cloned(),
        });
        Ok(())
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_records() {
        let writer = MemoryWriter::new(Severity::Debug);
        let handle = writer.clone();

        writer
            .write(Severity::Error, "boom", Some(&ErrorInfo::new("Io", "disk")))
            .unwrap();
        writer.flush();

        assert_eq!(handle.len(), 1);
        assert_eq!(handle.messages(), vec!["boom"]);
        assert_eq!(handle.records()[0].error.as_ref().unwrap().type_name, "Io");
        assert_eq!(handle.flush_count(), 1);
    }

    #[test]
    fn test_admission() {
        let writer = MemoryWriter::new(Severity::Warn);
        assert!(!writer.is_enabled_for(Severity::Info));
        assert!(writer.is_enabled_for(Severity::Error));
    }
}
