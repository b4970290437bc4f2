//! Log writers
//!
//! A writer is the concrete sink behind a named target. Writers speak their
//! own native level set; [`crate::level::NativeLevel`] translates the
//! pipeline's `Severity` into it and back without loss.
//!
//! - `console` - stdout, stderr for error and above
//! - `file` - dedicated writer thread, buffered, rotating
//! - `memory` - keeps records in memory
//!
//! Kinds are wired by [`WriterRegistry`]; [`LogDispatcher`] routes entries
//! to targets.

pub mod console;
pub mod dispatch;
pub mod file;
pub mod memory;
pub mod registry;

pub use console::{ConsoleLevel, ConsoleWriter};
pub use dispatch::{DispatchOutcome, LogDispatcher};
pub use file::{FileLevel, FileWriter, FileWriterConfig};
pub use memory::{MemoryWriter, WrittenRecord};
pub use registry::WriterRegistry;

use crate::entry::ErrorInfo;
use crate::error::Result;
use crate::level::Severity;
use std::fmt;

/// Sink for formatted messages
pub trait LogWriter: Send + Sync + fmt::Debug {
    /// Whether a message at `severity` would be emitted
    fn is_enabled_for(&self, severity: Severity) -> bool;

    /// Emit one message. Must not block on a slow sink.
    fn write(&self, severity: Severity, message: &str, error: Option<&ErrorInfo>) -> Result<()>;

    /// Push buffered output to the sink
    fn flush(&self) {}
}
