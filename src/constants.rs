//! Application-wide constants
//!
//! Centralized defaults so config, pipeline and tests agree.

// =============================================================================
// Queue
// =============================================================================

/// Default bounded capacity of the background queue (entries)
pub const DEFAULT_QUEUE_CAPACITY: usize = 2000;

// =============================================================================
// Batching
// =============================================================================

/// Default number of entries that triggers a batch flush
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default time window before a partial batch is flushed (milliseconds)
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 1000;

// =============================================================================
// Lifecycle
// =============================================================================

/// Grace period for an in-flight batch during shutdown (milliseconds)
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 200;

// =============================================================================
// Formatting
// =============================================================================

/// Template used when the selected formatter fails
pub const DEFAULT_FALLBACK_TEMPLATE: &str = "Method {TypeName}.{MethodName} - Status: {Success}";

/// Placeholders every fallback template has to substitute
pub const FALLBACK_REQUIRED_PLACEHOLDERS: [&str; 3] = ["{TypeName}", "{MethodName}", "{Success}"];

/// Default custom template text
pub const DEFAULT_CUSTOM_TEMPLATE: &str =
    "{TypeName}.{MethodName} Success={Success} Duration={Duration}ms";

/// Default outcome template for successful calls
pub const DEFAULT_SUCCESS_TEMPLATE: &str = "{TypeName}.{MethodName} completed in {Duration}ms";

/// Default outcome template for failed calls
pub const DEFAULT_ERROR_TEMPLATE: &str =
    "{TypeName}.{MethodName} failed after {Duration}ms: {ExceptionType}: {ExceptionMessage}";

// =============================================================================
// Decisions
// =============================================================================

/// Constructor dependencies that mark a type as logging on its own
pub const DEFAULT_CAPTURE_DISABLING_DEPENDENCIES: &[&str] = &["ILogger"];

// =============================================================================
// File writer
// =============================================================================

/// Default rotation threshold for the file writer (bytes)
pub const DEFAULT_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of rotated files kept
pub const DEFAULT_FILE_MAX_FILES: usize = 5;

/// Default flush interval of the file writer thread (milliseconds)
pub const DEFAULT_FILE_FLUSH_INTERVAL_MS: u64 = 250;

/// Channel capacity between dispatcher and file writer thread
pub const FILE_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Diagnostics
// =============================================================================

/// Tracing target for pipeline diagnostics (never routed through the pipeline)
pub const DIAGNOSTICS_TARGET: &str = "interlog::diagnostics";
