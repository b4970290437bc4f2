//! Interlog - method-interception logging pipeline
//!
//! Call sites ask the [`decision::DecisionCache`] whether a method is logged,
//! build a [`entry::LogEntry`] around the call and hand it to a bounded
//! queue without blocking. One background task batches entries, formats
//! them and writes them to the configured targets.
//!
//! - `decision` - per-method interception decisions
//! - `entry` - log entries
//! - `queue` / `batch` - bounded queue and batch collector
//! - `service` - background consumer state machine
//! - `format` - formatter selection with fallback
//! - `writer` - target writers and dispatch
//! - `pipeline` - wires everything from a config

pub mod batch;
pub mod cli;
pub mod config;
pub mod constants;
pub mod decision;
pub mod entry;
pub mod error;
pub mod format;
pub mod interceptor;
pub mod level;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod stats;
pub mod writer;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use interceptor::MethodInterceptor;
pub use pipeline::LoggingPipeline;

/// Initialize tracing for the pipeline's own diagnostics
///
/// Call early in main() before any logging occurs.
/// Set `verbose` to true for debug-level output.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "warn" };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_file(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(tracing_subscriber::EnvFilter::new(level))
        .try_init();
}
