//! Pipeline wiring
//!
//! Builds every component from one `PipelineConfig`:
//! decision cache, queue, formatter selector, writers, background service.

use crate::config::PipelineConfig;
use crate::constants::DIAGNOSTICS_TARGET;
use crate::decision::{DecisionCache, InterceptionDecision, MethodHandle, TypeRegistry};
use crate::entry::LogEntry;
use crate::error::Result;
use crate::format::FormatterSelector;
use crate::interceptor::MethodInterceptor;
use crate::queue;
use crate::service::{BackgroundService, EntryProcessor, ServiceSettings, ServiceState};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::writer::{LogDispatcher, WriterRegistry};
use std::sync::Arc;
use tracing::{info, warn};

/// A running logging pipeline
#[derive(Debug)]
pub struct LoggingPipeline {
    interceptor: MethodInterceptor,
    service: BackgroundService,
    stats: Arc<PipelineStats>,
}

impl LoggingPipeline {
    /// Build all components and start the consumer task on the current runtime
    pub fn start(
        config: &PipelineConfig,
        types: Arc<TypeRegistry>,
        writers: &WriterRegistry,
    ) -> Result<Self> {
        Self::start_with(config, types, writers, |_| {})
    }

    /// Like [`LoggingPipeline::start`], with a hook to customize formatters
    /// before the service takes ownership of them
    pub fn start_with<F>(
        config: &PipelineConfig,
        types: Arc<TypeRegistry>,
        writers: &WriterRegistry,
        customize: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut FormatterSelector),
    {
        config.validate()?;

        let stats = Arc::new(PipelineStats::new());
        let (queue, reader) = queue::channel(config.pipeline.queue_capacity, Arc::clone(&stats));

        let dispatcher = LogDispatcher::from_config(config, writers)?;
        if dispatcher.target_names().is_empty() {
            warn!(target: DIAGNOSTICS_TARGET, "No writable targets configured, entries will be unrouted");
        }
        let mut selector = FormatterSelector::new(&config.formatting);
        customize(&mut selector);

        let processor = EntryProcessor::new(selector, dispatcher, Arc::clone(&stats));
        let service = BackgroundService::new(
            reader,
            processor,
            ServiceSettings::from_config(&config.pipeline),
        );
        service.start()?;

        let cache = Arc::new(DecisionCache::new(config, types));
        info!(
            "Pipeline started (queue {}, batch {} / {}ms)",
            config.pipeline.queue_capacity,
            config.pipeline.max_batch_size,
            config.pipeline.batch_timeout_ms
        );

        Ok(Self {
            interceptor: MethodInterceptor::new(cache, queue),
            service,
            stats,
        })
    }

    /// Producer handle for call sites
    pub fn interceptor(&self) -> &MethodInterceptor {
        &self.interceptor
    }

    pub fn resolve(&self, handle: &MethodHandle) -> Option<InterceptionDecision> {
        self.interceptor.resolve(handle)
    }

    /// Enqueue a completed entry; `false` when it was dropped
    pub fn enqueue(&self, entry: LogEntry) -> bool {
        self.interceptor.enqueue(entry)
    }

    pub fn state(&self) -> ServiceState {
        self.service.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Drain and stop. Returns once every queued entry has been processed
    /// and the writers are flushed.
    pub async fn shutdown(self) -> Result<StatsSnapshot> {
        self.service.shutdown().await?;
        let snapshot = self.stats.snapshot();
        info!(
            "Pipeline stopped: {} processed, {} dropped, {} failed",
            snapshot.processed, snapshot.dropped, snapshot.failed
        );
        Ok(snapshot)
    }
}
