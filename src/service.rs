//! Background processing service
//!
//! Lifecycle as an explicit state machine: `Created -> Running -> Draining -> Stopped`.
//!
//! A single consumer task reads the queue, batches entries and processes
//! each batch synchronously. On shutdown it stops reading, drains whatever
//! is still buffered one entry at a time, flushes the writers and stops.
//! Failures of single entries are reported on the diagnostics target and
//! never abort the batch; a fault of the task itself stops the service
//! without touching the host.

use crate::batch::BatchCollector;
use crate::constants::DIAGNOSTICS_TARGET;
use crate::entry::LogEntry;
use crate::error::{panic_message, PipelineError, Result};
use crate::format::{FormatterSelector, RenderOutcome};
use crate::queue::QueueReader;
use crate::stats::PipelineStats;
use crate::writer::{DispatchOutcome, LogDispatcher};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Service lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Running,
    Draining,
    Stopped,
}

/// Batching and shutdown parameters
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
    /// How long closing waits for an in-flight batch
    pub shutdown_grace: Duration,
}

impl ServiceSettings {
    pub fn from_config(settings: &crate::config::PipelineSettings) -> Self {
        Self {
            max_batch_size: settings.max_batch_size,
            batch_timeout: settings.batch_timeout(),
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

// =============================================================================
// Entry processing
// =============================================================================

/// Format + route + write for one entry
#[derive(Debug)]
pub struct EntryProcessor {
    selector: FormatterSelector,
    dispatcher: LogDispatcher,
    stats: Arc<PipelineStats>,
}

impl EntryProcessor {
    pub fn new(
        selector: FormatterSelector,
        dispatcher: LogDispatcher,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            selector,
            dispatcher,
            stats,
        }
    }

    pub fn dispatcher(&self) -> &LogDispatcher {
        &self.dispatcher
    }

    /// Process one entry. Filtering and missing targets are outcomes, not errors.
    pub fn process(&self, entry: &LogEntry) -> Result<DispatchOutcome> {
        let Some(target) = self.dispatcher.resolve_target(entry) else {
            self.stats.add_unrouted();
            debug!(
                target: DIAGNOSTICS_TARGET,
                "No target for {}.{}",
                entry.type_name(),
                entry.method_name()
            );
            return Ok(DispatchOutcome::Unrouted);
        };

        let severity = entry.effective_severity();
        if !self.dispatcher.is_enabled(target, severity) {
            self.stats.add_filtered();
            return Ok(DispatchOutcome::Filtered);
        }

        let rendered = self
            .selector
            .format(entry, self.dispatcher.formatter_for(target));
        if rendered.outcome != RenderOutcome::Primary {
            self.stats.add_fallback();
        }

        let outcome = self
            .dispatcher
            .write(target, severity, &rendered.text, entry.error())?;
        match outcome {
            DispatchOutcome::Written => self.stats.add_processed(),
            DispatchOutcome::Filtered => self.stats.add_filtered(),
            DispatchOutcome::Unrouted => self.stats.add_unrouted(),
        }
        Ok(outcome)
    }

    /// Process one entry, containing errors and panics
    fn process_contained(&self, entry: &LogEntry) {
        match catch_unwind(AssertUnwindSafe(|| self.process(entry))) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                self.stats.add_failed();
                warn!(
                    target: DIAGNOSTICS_TARGET,
                    "Dropping entry {} for {}.{}: {}",
                    entry.id(),
                    entry.type_name(),
                    entry.method_name(),
                    e
                );
            }
            Err(payload) => {
                self.stats.add_failed();
                error!(
                    target: DIAGNOSTICS_TARGET,
                    "Processing {}.{} panicked: {}",
                    entry.type_name(),
                    entry.method_name(),
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

// =============================================================================
// Processing gate
// =============================================================================

/// Serializes batch processing against shutdown.
///
/// Once closed, `enter` returns `None` and callers process unsynchronized.
#[derive(Debug, Default)]
struct ProcessingGate {
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl ProcessingGate {
    fn enter(&self) -> Option<MutexGuard<'_, ()>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let guard = self.lock.lock();
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        Some(guard)
    }

    /// Wait up to `grace` for an in-flight batch, then close.
    /// Closing an already closed gate is a no-op.
    ///
    /// Blocks the calling thread; never call it from an async task directly.
    fn close(&self, grace: Duration) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let guard = self.lock.try_lock_for(grace);
        if guard.is_none() {
            warn!(
                target: DIAGNOSTICS_TARGET,
                "In-flight batch still running after {:?}, closing anyway", grace
            );
        }
        self.closed.store(true, Ordering::Release);
    }

    /// Close without waiting
    fn seal(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug)]
struct Shared {
    state: RwLock<ServiceState>,
    processor: EntryProcessor,
    gate: ProcessingGate,
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
    finished: AtomicBool,
}

impl Shared {
    /// `Running -> Draining`; a stopped service stays stopped
    fn begin_draining(&self) {
        let mut state = self.state.write();
        if *state != ServiceState::Stopped {
            *state = ServiceState::Draining;
        }
    }

    fn process_batch(&self, batch: Vec<LogEntry>) {
        if batch.is_empty() {
            return;
        }
        self.stats.add_batch();
        // `None` once the gate is closed; the batch then runs unsynchronized
        let _guard = self.gate.enter();
        for entry in &batch {
            self.processor.process_contained(entry);
        }
    }

    /// Stop reading, process the partial batch and everything still buffered
    fn drain(&self, mut reader: QueueReader, mut collector: BatchCollector<LogEntry>) {
        self.begin_draining();
        reader.close();
        self.process_batch(collector.flush());

        let mut drained = 0usize;
        while let Some(entry) = reader.try_dequeue() {
            self.processor.process_contained(&entry);
            self.stats.add_drained();
            drained += 1;
        }
        debug!(target: DIAGNOSTICS_TARGET, "Drained {} queued entries", drained);
        self.finish();
    }

    /// Close the gate, flush writers, then enter `Stopped`. Idempotent.
    fn finish(&self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.gate.seal();
            self.processor.dispatcher().flush_all();
        }
        *self.state.write() = ServiceState::Stopped;
        debug!(target: DIAGNOSTICS_TARGET, "Background service stopped");
    }

    /// The consumer task is gone: stop without touching the writers again
    fn stop_after_fault(&self) {
        self.finished.store(true, Ordering::Release);
        self.gate.seal();
        *self.state.write() = ServiceState::Stopped;
    }
}

/// Owns the consumer task of one pipeline
#[derive(Debug)]
pub struct BackgroundService {
    shared: Arc<Shared>,
    settings: ServiceSettings,
    reader: Mutex<Option<QueueReader>>,
    supervisor: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl BackgroundService {
    pub fn new(reader: QueueReader, processor: EntryProcessor, settings: ServiceSettings) -> Self {
        let stats = Arc::clone(&processor.stats);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(ServiceState::Created),
                processor,
                gate: ProcessingGate::default(),
                cancel: CancellationToken::new(),
                stats,
                finished: AtomicBool::new(false),
            }),
            settings,
            reader: Mutex::new(Some(reader)),
            supervisor: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.shared.state.read()
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.shared.stats
    }

    /// Spawn the consumer task on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            PipelineError::ServiceFault {
                reason: e.to_string(),
            }
        })?;

        {
            let mut state = self.shared.state.write();
            if *state != ServiceState::Created {
                return Err(PipelineError::AlreadyStarted);
            }
            *state = ServiceState::Running;
        }
        let reader = self.reader.lock().take().ok_or(PipelineError::AlreadyStarted)?;
        let collector = BatchCollector::new(self.settings.max_batch_size, self.settings.batch_timeout);

        let consumer = runtime.spawn(run(Arc::clone(&self.shared), reader, collector));

        let shared = Arc::clone(&self.shared);
        let supervisor = runtime.spawn(async move {
            match consumer.await {
                Ok(()) => Ok(()),
                Err(e) => {
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic().as_ref())
                    } else {
                        "consumer task cancelled".to_string()
                    };
                    error!(target: DIAGNOSTICS_TARGET, "Background service faulted: {}", reason);
                    shared.stop_after_fault();
                    Err(PipelineError::ServiceFault { reason })
                }
            }
        });
        *self.supervisor.lock() = Some(supervisor);

        debug!(target: DIAGNOSTICS_TARGET, "Background service started");
        Ok(())
    }

    /// Signal the consumer to drain and stop. Safe to call at any time,
    /// including before `start` (the service then drains as soon as it starts).
    pub fn request_shutdown(&self) {
        self.shared.cancel.cancel();
    }

    /// Request shutdown, give an in-flight batch up to the grace period,
    /// then wait for the drain to finish and the service to stop.
    pub async fn shutdown(&self) -> Result<()> {
        self.request_shutdown();

        let shared = Arc::clone(&self.shared);
        let grace = self.settings.shutdown_grace;
        tokio::task::spawn_blocking(move || shared.gate.close(grace))
            .await
            .map_err(|e| PipelineError::ServiceFault {
                reason: e.to_string(),
            })?;

        self.await_stopped().await
    }

    /// Wait until the service is `Stopped`
    pub async fn await_stopped(&self) -> Result<()> {
        let supervisor = self.supervisor.lock().take();
        match supervisor {
            Some(handle) => handle.await.map_err(|e| PipelineError::ServiceFault {
                reason: e.to_string(),
            })?,
            None if self.state() == ServiceState::Created => Err(PipelineError::NotStarted),
            None => Ok(()),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(shared: Arc<Shared>, mut reader: QueueReader, mut collector: BatchCollector<LogEntry>) {
    loop {
        let deadline = collector.deadline();
        tokio::select! {
            biased;

            _ = shared.cancel.cancelled() => break,

            received = reader.recv() => match received {
                Some(entry) => {
                    if let (_, Some(batch)) = collector.try_add(entry) {
                        shared.process_batch(batch);
                    }
                }
                // Every producer is gone: emit the partial batch and stop
                None => {
                    shared.process_batch(collector.flush());
                    shared.finish();
                    return;
                }
            },

            _ = wait_until(deadline) => {
                if let Some(batch) = collector.take_expired() {
                    shared.process_batch(batch);
                }
            }
        }
    }

    shared.drain(reader, collector);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormattingConfig;
    use crate::decision::{CaptureBehavior, InterceptionDecision};
    use crate::entry::{ErrorInfo, PendingEntry};
    use crate::level::Severity;
    use crate::queue::{self, BackgroundQueue};
    use crate::writer::{LogWriter, MemoryWriter};
    use std::sync::atomic::AtomicUsize;

    /// Rejects messages mentioning "Poison", panics on "Explode"
    #[derive(Debug)]
    struct PickyWriter {
        inner: MemoryWriter,
    }

    impl PickyWriter {
        fn new() -> Self {
            Self {
                inner: MemoryWriter::new(Severity::Trace),
            }
        }
    }

    impl LogWriter for PickyWriter {
        fn is_enabled_for(&self, severity: Severity) -> bool {
            self.inner.is_enabled_for(severity)
        }

        fn write(&self, severity: Severity, message: &str, error: Option<&ErrorInfo>) -> Result<()> {
            if message.contains("Explode") {
                panic!("writer exploded");
            }
            if message.contains("Poison") {
                return Err(PipelineError::WriterRejected {
                    target: "picky".into(),
                    reason: "poisoned".into(),
                });
            }
            self.inner.write(severity, message, error)
        }

        fn flush(&self) {
            self.inner.flush();
        }
    }

    fn entry(method: &str) -> LogEntry {
        let decision = InterceptionDecision {
            behavior: CaptureBehavior::Input,
            level: Severity::Info,
            exception_level: Severity::Error,
            target: None,
            template: None,
        };
        PendingEntry::begin("Foo", method, &decision, None)
            .complete_success(Duration::from_millis(1), None)
    }

    fn settings(max_batch_size: usize, batch_timeout_ms: u64) -> ServiceSettings {
        ServiceSettings {
            max_batch_size,
            batch_timeout: Duration::from_millis(batch_timeout_ms),
            shutdown_grace: Duration::from_millis(200),
        }
    }

    fn service_with(
        writer: Arc<dyn LogWriter>,
        settings: ServiceSettings,
    ) -> (BackgroundService, BackgroundQueue, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::new());
        let (queue, reader) = queue::channel(64, Arc::clone(&stats));
        let mut dispatcher = LogDispatcher::new(Some("main".into()));
        dispatcher.add_target("main", writer, None);
        let processor = EntryProcessor::new(
            FormatterSelector::new(&FormattingConfig::default()),
            dispatcher,
            Arc::clone(&stats),
        );
        (BackgroundService::new(reader, processor, settings), queue, stats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_flushes_on_timeout() {
        let writer = MemoryWriter::new(Severity::Trace);
        let (service, queue, stats) = service_with(Arc::new(writer.clone()), settings(5, 200));
        service.start().unwrap();

        for method in ["A", "B", "C"] {
            assert!(queue.try_enqueue(entry(method)));
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(writer.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(writer.len(), 3);
        assert_eq!(stats.snapshot().batches, 1);

        service.request_shutdown();
        service.await_stopped().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_processed_without_waiting() {
        let writer = MemoryWriter::new(Severity::Trace);
        let (service, queue, stats) = service_with(Arc::new(writer.clone()), settings(2, 10_000));
        service.start().unwrap();

        queue.try_enqueue(entry("A"));
        queue.try_enqueue(entry("B"));
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(writer.len(), 2);
        assert_eq!(stats.snapshot().batches, 1);

        service.request_shutdown();
        service.await_stopped().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_start_drains_everything() {
        let writer = MemoryWriter::new(Severity::Trace);
        let (service, queue, stats) = service_with(Arc::new(writer.clone()), settings(100, 1000));

        for i in 0..10 {
            assert!(queue.try_enqueue(entry(&format!("M{}", i))));
        }
        service.request_shutdown();
        service.start().unwrap();
        service.await_stopped().await.unwrap();

        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(writer.len(), 10);
        let snap = stats.snapshot();
        assert_eq!(snap.drained, 10);
        assert_eq!(snap.processed, 10);
        assert!(writer.flush_count() >= 1);
        // The queue refuses entries once drained
        assert!(!queue.try_enqueue(entry("late")));
    }

    #[tokio::test]
    async fn test_failing_entries_do_not_abort_batch() {
        let writer = Arc::new(PickyWriter::new());
        let (service, queue, stats) = service_with(writer.clone(), settings(4, 1000));

        for method in ["Ok1", "Poison", "Explode", "Ok2"] {
            queue.try_enqueue(entry(method));
        }
        service.start().unwrap();
        service.request_shutdown();
        service.await_stopped().await.unwrap();

        let messages = writer.inner.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Foo.Ok1"));
        assert!(messages[1].contains("Foo.Ok2"));
        let snap = stats.snapshot();
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.processed, 2);
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let (service, _queue, _stats) =
            service_with(Arc::new(MemoryWriter::new(Severity::Trace)), settings(10, 100));

        assert!(matches!(
            service.await_stopped().await,
            Err(PipelineError::NotStarted)
        ));
        assert_eq!(service.state(), ServiceState::Created);

        service.start().unwrap();
        assert!(matches!(service.start(), Err(PipelineError::AlreadyStarted)));

        service.request_shutdown();
        service.await_stopped().await.unwrap();
        // Second wait is a no-op
        service.await_stopped().await.unwrap();
        assert!(matches!(service.start(), Err(PipelineError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_filtered_and_unrouted_are_counted() {
        let stats = Arc::new(PipelineStats::new());
        let mut dispatcher = LogDispatcher::new(None);
        dispatcher.add_target("Foo", Arc::new(MemoryWriter::new(Severity::Warn)), None);
        let processor = EntryProcessor::new(
            FormatterSelector::new(&FormattingConfig::default()),
            dispatcher,
            Arc::clone(&stats),
        );

        assert_eq!(processor.process(&entry("Quiet")).unwrap(), DispatchOutcome::Filtered);

        let decision = InterceptionDecision::auto();
        let other = PendingEntry::begin("Bar", "Run", &decision, None)
            .complete_success(Duration::ZERO, None);
        assert_eq!(processor.process(&other).unwrap(), DispatchOutcome::Unrouted);

        let snap = stats.snapshot();
        assert_eq!(snap.filtered, 1);
        assert_eq!(snap.unrouted, 1);
    }

    /// Takes `delay` per write and counts writes that land after a flush
    #[derive(Debug)]
    struct SlowWriter {
        inner: MemoryWriter,
        delay: Duration,
        flushed: AtomicBool,
        late_writes: AtomicUsize,
    }

    impl SlowWriter {
        fn new(delay: Duration) -> Self {
            Self {
                inner: MemoryWriter::new(Severity::Trace),
                delay,
                flushed: AtomicBool::new(false),
                late_writes: AtomicUsize::new(0),
            }
        }
    }

    impl LogWriter for SlowWriter {
        fn is_enabled_for(&self, severity: Severity) -> bool {
            self.inner.is_enabled_for(severity)
        }

        fn write(&self, severity: Severity, message: &str, error: Option<&ErrorInfo>) -> Result<()> {
            std::thread::sleep(self.delay);
            if self.flushed.load(Ordering::SeqCst) {
                self.late_writes.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.write(severity, message, error)
        }

        fn flush(&self) {
            self.flushed.store(true, Ordering::SeqCst);
            self.inner.flush();
        }
    }

    #[derive(Debug)]
    struct FlushPanics {
        inner: MemoryWriter,
    }

    impl LogWriter for FlushPanics {
        fn is_enabled_for(&self, severity: Severity) -> bool {
            self.inner.is_enabled_for(severity)
        }

        fn write(&self, severity: Severity, message: &str, error: Option<&ErrorInfo>) -> Result<()> {
            self.inner.write(severity, message, error)
        }

        fn flush(&self) {
            panic!("flush exploded");
        }
    }

    #[tokio::test]
    async fn test_slow_drain_finishes_before_stopped() {
        let writer = Arc::new(SlowWriter::new(Duration::from_millis(40)));
        let (service, queue, stats) = service_with(writer.clone(), settings(100, 60_000));
        service.start().unwrap();

        for i in 0..10 {
            assert!(queue.try_enqueue(entry(&format!("M{}", i))));
        }
        // The drain takes ~400ms, twice the grace period
        service.shutdown().await.unwrap();

        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(writer.inner.len(), 10);
        assert_eq!(writer.inner.flush_count(), 1);
        assert_eq!(writer.late_writes.load(Ordering::SeqCst), 0);
        let snap = stats.snapshot();
        assert_eq!(snap.drained, 10);
        assert_eq!(snap.processed, 10);
    }

    #[tokio::test]
    async fn test_stopped_never_goes_back_to_draining() {
        let (service, _queue, _stats) =
            service_with(Arc::new(MemoryWriter::new(Severity::Trace)), settings(10, 100));
        service.start().unwrap();
        service.shutdown().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);

        service.shared.begin_draining();
        assert_eq!(service.state(), ServiceState::Stopped);
        // A second shutdown is a no-op
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_panic_stops_service_with_fault() {
        let writer = Arc::new(FlushPanics {
            inner: MemoryWriter::new(Severity::Trace),
        });
        let (service, queue, stats) = service_with(writer.clone(), settings(10, 1000));
        service.start().unwrap();
        queue.try_enqueue(entry("A"));

        match service.shutdown().await {
            Err(PipelineError::ServiceFault { reason }) => {
                assert!(reason.contains("flush exploded"), "{}", reason)
            }
            other => panic!("expected ServiceFault, got {:?}", other),
        }
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(writer.inner.len(), 1);
        assert_eq!(stats.snapshot().processed, 1);

        // The host runtime keeps working
        assert_eq!(tokio::spawn(async { 7 }).await.unwrap(), 7);
    }

    #[test]
    fn test_sealed_gate_refuses_entry() {
        let gate = ProcessingGate::default();
        gate.seal();
        assert!(gate.is_closed());
        assert!(gate.enter().is_none());
    }

    #[test]
    fn test_closed_gate_falls_back_to_unsynchronized() {
        let gate = ProcessingGate::default();
        assert!(gate.enter().is_some());

        gate.close(Duration::from_millis(10));
        assert!(gate.is_closed());
        assert!(gate.enter().is_none());
        // Closing twice is harmless
        gate.close(Duration::from_millis(10));
    }

    #[test]
    fn test_start_outside_runtime_faults() {
        let (service, _queue, _stats) =
            service_with(Arc::new(MemoryWriter::new(Severity::Trace)), settings(10, 100));
        assert!(matches!(service.start(), Err(PipelineError::ServiceFault { .. })));
        assert_eq!(service.state(), ServiceState::Created);
    }
}
