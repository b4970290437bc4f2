//! Method interception
//!
//! Glue between a call site and the pipeline: resolve the decision before
//! the call, complete the entry after it, enqueue without blocking.
//! Nothing here can fail the intercepted call.

use crate::decision::{DecisionCache, InterceptionDecision, MethodHandle};
use crate::entry::{ErrorInfo, LogEntry, PendingEntry};
use crate::queue::BackgroundQueue;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

/// Producer-side handle; cheap to clone and share across threads
#[derive(Debug, Clone)]
pub struct MethodInterceptor {
    cache: Arc<DecisionCache>,
    queue: BackgroundQueue,
}

impl MethodInterceptor {
    pub fn new(cache: Arc<DecisionCache>, queue: BackgroundQueue) -> Self {
        Self { cache, queue }
    }

    pub fn resolve(&self, handle: &MethodHandle) -> Option<InterceptionDecision> {
        self.cache.resolve(handle)
    }

    /// Start an entry if `handle` is intercepted; `None` means "not logged"
    pub fn before(&self, handle: &MethodHandle, input: Option<Value>) -> Option<PendingEntry> {
        let decision = self.cache.resolve(handle)?;
        Some(PendingEntry::begin(
            handle.type_name.as_str(),
            handle.method_name(),
            &decision,
            input,
        ))
    }

    pub fn after_success(&self, pending: PendingEntry, started: Instant, output: Option<Value>) -> bool {
        self.enqueue(pending.complete_success(started.elapsed(), output))
    }

    pub fn after_failure(&self, pending: PendingEntry, started: Instant, error: ErrorInfo) -> bool {
        self.enqueue(pending.complete_failure(started.elapsed(), error))
    }

    /// Non-blocking; `false` when the entry was dropped
    pub fn enqueue(&self, entry: LogEntry) -> bool {
        self.queue.try_enqueue(entry)
    }

    /// Run `call` as an intercepted invocation of `handle`.
    ///
    /// `input` and the returned value are serialized only when the decision
    /// captures them. The call's result is returned untouched.
    pub fn invoke<I, T, E, F>(&self, handle: &MethodHandle, input: &I, call: F) -> Result<T, E>
    where
        I: Serialize + ?Sized,
        T: Serialize,
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        let Some(decision) = self.cache.resolve(handle) else {
            return call();
        };

        let input = decision
            .behavior
            .captures_input()
            .then(|| serde_json::to_value(input).ok())
            .flatten();
        let pending = PendingEntry::begin(
            handle.type_name.as_str(),
            handle.method_name(),
            &decision,
            input,
        );

        let started = Instant::now();
        let result = call();
        match &result {
            Ok(value) => {
                let output = if pending.wants_output() {
                    serde_json::to_value(value).ok()
                } else {
                    None
                };
                self.after_success(pending, started, output);
            }
            Err(error) => {
                self.after_failure(pending, started, ErrorInfo::from_error(error));
            }
        }
        result
    }
}
