//! Running pipelines.
//!
//! This module sits "above" [`crate::stream`] and [`crate::processing`] and provides:
//!
//! - [`Pipeline`]: the definition root and single-run driver
//! - [`ExecutionEngine`]: parallel, throttled execution of one pipeline per trigger value
//! - Real-time metrics, cancellation and observer hooks for monitoring

mod cancellation;
mod engine;
mod observer;
mod pipeline;
mod semaphore;

use std::fmt;
use std::sync::Arc;

pub use cancellation::CancellationToken;
pub use engine::{EngineOptions, ExecutionEngine, ProcessDefinition, RunReport};
pub use observer::{
    CompositeExecutionObserver, ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver,
    TracingExecutionObserver,
};
pub use pipeline::{ExecutionContext, IterSource, Pipeline, Source};

/// Options for a single [`Pipeline::run`].
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Receives lifecycle, fault and redirection events.
    pub observer: Option<Arc<dyn ExecutionObserver>>,
    /// Stop every source after the first fatal fault (default). When `false`, only the faulted
    /// branch terminates and the rest of the graph runs to completion.
    pub stop_on_first_fault: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            observer: None,
            stop_on_first_fault: true,
        }
    }
}

impl ExecutionOptions {
    /// Attach an observer for execution events.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("observer", &self.observer.as_ref().map(|_| "<observer>"))
            .field("stop_on_first_fault", &self.stop_on_first_fault)
            .finish()
    }
}
