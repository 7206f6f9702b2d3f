use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::StreamFault;
use crate::types::{FaultInfo, NodePath};

/// Execution events emitted while a pipeline runs.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        job: String,
    },
    /// A node raised a fatal fault.
    NodeFaulted {
        fault: StreamFault,
    },
    /// A node redirected a row to its error stream.
    RowRedirected {
        node: NodePath,
        fault: FaultInfo,
    },
    RunCancelled {
        job: String,
    },
    RunFinished {
        job: String,
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Forwards execution events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted { job } => info!(%job, "run started"),
            ExecutionEvent::NodeFaulted { fault } => {
                error!(node = %fault.node, fault = %fault.fault, "node faulted")
            }
            ExecutionEvent::RowRedirected { node, fault } => {
                warn!(%node, %fault, "row redirected")
            }
            ExecutionEvent::RunCancelled { job } => warn!(%job, "run cancelled"),
            ExecutionEvent::RunFinished {
                job,
                elapsed,
                metrics,
            } => info!(%job, ?elapsed, %metrics, "run finished"),
        }
    }
}

/// Fans events out to a list of observers.
#[derive(Default)]
pub struct CompositeExecutionObserver {
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl CompositeExecutionObserver {
    pub fn new(observers: Vec<Arc<dyn ExecutionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeExecutionObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeExecutionObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ExecutionObserver for CompositeExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Real-time counters for a pipeline run.
///
/// Updated by the driver and the nodes as values flow; callers can snapshot them at any time,
/// including from another thread.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    rows_pushed: AtomicU64,
    rows_redirected: AtomicU64,
    fatal_faults: AtomicU64,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            rows_pushed: AtomicU64::new(0),
            rows_redirected: AtomicU64::new(0),
            fatal_faults: AtomicU64::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.rows_pushed.store(0, Ordering::SeqCst);
        self.rows_redirected.store(0, Ordering::SeqCst);
        self.fatal_faults.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    /// Time since the current run started, if one has started.
    pub fn running_for(&self) -> Option<Duration> {
        let started_at = *self.started_at.lock().unwrap_or_else(PoisonError::into_inner);
        started_at.map(|started| started.elapsed())
    }

    pub fn on_row_pushed(&self) {
        let _ = self.rows_pushed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_row_redirected(&self) {
        let _ = self.rows_redirected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_fatal_fault(&self) {
        let _ = self.fatal_faults.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            rows_pushed: self.rows_pushed.load(Ordering::SeqCst),
            rows_redirected: self.rows_redirected.load(Ordering::SeqCst),
            fatal_faults: self.fatal_faults.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    /// `None` until the run has finished.
    pub elapsed: Option<Duration>,
    /// Values pushed by the sources into root streams.
    pub rows_pushed: u64,
    pub rows_redirected: u64,
    pub fatal_faults: u64,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows_pushed={}, rows_redirected={}, fatal_faults={}, elapsed={:?}",
            self.run_id, self.rows_pushed, self.rows_redirected, self.fatal_faults, self.elapsed
        )
    }
}
