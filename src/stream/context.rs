use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{EtlError, EtlResult, StreamFault};
use crate::execution::{CancellationToken, ExecutionEvent, ExecutionMetrics, ExecutionObserver};
use crate::types::{FaultInfo, NodePath};

use super::node::NodeKind;

/// State shared by every stream and node of one pipeline definition.
///
/// Holds the node-name registry, the first fatal fault of the current run, the cancellation
/// token and the run's metrics/observer. Cloning is cheap (reference counted); the context is
/// confined to the thread that defines and drives the pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    inner: Rc<ContextInner>,
}

struct ContextInner {
    job_name: String,
    nodes: RefCell<HashSet<NodePath>>,
    first_fault: RefCell<Option<StreamFault>>,
    stop_on_first_fault: Cell<bool>,
    cancellation: CancellationToken,
    metrics: Arc<ExecutionMetrics>,
    observer: RefCell<Option<Arc<dyn ExecutionObserver>>>,
}

impl PipelineContext {
    pub(crate) fn new(job_name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                job_name: job_name.into(),
                nodes: RefCell::new(HashSet::new()),
                first_fault: RefCell::new(None),
                stop_on_first_fault: Cell::new(true),
                cancellation: CancellationToken::new(),
                metrics: Arc::new(ExecutionMetrics::new()),
                observer: RefCell::new(None),
            }),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.inner.job_name
    }

    /// Reserve `path` for a node of the given kind.
    ///
    /// Fails with [`EtlError::NameConflict`] if a sibling already uses the same name.
    pub fn register_node(&self, path: &NodePath, kind: NodeKind) -> EtlResult<()> {
        if !self.inner.nodes.borrow_mut().insert(path.clone()) {
            return Err(EtlError::NameConflict { path: path.clone() });
        }
        debug!(job = %self.inner.job_name, node = %path, ?kind, "node defined");
        Ok(())
    }

    pub fn is_registered(&self, path: &NodePath) -> bool {
        self.inner.nodes.borrow().contains(path)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// First fatal fault raised during the current run, if any.
    pub fn first_fault(&self) -> Option<StreamFault> {
        self.inner.first_fault.borrow().clone()
    }

    /// Whether sources should stop pushing values.
    pub fn should_stop(&self) -> bool {
        self.inner.cancellation.is_cancelled()
            || (self.inner.stop_on_first_fault.get() && self.inner.first_fault.borrow().is_some())
    }

    /// Record a fatal fault raised by a node. Only the first one is kept.
    pub fn report_fault(&self, fault: &StreamFault) {
        error!(job = %self.inner.job_name, node = %fault.node, fault = %fault.fault, "fatal stream fault");
        self.inner.metrics.on_fatal_fault();
        {
            let mut first = self.inner.first_fault.borrow_mut();
            if first.is_none() {
                *first = Some(fault.clone());
            }
        }
        self.emit(ExecutionEvent::NodeFaulted {
            fault: fault.clone(),
        });
    }

    /// Record a row redirected to an error stream.
    pub fn report_redirected(&self, node: &NodePath, fault: &FaultInfo) {
        warn!(job = %self.inner.job_name, node = %node, %fault, "row redirected to error stream");
        self.inner.metrics.on_row_redirected();
        self.emit(ExecutionEvent::RowRedirected {
            node: node.clone(),
            fault: fault.clone(),
        });
    }

    pub(crate) fn begin_run(
        &self,
        observer: Option<Arc<dyn ExecutionObserver>>,
        stop_on_first_fault: bool,
    ) {
        *self.inner.observer.borrow_mut() = observer;
        *self.inner.first_fault.borrow_mut() = None;
        self.inner.stop_on_first_fault.set(stop_on_first_fault);
        self.inner.metrics.begin_run();
    }

    pub(crate) fn emit(&self, event: ExecutionEvent) {
        // Clone the handle so observers may call back into the context.
        let observer = self.inner.observer.borrow().clone();
        if let Some(obs) = observer {
            obs.on_event(&event);
        }
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("job_name", &self.inner.job_name)
            .field("nodes_len", &self.inner.nodes.borrow().len())
            .field("first_fault", &self.inner.first_fault.borrow())
            .finish()
    }
}
