use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::{EtlError, EtlResult, StreamFault};
use crate::stream::{Emitter, NodeKind, PipelineContext, Stream};
use crate::types::{FaultInfo, NodePath};

use super::{CancellationToken, ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionOptions};

/// Something that pushes values into a root stream when the pipeline runs.
///
/// `drive` is called once per run. It should check [`ExecutionContext::should_stop`] between
/// values; values pushed after the run was halted are dropped anyway. Returning an error fails
/// the root stream and the run.
pub trait Source<T> {
    fn drive(self: Box<Self>, push: &mut dyn FnMut(T), context: &ExecutionContext) -> EtlResult<()>;
}

/// [`Source`] over any iterator.
pub struct IterSource<I>(pub I);

impl<I: Iterator> Source<I::Item> for IterSource<I> {
    fn drive(self: Box<Self>, push: &mut dyn FnMut(I::Item), context: &ExecutionContext) -> EtlResult<()> {
        for item in self.0 {
            if context.should_stop() {
                break;
            }
            push(item);
        }
        Ok(())
    }
}

/// Run-time view handed to sources and providers.
pub struct ExecutionContext {
    pipeline: PipelineContext,
}

impl ExecutionContext {
    pub fn job_name(&self) -> &str {
        self.pipeline.job_name()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        self.pipeline.cancellation_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.pipeline.cancellation_token().is_cancelled()
    }

    /// True once the run is cancelled or, in stop-on-first-fault mode, a node has faulted.
    pub fn should_stop(&self) -> bool {
        self.pipeline.should_stop()
    }

    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        self.pipeline.metrics()
    }

    pub fn pipeline(&self) -> &PipelineContext {
        &self.pipeline
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("job_name", &self.job_name())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

trait RootDriver {
    fn drive(self: Box<Self>, context: &ExecutionContext) -> EtlResult<()>;

    /// Terminate the root stream without driving its source.
    fn abort(self: Box<Self>, fault: &StreamFault);
}

struct RootStream<T> {
    node: NodePath,
    source: Box<dyn Source<T>>,
    emitter: Emitter<T>,
}

impl<T: 'static> RootDriver for RootStream<T> {
    fn drive(self: Box<Self>, context: &ExecutionContext) -> EtlResult<()> {
        let RootStream {
            node,
            source,
            emitter,
        } = *self;
        debug!(job = %context.job_name(), node = %node, "driving source");

        let metrics = context.metrics();
        let outcome = {
            let mut push = |value: T| {
                if context.should_stop() {
                    return;
                }
                metrics.on_row_pushed();
                emitter.next(&value);
            };
            source.drive(&mut push, context)
        };

        if let Err(e) = outcome {
            let fault = StreamFault::new(node, FaultInfo::from_error(&e));
            context.pipeline().report_fault(&fault);
            emitter.error(&fault);
            return Err(e);
        }

        if context.is_cancelled() {
            emitter.error(&cancellation_fault(node));
        } else if let Some(fault) = context.should_stop().then(|| context.pipeline().first_fault()).flatten() {
            emitter.error(&fault);
        } else {
            emitter.complete();
        }
        Ok(())
    }

    fn abort(self: Box<Self>, fault: &StreamFault) {
        self.emitter.error(fault);
    }
}

fn cancellation_fault(node: NodePath) -> StreamFault {
    StreamFault::new(node, FaultInfo::new("execution cancelled"))
}

/// A pipeline definition: root streams fed by sources, and the node graph built on them.
///
/// Define the graph with [`Pipeline::create_stream`] and the node methods of
/// [`crate::stream::Stream`], then call [`Pipeline::run`] once. Handles such as
/// [`crate::processing::CollectedValues`] remain readable after the run.
pub struct Pipeline {
    context: PipelineContext,
    roots: RefCell<Vec<Box<dyn RootDriver>>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("context", &self.context)
            .field("roots_len", &self.roots.borrow().len())
            .finish()
    }
}

impl Pipeline {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            context: PipelineContext::new(job_name),
            roots: RefCell::new(Vec::new()),
        }
    }

    pub fn job_name(&self) -> &str {
        self.context.job_name()
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Token that stops the run when cancelled (before or during `run`).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.context.cancellation_token().clone()
    }

    /// Live metrics of this pipeline's run.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        self.context.metrics()
    }

    /// Create a root stream fed by `values`.
    pub fn create_stream<I>(&self, name: &str, values: I) -> EtlResult<Stream<I::Item>>
    where
        I: IntoIterator,
        I::IntoIter: 'static,
        I::Item: 'static,
    {
        self.create_stream_from(name, IterSource(values.into_iter()))
    }

    /// Create a root stream fed by any [`Source`].
    pub fn create_stream_from<T, S>(&self, name: &str, source: S) -> EtlResult<Stream<T>>
    where
        T: 'static,
        S: Source<T> + 'static,
    {
        let node = NodePath::root().child(name);
        self.context.register_node(&node, NodeKind::Source)?;
        let (stream, emitter) = Stream::new(&self.context, node.child("Output"), NodePath::root());
        self.roots.borrow_mut().push(Box::new(RootStream {
            node,
            source: Box::new(source),
            emitter,
        }));
        Ok(stream)
    }

    /// Drive every source, in definition order, through the node graph.
    ///
    /// Returns the run's metrics on success. Fails with the first source error, with
    /// [`EtlError::Cancelled`] if the run was cancelled, or with the first fatal node fault.
    pub fn run(self, options: ExecutionOptions) -> EtlResult<ExecutionMetricsSnapshot> {
        let start = Instant::now();
        let job = self.context.job_name().to_string();
        self.context
            .begin_run(options.observer.clone(), options.stop_on_first_fault);
        self.context.emit(ExecutionEvent::RunStarted { job: job.clone() });

        let context = ExecutionContext {
            pipeline: self.context.clone(),
        };
        let mut source_error = None;
        for root in self.roots.into_inner() {
            if context.should_stop() {
                let fault = context
                    .pipeline()
                    .first_fault()
                    .unwrap_or_else(|| cancellation_fault(NodePath::root()));
                root.abort(&fault);
                continue;
            }
            if let Err(e) = root.drive(&context) {
                source_error.get_or_insert(e);
            }
        }

        let metrics = self.context.metrics();
        let elapsed = start.elapsed();
        metrics.end_run(elapsed);
        let snapshot = metrics.snapshot();

        let cancelled = context.is_cancelled();
        if cancelled {
            self.context.emit(ExecutionEvent::RunCancelled { job: job.clone() });
        }
        self.context.emit(ExecutionEvent::RunFinished {
            job: job.clone(),
            elapsed,
            metrics: snapshot.clone(),
        });

        if let Some(e) = source_error {
            return Err(e);
        }
        if cancelled {
            return Err(EtlError::Cancelled { job });
        }
        match self.context.first_fault() {
            Some(fault) => Err(EtlError::NodeFault(fault)),
            None => Ok(snapshot),
        }
    }

    /// [`Pipeline::run`] with [`ExecutionOptions::default`].
    pub fn run_default(self) -> EtlResult<ExecutionMetricsSnapshot> {
        self.run(ExecutionOptions::default())
    }
}
