//! Terminal and side-effect nodes: [`ToListNode`] collects values, [`DoNode`] runs an action per
//! value and passes it on.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{BoxError, EtlResult, StreamFault};
use crate::stream::{Emitter, NodeKind, PipelineContext, Stream, StreamNode, Subscriber};
use crate::types::NodePath;

/// How a collected stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionState {
    /// No terminal event yet.
    Pending,
    Completed,
    Failed(StreamFault),
}

/// Shared handle to the values gathered by a [`ToListNode`].
///
/// The handle outlives the pipeline, so results can be read after `run` returns.
pub struct CollectedValues<T> {
    inner: Rc<RefCell<Collected<T>>>,
}

struct Collected<T> {
    values: Vec<T>,
    state: CompletionState,
}

impl<T> Clone for CollectedValues<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for CollectedValues<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CollectedValues")
            .field("values_len", &inner.values.len())
            .field("state", &inner.state)
            .finish()
    }
}

impl<T> CollectedValues<T> {
    fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Collected {
                values: Vec::new(),
                state: CompletionState::Pending,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().values.is_empty()
    }

    pub fn state(&self) -> CompletionState {
        self.inner.borrow().state.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.borrow().state == CompletionState::Completed
    }

    /// The fault that terminated the stream, if it failed.
    pub fn fault(&self) -> Option<StreamFault> {
        match &self.inner.borrow().state {
            CompletionState::Failed(fault) => Some(fault.clone()),
            _ => None,
        }
    }

    /// Move the collected values out, leaving the handle empty.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut self.inner.borrow_mut().values)
    }
}

impl<T: Clone> CollectedValues<T> {
    pub fn values(&self) -> Vec<T> {
        self.inner.borrow().values.clone()
    }
}

struct CollectSubscriber<T> {
    target: CollectedValues<T>,
}

impl<T: Clone> Subscriber<T> for CollectSubscriber<T> {
    fn on_next(&mut self, value: &T) {
        self.target.inner.borrow_mut().values.push(value.clone());
    }

    fn on_error(&mut self, fault: &StreamFault) {
        self.target.inner.borrow_mut().state = CompletionState::Failed(fault.clone());
    }

    fn on_complete(&mut self) {
        self.target.inner.borrow_mut().state = CompletionState::Completed;
    }
}

/// Sink collecting every value of its upstream.
pub struct ToListNode<T> {
    pub path: NodePath,
    pub result: CollectedValues<T>,
}

impl<T: Clone + 'static> StreamNode for ToListNode<T> {
    type Input = Stream<T>;
    type Args = ();

    const KIND: NodeKind = NodeKind::ToList;

    fn create(input: &Stream<T>, name: &str, parent: &NodePath, _args: ()) -> EtlResult<Self> {
        let path = parent.child(name);
        input.context().register_node(&path, Self::KIND)?;
        let result = CollectedValues::new();
        input.subscribe(CollectSubscriber {
            target: result.clone(),
        });
        Ok(Self { path, result })
    }
}

type Action<T> = Box<dyn FnMut(&T) -> Result<(), BoxError>>;

/// Configuration of a [`DoNode`].
pub struct DoArgs<T> {
    pub action: Action<T>,
}

impl<T: 'static> DoArgs<T> {
    pub fn new<F, E>(mut action: F) -> Self
    where
        F: FnMut(&T) -> Result<(), E> + 'static,
        E: Into<BoxError>,
    {
        Self {
            action: Box::new(move |v: &T| action(v).map_err(Into::<BoxError>::into)),
        }
    }
}

/// Runs an action for every value, then forwards the value unchanged. An action error is fatal.
pub struct DoNode<T> {
    pub path: NodePath,
    pub output: Stream<T>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: 'static> StreamNode for DoNode<T> {
    type Input = Stream<T>;
    type Args = DoArgs<T>;

    const KIND: NodeKind = NodeKind::Do;

    fn create(input: &Stream<T>, name: &str, parent: &NodePath, args: Self::Args) -> EtlResult<Self> {
        let path = parent.child(name);
        input.context().register_node(&path, Self::KIND)?;
        let (output, emitter) = input.derive(&path, "Output");
        input.subscribe(DoSubscriber {
            node: path.clone(),
            context: input.context().clone(),
            action: args.action,
            output: emitter,
        });
        Ok(Self {
            path,
            output,
            _marker: PhantomData,
        })
    }
}

struct DoSubscriber<T> {
    node: NodePath,
    context: PipelineContext,
    action: Action<T>,
    output: Emitter<T>,
}

impl<T> Subscriber<T> for DoSubscriber<T> {
    fn on_next(&mut self, value: &T) {
        if self.output.is_closed() {
            return;
        }
        match (self.action)(value) {
            Ok(()) => self.output.next(value),
            Err(e) => {
                let fault = StreamFault::from_error(&self.node, &e);
                self.context.report_fault(&fault);
                self.output.error(&fault);
            }
        }
    }

    fn on_error(&mut self, fault: &StreamFault) {
        self.output.error(fault);
    }

    fn on_complete(&mut self) {
        self.output.complete();
    }
}

impl<T: 'static> Stream<T> {
    /// Collect every value of this stream.
    pub fn to_list(&self, name: &str) -> EtlResult<CollectedValues<T>>
    where
        T: Clone,
    {
        Ok(self.apply::<ToListNode<T>>(name, ())?.result)
    }

    /// Run `action` on every value and pass the value on.
    pub fn do_action<F>(&self, name: &str, mut action: F) -> EtlResult<Stream<T>>
    where
        F: FnMut(&T) + 'static,
    {
        let args = DoArgs::new(move |v: &T| {
            action(v);
            Ok::<(), BoxError>(())
        });
        Ok(self.apply::<DoNode<T>>(name, args)?.output)
    }
}
