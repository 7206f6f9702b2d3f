//! Typed push streams and the node composition contract.
//!
//! A [`Stream<T>`] is a named, push-delivered sequence of `T` values with any number of
//! subscribers. Nodes subscribe to one upstream stream and publish derived values on their own
//! output streams through an [`Emitter`]. Delivery is synchronous: pushing a value walks the
//! whole downstream graph before returning.
//!
//! Wiring (creating nodes and subscribing) happens while the pipeline is being defined; driving
//! happens later through [`crate::execution::Pipeline::run`]. A subscriber attached from inside
//! a callback of the same stream starts receiving values after the current delivery.

mod context;
mod node;
mod sorted;
mod subscriber;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::{EtlResult, StreamFault};
use crate::types::NodePath;

pub use context::PipelineContext;
pub use node::{NodeKind, StreamNode};
pub use sorted::SortedStream;
pub use subscriber::{FnSubscriber, Subscriber};

/// Lifecycle of a stream. `Completed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Completed,
    Failed,
}

struct StreamCore<T> {
    path: NodePath,
    subscribers: RefCell<Vec<Box<dyn Subscriber<T>>>>,
    /// Subscribers attached while `subscribers` was being walked.
    pending: RefCell<Vec<Box<dyn Subscriber<T>>>>,
    subscriber_count: Cell<usize>,
    state: Cell<StreamState>,
}

/// A named, typed, push-based stream.
///
/// Cloning a `Stream` yields another handle to the same stream (same subscribers).
pub struct Stream<T> {
    core: Rc<StreamCore<T>>,
    context: PipelineContext,
    scope: NodePath,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            context: self.context.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("path", &self.core.path)
            .field("scope", &self.scope)
            .field("subscribers_len", &self.core.subscriber_count.get())
            .field("state", &self.core.state.get())
            .finish()
    }
}

impl<T: 'static> Stream<T> {
    pub(crate) fn new(context: &PipelineContext, path: NodePath, scope: NodePath) -> (Self, Emitter<T>) {
        let core = Rc::new(StreamCore {
            path,
            subscribers: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            subscriber_count: Cell::new(0),
            state: Cell::new(StreamState::Open),
        });
        let stream = Self {
            core: Rc::clone(&core),
            context: context.clone(),
            scope,
        };
        (stream, Emitter { core })
    }

    /// Create the output stream `output` of the node at `node`.
    ///
    /// The new stream lives in the same pipeline and scope as `self`, so nodes chained onto it
    /// are siblings of `node`.
    pub fn derive<U: 'static>(&self, node: &NodePath, output: &str) -> (Stream<U>, Emitter<U>) {
        Stream::new(&self.context, node.child(output), self.scope.clone())
    }

    /// Full path of this stream (`<node path>/<output name>`).
    pub fn path(&self) -> &NodePath {
        &self.core.path
    }

    /// Parent path given to nodes built on this stream through its convenience methods.
    pub fn scope(&self) -> &NodePath {
        &self.scope
    }

    /// The same stream, with nodes built from it nested under `scope/name`.
    pub fn in_scope(&self, name: &str) -> Self {
        Self {
            core: Rc::clone(&self.core),
            context: self.context.clone(),
            scope: self.scope.child(name),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn state(&self) -> StreamState {
        self.core.state.get()
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.subscriber_count.get()
    }

    /// Attach a subscriber. It receives every value pushed from now on.
    ///
    /// Called from a callback of this stream, the subscriber joins once the current value has
    /// reached every existing subscriber.
    pub fn subscribe(&self, subscriber: impl Subscriber<T> + 'static) {
        let subscriber: Box<dyn Subscriber<T>> = Box::new(subscriber);
        match self.core.subscribers.try_borrow_mut() {
            Ok(mut subscribers) => subscribers.push(subscriber),
            Err(_) => self.core.pending.borrow_mut().push(subscriber),
        }
        self.core.subscriber_count.set(self.core.subscriber_count.get() + 1);
    }

    /// Build any node kind from this stream, using this stream's scope as parent path.
    pub fn apply<N>(&self, name: &str, args: N::Args) -> EtlResult<N>
    where
        N: StreamNode<Input = Stream<T>>,
    {
        N::create(self, name, &self.scope, args)
    }
}

/// Publishing side of a stream, held by the node (or source) that owns it.
///
/// Enforces the terminal-event rule: once `error` or `complete` has been called, everything
/// else is dropped.
pub struct Emitter<T> {
    core: Rc<StreamCore<T>>,
}

impl<T> Emitter<T> {
    pub fn path(&self) -> &NodePath {
        &self.core.path
    }

    pub fn is_closed(&self) -> bool {
        self.core.state.get() != StreamState::Open
    }

    pub fn next(&self, value: &T) {
        if self.is_closed() {
            return;
        }
        self.deliver(|subscriber| subscriber.on_next(value));
    }

    pub fn error(&self, fault: &StreamFault) {
        if self.is_closed() {
            return;
        }
        self.core.state.set(StreamState::Failed);
        self.deliver(|subscriber| subscriber.on_error(fault));
    }

    pub fn complete(&self) {
        if self.is_closed() {
            return;
        }
        self.core.state.set(StreamState::Completed);
        self.deliver(|subscriber| subscriber.on_complete());
    }

    fn deliver(&self, mut event: impl FnMut(&mut dyn Subscriber<T>)) {
        {
            let mut subscribers = self.core.subscribers.borrow_mut();
            for subscriber in subscribers.iter_mut() {
                event(subscriber.as_mut());
            }
        }
        let joined = std::mem::take(&mut *self.core.pending.borrow_mut());
        self.core.subscribers.borrow_mut().extend(joined);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{FnSubscriber, PipelineContext, Stream, StreamState, Subscriber};
    use crate::error::StreamFault;
    use crate::types::{FaultInfo, NodePath};

    #[derive(Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl Subscriber<i32> for Recorder {
        fn on_next(&mut self, value: &i32) {
            self.events.borrow_mut().push(format!("next {value}"));
        }
        fn on_error(&mut self, fault: &StreamFault) {
            self.events.borrow_mut().push(format!("error {fault}"));
        }
        fn on_complete(&mut self) {
            self.events.borrow_mut().push("complete".to_string());
        }
    }

    #[test]
    fn fans_out_to_every_subscriber() {
        let ctx = PipelineContext::new("job");
        let (stream, emitter) = Stream::<i32>::new(&ctx, NodePath::new(["src"]), NodePath::root());

        let first = Recorder::default();
        let first_events = Rc::clone(&first.events);
        stream.subscribe(first);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        stream.subscribe(FnSubscriber(move |v: &i32| seen2.borrow_mut().push(*v)));
        assert_eq!(stream.subscriber_count(), 2);

        emitter.next(&1);
        emitter.next(&2);
        emitter.complete();

        assert_eq!(*first_events.borrow(), vec!["next 1", "next 2", "complete"]);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(stream.state(), StreamState::Completed);
    }

    #[test]
    fn at_most_one_terminal_event() {
        let ctx = PipelineContext::new("job");
        let (stream, emitter) = Stream::<i32>::new(&ctx, NodePath::new(["src"]), NodePath::root());
        let rec = Recorder::default();
        let events = Rc::clone(&rec.events);
        stream.subscribe(rec);

        let fault = StreamFault::new(NodePath::new(["src"]), FaultInfo::new("boom"));
        emitter.next(&1);
        emitter.error(&fault);
        emitter.next(&2);
        emitter.complete();
        emitter.error(&fault);

        assert_eq!(*events.borrow(), vec!["next 1", "error src: boom"]);
        assert_eq!(stream.state(), StreamState::Failed);
    }

    #[test]
    fn in_scope_nests_parent_path() {
        let ctx = PipelineContext::new("job");
        let (stream, _emitter) = Stream::<i32>::new(&ctx, NodePath::new(["src"]), NodePath::root());
        let nested = stream.in_scope("sub");
        assert_eq!(nested.scope(), &NodePath::new(["sub"]));
        assert_eq!(nested.path(), stream.path());
    }

    #[test]
    fn subscribing_from_a_callback_joins_after_the_current_value() {
        let ctx = PipelineContext::new("job");
        let (stream, emitter) = Stream::<i32>::new(&ctx, NodePath::new(["src"]), NodePath::root());

        let late = Recorder::default();
        let late_events = Rc::clone(&late.events);
        let late = RefCell::new(Some(late));
        let counts = Rc::new(RefCell::new(Vec::new()));
        let handle = stream.clone();
        let seen_counts = Rc::clone(&counts);
        stream.subscribe(FnSubscriber(move |_: &i32| {
            if let Some(late) = late.borrow_mut().take() {
                handle.subscribe(late);
            }
            seen_counts.borrow_mut().push(handle.subscriber_count());
        }));

        emitter.next(&1);
        emitter.next(&2);
        emitter.complete();

        assert_eq!(*counts.borrow(), vec![2, 2]);
        assert_eq!(*late_events.borrow(), vec!["next 2", "complete"]);
    }
}
