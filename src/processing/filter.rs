//! Row filtering node.

use crate::error::{BoxError, EtlResult, StreamFault};
use crate::stream::{Emitter, NodeKind, PipelineContext, Stream, StreamNode, Subscriber};
use crate::types::NodePath;

type Predicate<T> = Box<dyn FnMut(&T) -> Result<bool, BoxError>>;

/// Configuration of a [`WhereNode`].
pub struct WhereArgs<T> {
    pub predicate: Predicate<T>,
}

impl<T: 'static> WhereArgs<T> {
    pub fn new<F, E>(mut predicate: F) -> Self
    where
        F: FnMut(&T) -> Result<bool, E> + 'static,
        E: Into<BoxError>,
    {
        Self {
            predicate: Box::new(move |v: &T| predicate(v).map_err(Into::<BoxError>::into)),
        }
    }
}

/// Forwards the values for which the predicate holds. A predicate error is fatal.
pub struct WhereNode<T> {
    pub path: NodePath,
    pub output: Stream<T>,
}

impl<T: 'static> StreamNode for WhereNode<T> {
    type Input = Stream<T>;
    type Args = WhereArgs<T>;

    const KIND: NodeKind = NodeKind::Where;

    fn create(input: &Stream<T>, name: &str, parent: &NodePath, args: Self::Args) -> EtlResult<Self> {
        let path = parent.child(name);
        input.context().register_node(&path, Self::KIND)?;
        let (output, emitter) = input.derive(&path, "Output");
        input.subscribe(WhereSubscriber {
            node: path.clone(),
            context: input.context().clone(),
            predicate: args.predicate,
            output: emitter,
        });
        Ok(Self { path, output })
    }
}

struct WhereSubscriber<T> {
    node: NodePath,
    context: PipelineContext,
    predicate: Predicate<T>,
    output: Emitter<T>,
}

impl<T> Subscriber<T> for WhereSubscriber<T> {
    fn on_next(&mut self, value: &T) {
        if self.output.is_closed() {
            return;
        }
        match (self.predicate)(value) {
            Ok(true) => self.output.next(value),
            Ok(false) => {}
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
    /// Keep only the values matching `predicate`.
    pub fn where_<F>(&self, name: &str, mut predicate: F) -> EtlResult<Stream<T>>
    where
        F: FnMut(&T) -> bool + 'static,
    {
        let args = WhereArgs::new(move |v: &T| Ok::<bool, BoxError>(predicate(v)));
        Ok(self.apply::<WhereNode<T>>(name, args)?.output)
    }
}
