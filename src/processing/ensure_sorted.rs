//! Sort-order check that turns a plain stream into a [`SortedStream`].

use std::rc::Rc;

use crate::error::{EtlResult, StreamFault};
use crate::stream::{Emitter, NodeKind, PipelineContext, SortedStream, Stream, StreamNode, Subscriber};
use crate::types::{FaultInfo, NodePath};

/// Configuration of an [`EnsureSortedNode`].
pub struct EnsureSortedArgs<T, K> {
    pub key_of: Rc<dyn Fn(&T) -> K>,
}

impl<T, K> EnsureSortedArgs<T, K> {
    pub fn new<F>(key_of: F) -> Self
    where
        F: Fn(&T) -> K + 'static,
    {
        Self {
            key_of: Rc::new(key_of),
        }
    }
}

/// Forwards values unchanged and fails the stream as soon as a key is lower than the previous
/// one. Equal keys are allowed.
pub struct EnsureSortedNode<T, K> {
    pub path: NodePath,
    pub output: SortedStream<T, K>,
}

impl<T: 'static, K: Ord + 'static> StreamNode for EnsureSortedNode<T, K> {
    type Input = Stream<T>;
    type Args = EnsureSortedArgs<T, K>;

    const KIND: NodeKind = NodeKind::EnsureSorted;

    fn create(input: &Stream<T>, name: &str, parent: &NodePath, args: Self::Args) -> EtlResult<Self> {
        let path = parent.child(name);
        input.context().register_node(&path, Self::KIND)?;
        let (output, emitter) = input.derive(&path, "Output");
        input.subscribe(EnsureSortedSubscriber {
            node: path.clone(),
            context: input.context().clone(),
            key_of: Rc::clone(&args.key_of),
            previous: None,
            position: 0,
            output: emitter,
        });
        Ok(Self {
            path,
            output: SortedStream::new(output, args.key_of),
        })
    }
}

struct EnsureSortedSubscriber<T, K> {
    node: NodePath,
    context: PipelineContext,
    key_of: Rc<dyn Fn(&T) -> K>,
    previous: Option<K>,
    position: usize,
    output: Emitter<T>,
}

impl<T, K: Ord> Subscriber<T> for EnsureSortedSubscriber<T, K> {
    fn on_next(&mut self, value: &T) {
        if self.output.is_closed() {
            return;
        }
        let key = (self.key_of)(value);
        let position = self.position;
        self.position += 1;

        if self.previous.as_ref().is_some_and(|previous| key < *previous) {
            let fault = StreamFault::new(
                self.node.clone(),
                FaultInfo::new(format!("element at position {position} is out of order")),
            );
            self.context.report_fault(&fault);
            self.output.error(&fault);
            return;
        }
        self.previous = Some(key);
        self.output.next(value);
    }

    fn on_error(&mut self, fault: &StreamFault) {
        self.output.error(fault);
    }

    fn on_complete(&mut self) {
        self.output.complete();
    }
}

impl<T: 'static> Stream<T> {
    /// Check that values arrive ordered by `key_of` and expose the stream as sorted.
    pub fn ensure_sorted<K, F>(&self, name: &str, key_of: F) -> EtlResult<SortedStream<T, K>>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + 'static,
    {
        Ok(self
            .apply::<EnsureSortedNode<T, K>>(name, EnsureSortedArgs::new(key_of))?
            .output)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EtlError;
    use crate::execution::Pipeline;

    #[test]
    fn sorted_input_passes_through() {
        let pipeline = Pipeline::new("ensure");
        let values = pipeline.create_stream("values", vec![1, 1, 2, 5]).unwrap();
        let sorted = values.ensure_sorted("check", |v: &i32| *v).unwrap();
        let out = sorted.stream().to_list("collect").unwrap();

        pipeline.run_default().unwrap();
        assert_eq!(out.values(), vec![1, 1, 2, 5]);
    }

    #[test]
    fn decreasing_key_is_fatal() {
        let pipeline = Pipeline::new("ensure");
        let values = pipeline.create_stream("values", vec![1, 3, 2, 4]).unwrap();
        let sorted = values.ensure_sorted("check", |v: &i32| *v).unwrap();
        let counts = sorted.aggregate("count", |_| 0, |acc, _| acc + 1).unwrap();
        let out = counts.stream().to_list("collect").unwrap();

        let err = pipeline.run_default().unwrap_err();
        match err {
            EtlError::NodeFault(fault) => {
                assert_eq!(fault.node.to_string(), "check");
                assert_eq!(fault.fault.message, "element at position 2 is out of order");
            }
            other => panic!("unexpected error {other}"),
        }
        // The aggregate saw the failure before it could flush its last group.
        assert_eq!(out.len(), 1);
        assert!(out.fault().is_some());
    }
}
