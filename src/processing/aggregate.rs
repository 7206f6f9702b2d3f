//! Continuously updated group aggregation over an unordered stream.
//!
//! Keeps one accumulator per distinct key for the lifetime of the stream and re-emits the
//! updated accumulator for every input. Memory grows with the number of distinct keys, so this
//! node is meant for streams with a bounded key space; for pre-sorted input prefer
//! [`super::AggregateSortedNode`].

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{BoxError, EtlResult, StreamFault};
use crate::stream::{Emitter, NodeKind, PipelineContext, Stream, StreamNode, Subscriber};
use crate::types::{AggregationResult, NodePath};

pub(crate) type Seed<TIn, TAggr> = Box<dyn FnMut(&TIn) -> Result<TAggr, BoxError>>;
pub(crate) type Combine<TIn, TAggr> = Box<dyn FnMut(TAggr, &TIn) -> Result<TAggr, BoxError>>;
type KeyOf<TIn, TKey> = Box<dyn FnMut(&TIn) -> Result<TKey, BoxError>>;

/// Configuration of an [`AggregateNode`].
pub struct AggregateArgs<TIn, TKey, TAggr> {
    /// Group key of an element.
    pub key_of: KeyOf<TIn, TKey>,
    /// Zero state for a new key, built from the element that introduced the key.
    pub empty_aggregation: Seed<TIn, TAggr>,
    /// Folds one element into the current state of its key.
    pub combine: Combine<TIn, TAggr>,
}

impl<TIn: 'static, TKey: 'static, TAggr: 'static> AggregateArgs<TIn, TKey, TAggr> {
    /// Arguments from infallible functions.
    pub fn new<K, S, C>(mut key_of: K, mut empty_aggregation: S, mut combine: C) -> Self
    where
        K: FnMut(&TIn) -> TKey + 'static,
        S: FnMut(&TIn) -> TAggr + 'static,
        C: FnMut(TAggr, &TIn) -> TAggr + 'static,
    {
        Self {
            key_of: Box::new(move |v: &TIn| Ok(key_of(v))),
            empty_aggregation: Box::new(move |v: &TIn| Ok(empty_aggregation(v))),
            combine: Box::new(move |acc: TAggr, v: &TIn| Ok(combine(acc, v))),
        }
    }

    /// Arguments from fallible functions. Any error is fatal for the output stream.
    pub fn try_new<K, S, C, E>(mut key_of: K, mut empty_aggregation: S, mut combine: C) -> Self
    where
        K: FnMut(&TIn) -> Result<TKey, E> + 'static,
        S: FnMut(&TIn) -> Result<TAggr, E> + 'static,
        C: FnMut(TAggr, &TIn) -> Result<TAggr, E> + 'static,
        E: Into<BoxError>,
    {
        Self {
            key_of: Box::new(move |v: &TIn| key_of(v).map_err(Into::<BoxError>::into)),
            empty_aggregation: Box::new(move |v: &TIn| {
                empty_aggregation(v).map_err(Into::<BoxError>::into)
            }),
            combine: Box::new(move |acc: TAggr, v: &TIn| combine(acc, v).map_err(Into::<BoxError>::into)),
        }
    }
}

/// Aggregation node for unordered input: one [`AggregationResult`] per input element.
pub struct AggregateNode<TIn, TKey, TAggr> {
    pub path: NodePath,
    pub output: Stream<AggregationResult<TKey, TAggr>>,
    _input: std::marker::PhantomData<fn(&TIn)>,
}

impl<TIn, TKey, TAggr> StreamNode for AggregateNode<TIn, TKey, TAggr>
where
    TIn: 'static,
    TKey: Eq + Hash + Clone + 'static,
    TAggr: Clone + 'static,
{
    type Input = Stream<TIn>;
    type Args = AggregateArgs<TIn, TKey, TAggr>;

    const KIND: NodeKind = NodeKind::Aggregate;

    fn create(input: &Stream<TIn>, name: &str, parent: &NodePath, args: Self::Args) -> EtlResult<Self> {
        let path = parent.child(name);
        input.context().register_node(&path, Self::KIND)?;
        let (output, emitter) = input.derive(&path, "Output");
        input.subscribe(AggregateSubscriber {
            node: path.clone(),
            context: input.context().clone(),
            args,
            accumulators: HashMap::new(),
            output: emitter,
        });
        Ok(Self {
            path,
            output,
            _input: std::marker::PhantomData,
        })
    }
}

struct AggregateSubscriber<TIn, TKey, TAggr> {
    node: NodePath,
    context: PipelineContext,
    args: AggregateArgs<TIn, TKey, TAggr>,
    accumulators: HashMap<TKey, TAggr>,
    output: Emitter<AggregationResult<TKey, TAggr>>,
}

impl<TIn, TKey, TAggr> AggregateSubscriber<TIn, TKey, TAggr>
where
    TKey: Eq + Hash + Clone,
    TAggr: Clone,
{
    fn accumulate(&mut self, value: &TIn) -> Result<AggregationResult<TKey, TAggr>, BoxError> {
        let key = (self.args.key_of)(value)?;
        let current = match self.accumulators.remove(&key) {
            Some(current) => current,
            None => (self.args.empty_aggregation)(value)?,
        };
        // A brand-new key is seeded and combined with its first element before anything is emitted.
        let updated = (self.args.combine)(current, value)?;
        self.accumulators.insert(key.clone(), updated.clone());
        Ok(AggregationResult::new(key, updated))
    }
}

impl<TIn, TKey, TAggr> Subscriber<TIn> for AggregateSubscriber<TIn, TKey, TAggr>
where
    TKey: Eq + Hash + Clone,
    TAggr: Clone,
{
    fn on_next(&mut self, value: &TIn) {
        if self.output.is_closed() {
            return;
        }
        match self.accumulate(value) {
            Ok(result) => self.output.next(&result),
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
    /// Group values by `key_of` and emit the updated aggregation of the element's group after
    /// every element.
    pub fn aggregate<K, A, KF, SF, CF>(
        &self,
        name: &str,
        empty_aggregation: SF,
        key_of: KF,
        combine: CF,
    ) -> EtlResult<Stream<AggregationResult<K, A>>>
    where
        K: Eq + Hash + Clone + 'static,
        A: Clone + 'static,
        KF: FnMut(&T) -> K + 'static,
        SF: FnMut(&T) -> A + 'static,
        CF: FnMut(A, &T) -> A + 'static,
    {
        let args = AggregateArgs::new(key_of, empty_aggregation, combine);
        Ok(self.apply::<AggregateNode<T, K, A>>(name, args)?.output)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{AggregateArgs, AggregateNode};
    use crate::execution::Pipeline;
    use crate::types::AggregationResult;

    #[derive(Debug, Clone, PartialEq)]
    struct SumCount {
        sum: i32,
        nb: i32,
    }

    #[test]
    fn emits_cumulative_state_once_per_input() {
        let pipeline = Pipeline::new("aggregate");
        let values = pipeline.create_stream("values", 0..10).unwrap();
        let aggregated = values
            .aggregate(
                "average by modulo",
                |_| SumCount { sum: 0, nb: 0 },
                |v: &i32| v % 3,
                |acc, v| SumCount { sum: acc.sum + v, nb: acc.nb + 1 },
            )
            .unwrap();
        let out = aggregated.to_list("collect").unwrap();

        pipeline.run_default().unwrap();
        let results = out.values();
        assert_eq!(results.len(), 10);
        assert_eq!(
            results[0],
            AggregationResult::new(0, SumCount { sum: 0, nb: 1 })
        );
        assert_eq!(
            results[3],
            AggregationResult::new(0, SumCount { sum: 3, nb: 2 })
        );

        let mut last: HashMap<i32, SumCount> = HashMap::new();
        for r in results {
            last.insert(r.key, r.aggregation);
        }
        assert_eq!(last[&0], SumCount { sum: 18, nb: 4 });
        assert_eq!(last[&1], SumCount { sum: 12, nb: 3 });
        assert_eq!(last[&2], SumCount { sum: 15, nb: 3 });
    }

    #[test]
    fn seed_receives_triggering_element() {
        let pipeline = Pipeline::new("aggregate");
        let values = pipeline
            .create_stream("values", vec![("a", 5), ("b", 7), ("a", 1)])
            .unwrap();
        // Seed with the first element's value, so the first emission for a key is 2 * value.
        let aggregated = values
            .aggregate("seeded", |v| v.1, |v| v.0, |acc, v| acc + v.1)
            .unwrap();
        let out = aggregated.to_list("collect").unwrap();

        pipeline.run_default().unwrap();
        let values: Vec<(&str, i32)> = out.values().into_iter().map(|r| (r.key, r.aggregation)).collect();
        assert_eq!(values, vec![("a", 10), ("b", 14), ("a", 11)]);
    }

    #[test]
    fn combine_error_is_fatal() {
        let pipeline = Pipeline::new("aggregate");
        let values = pipeline.create_stream("values", vec![1, 2, 3]).unwrap();
        let node = values
            .apply::<AggregateNode<i32, bool, i32>>(
                "checked",
                AggregateArgs::try_new(
                    |v: &i32| Ok::<_, String>(v % 2 == 0),
                    |_| Ok(0),
                    |acc, v| if *v == 3 { Err("overflow".to_string()) } else { Ok(acc + v) },
                ),
            )
            .unwrap();
        let out = node.output.to_list("collect").unwrap();

        let err = pipeline.run_default().unwrap_err();
        assert!(err.to_string().contains("checked: overflow"));
        assert_eq!(out.len(), 2);
        assert!(out.fault().is_some());
    }
}
