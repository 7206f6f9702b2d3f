//! Single-pass group aggregation over a stream sorted by key.
//!
//! Holds at most one active group. A result is emitted when the key changes (group break) and
//! once more when the upstream completes, so each contiguous run of equal keys yields exactly one
//! [`AggregationResult`].
//!
//! The sort order is taken on trust: if equal keys are not contiguous, the same key is reported
//! once per run. Put an [`super::EnsureSortedNode`] upstream when the order is not guaranteed.

use std::rc::Rc;

use crate::error::{BoxError, EtlResult, StreamFault};
use crate::stream::{Emitter, NodeKind, PipelineContext, SortedStream, StreamNode, Subscriber};
use crate::types::{AggregationResult, NodePath};

use super::aggregate::{Combine, Seed};

/// Configuration of an [`AggregateSortedNode`]. The key comes from the sorted stream.
pub struct AggregateSortedArgs<TIn, TAggr> {
    pub empty_aggregation: Seed<TIn, TAggr>,
    pub combine: Combine<TIn, TAggr>,
}

impl<TIn: 'static, TAggr: 'static> AggregateSortedArgs<TIn, TAggr> {
    pub fn new<S, C>(mut empty_aggregation: S, mut combine: C) -> Self
    where
        S: FnMut(&TIn) -> TAggr + 'static,
        C: FnMut(TAggr, &TIn) -> TAggr + 'static,
    {
        Self {
            empty_aggregation: Box::new(move |v: &TIn| Ok(empty_aggregation(v))),
            combine: Box::new(move |acc: TAggr, v: &TIn| Ok(combine(acc, v))),
        }
    }

    pub fn try_new<S, C, E>(mut empty_aggregation: S, mut combine: C) -> Self
    where
        S: FnMut(&TIn) -> Result<TAggr, E> + 'static,
        C: FnMut(TAggr, &TIn) -> Result<TAggr, E> + 'static,
        E: Into<BoxError>,
    {
        Self {
            empty_aggregation: Box::new(move |v: &TIn| {
                empty_aggregation(v).map_err(Into::<BoxError>::into)
            }),
            combine: Box::new(move |acc: TAggr, v: &TIn| combine(acc, v).map_err(Into::<BoxError>::into)),
        }
    }
}

/// Sorted group aggregation node. Its output is sorted by the same key.
pub struct AggregateSortedNode<TIn, TKey, TAggr> {
    pub path: NodePath,
    pub output: SortedStream<AggregationResult<TKey, TAggr>, TKey>,
    _input: std::marker::PhantomData<fn(&TIn)>,
}

impl<TIn, TKey, TAggr> StreamNode for AggregateSortedNode<TIn, TKey, TAggr>
where
    TIn: 'static,
    TKey: PartialEq + Clone + 'static,
    TAggr: 'static,
{
    type Input = SortedStream<TIn, TKey>;
    type Args = AggregateSortedArgs<TIn, TAggr>;

    const KIND: NodeKind = NodeKind::AggregateSorted;

    fn create(
        input: &SortedStream<TIn, TKey>,
        name: &str,
        parent: &NodePath,
        args: Self::Args,
    ) -> EtlResult<Self> {
        let upstream = input.stream();
        let path = parent.child(name);
        upstream.context().register_node(&path, Self::KIND)?;

        let (output, emitter) = upstream.derive(&path, "Output");
        upstream.subscribe(AggregateSortedSubscriber {
            node: path.clone(),
            context: upstream.context().clone(),
            key_of: input.key_fn(),
            args,
            current: None,
            output: emitter,
        });

        let output = SortedStream::new(
            output,
            Rc::new(|r: &AggregationResult<TKey, TAggr>| r.key.clone()),
        );
        Ok(Self {
            path,
            output,
            _input: std::marker::PhantomData,
        })
    }
}

struct AggregateSortedSubscriber<TIn, TKey, TAggr> {
    node: NodePath,
    context: PipelineContext,
    key_of: Rc<dyn Fn(&TIn) -> TKey>,
    args: AggregateSortedArgs<TIn, TAggr>,
    current: Option<(TKey, TAggr)>,
    output: Emitter<AggregationResult<TKey, TAggr>>,
}

impl<TIn, TKey: PartialEq, TAggr> AggregateSortedSubscriber<TIn, TKey, TAggr> {
    /// Take the active group out if `key` does not belong to it.
    fn close_if_changed(&mut self, key: &TKey) -> Option<AggregationResult<TKey, TAggr>> {
        match &self.current {
            Some((current_key, _)) if current_key == key => None,
            _ => self.current.take().map(|(k, a)| AggregationResult::new(k, a)),
        }
    }

    /// Fold `value` into the active group, starting one when there is none.
    fn fold(&mut self, key: TKey, value: &TIn) -> Result<(), BoxError> {
        let updated = match self.current.take() {
            Some((_, aggregation)) => (self.args.combine)(aggregation, value)?,
            None => {
                let seed = (self.args.empty_aggregation)(value)?;
                (self.args.combine)(seed, value)?
            }
        };
        self.current = Some((key, updated));
        Ok(())
    }
}

impl<TIn, TKey: PartialEq, TAggr> Subscriber<TIn> for AggregateSortedSubscriber<TIn, TKey, TAggr> {
    fn on_next(&mut self, value: &TIn) {
        if self.output.is_closed() {
            return;
        }
        let key = (self.key_of)(value);
        // The finished group goes out before the next one is seeded.
        if let Some(finished) = self.close_if_changed(&key) {
            self.output.next(&finished);
        }
        if let Err(e) = self.fold(key, value) {
            self.current = None;
            let fault = StreamFault::from_error(&self.node, &e);
            self.context.report_fault(&fault);
            self.output.error(&fault);
        }
    }

    fn on_error(&mut self, fault: &StreamFault) {
        self.current = None;
        self.output.error(fault);
    }

    fn on_complete(&mut self) {
        if let Some((key, aggregation)) = self.current.take() {
            self.output.next(&AggregationResult::new(key, aggregation));
        }
        self.output.complete();
    }
}

impl<T: 'static, K: PartialEq + Clone + 'static> SortedStream<T, K> {
    /// Aggregate each run of equal keys into one result, emitted when the run ends.
    pub fn aggregate<A, SF, CF>(
        &self,
        name: &str,
        empty_aggregation: SF,
        combine: CF,
    ) -> EtlResult<SortedStream<AggregationResult<K, A>, K>>
    where
        A: 'static,
        SF: FnMut(&T) -> A + 'static,
        CF: FnMut(A, &T) -> A + 'static,
    {
        let args = AggregateSortedArgs::new(empty_aggregation, combine);
        Ok(self.apply::<AggregateSortedNode<T, K, A>>(name, args)?.output)
    }

    /// Build any node kind that consumes a sorted stream.
    pub fn apply<N>(&self, name: &str, args: N::Args) -> EtlResult<N>
    where
        N: StreamNode<Input = SortedStream<T, K>>,
    {
        N::create(self, name, self.stream().scope(), args)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{AggregateSortedArgs, AggregateSortedNode};
    use crate::execution::Pipeline;
    use crate::types::AggregationResult;

    #[test]
    fn one_result_per_group_in_order() {
        let pipeline = Pipeline::new("sorted");
        let values = pipeline
            .create_stream("values", vec!['A', 'A', 'A', 'B', 'B', 'C'])
            .unwrap();
        let counts = values
            .assume_sorted(|c: &char| *c)
            .aggregate("count", |_| 0, |acc, _| acc + 1)
            .unwrap();
        let out = counts.stream().to_list("collect").unwrap();

        pipeline.run_default().unwrap();
        assert_eq!(
            out.values(),
            vec![
                AggregationResult::new('A', 3),
                AggregationResult::new('B', 2),
                AggregationResult::new('C', 1),
            ]
        );
    }

    #[test]
    fn last_group_is_flushed_on_completion() {
        let pipeline = Pipeline::new("sorted");
        let values = pipeline.create_stream("values", vec![(1, 10), (1, 20)]).unwrap();
        let sums = values
            .assume_sorted(|v: &(i32, i32)| v.0)
            .aggregate("sum", |_| 0, |acc, v| acc + v.1)
            .unwrap();
        let out = sums.stream().to_list("collect").unwrap();

        pipeline.run_default().unwrap();
        assert_eq!(out.values(), vec![AggregationResult::new(1, 30)]);
    }

    #[test]
    fn empty_input_emits_nothing() {
        let pipeline = Pipeline::new("sorted");
        let values = pipeline.create_stream("values", Vec::<i32>::new()).unwrap();
        let sums = values
            .assume_sorted(|v: &i32| *v)
            .aggregate("sum", |_| 0, |acc, v| acc + v)
            .unwrap();
        let out = sums.stream().to_list("collect").unwrap();

        pipeline.run_default().unwrap();
        assert!(out.values().is_empty());
        assert!(out.is_completed());
    }

    #[test]
    fn unsorted_input_yields_one_row_per_run() {
        let pipeline = Pipeline::new("sorted");
        let values = pipeline.create_stream("values", vec!['A', 'B', 'A']).unwrap();
        let counts = values
            .assume_sorted(|c: &char| *c)
            .aggregate("count", |_| 0u32, |acc, _| acc + 1)
            .unwrap();
        let out = counts.stream().to_list("collect").unwrap();

        pipeline.run_default().unwrap();
        let keys: Vec<char> = out.values().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!['A', 'B', 'A']);
    }

    #[test]
    fn fault_drops_active_group() {
        let pipeline = Pipeline::new("sorted");
        let values = pipeline.create_stream("values", vec![1, 1, 2, 2]).unwrap();
        let node = values
            .assume_sorted(|v: &i32| *v)
            .apply::<AggregateSortedNode<i32, i32, i32>>(
                "checked",
                AggregateSortedArgs::try_new(
                    |_| Ok::<_, String>(0),
                    |acc, v| {
                        if acc + v > 3 { Err("limit reached".to_string()) } else { Ok(acc + v) }
                    },
                ),
            )
            .unwrap();
        let out = node.output.stream().to_list("collect").unwrap();

        assert!(pipeline.run_default().is_err());
        assert_eq!(out.values(), vec![AggregationResult::new(1, 2)]);
        assert!(out.fault().is_some());
    }

    fn logged_group_counts(
        fail_seed_on: i32,
    ) -> (Pipeline, Rc<RefCell<Vec<String>>>, crate::processing::CollectedValues<AggregationResult<i32, i32>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pipeline = Pipeline::new("sorted");
        let values = pipeline.create_stream("values", vec![1, 1, 2]).unwrap();
        let seed_log = Rc::clone(&log);
        let node = values
            .assume_sorted(|v: &i32| *v)
            .apply::<AggregateSortedNode<i32, i32, i32>>(
                "count",
                AggregateSortedArgs::try_new(
                    move |v: &i32| {
                        seed_log.borrow_mut().push(format!("seed {v}"));
                        if *v == fail_seed_on { Err(format!("no seed for {v}")) } else { Ok(0) }
                    },
                    |acc, _| Ok::<_, String>(acc + 1),
                ),
            )
            .unwrap();
        let emit_log = Rc::clone(&log);
        let out = node
            .output
            .stream()
            .do_action("log", move |r: &AggregationResult<i32, i32>| {
                emit_log.borrow_mut().push(format!("emit {}", r.key))
            })
            .unwrap()
            .to_list("collect")
            .unwrap();
        (pipeline, log, out)
    }

    #[test]
    fn finished_group_is_emitted_before_next_seed() {
        let (pipeline, log, out) = logged_group_counts(-1);
        pipeline.run_default().unwrap();
        assert_eq!(*log.borrow(), vec!["seed 1", "emit 1", "seed 2", "emit 2"]);
        assert_eq!(
            out.values(),
            vec![AggregationResult::new(1, 2), AggregationResult::new(2, 1)]
        );
    }

    #[test]
    fn seed_fault_keeps_the_closed_group() {
        let (pipeline, log, out) = logged_group_counts(2);
        assert!(pipeline.run_default().is_err());
        assert_eq!(*log.borrow(), vec!["seed 1", "emit 1", "seed 2"]);
        assert_eq!(out.values(), vec![AggregationResult::new(1, 2)]);
        assert!(out.fault().is_some());
    }
}
