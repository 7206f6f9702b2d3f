//! Element-wise mapping node.
//!
//! Two modes, chosen by [`SelectArgs::redirect_errors`]:
//!
//! - **fail-fast** (default): a mapper error is fatal. The output stream terminates with
//!   `on_error` and later inputs are ignored. The node has no error stream.
//! - **redirect**: every call goes through [`super::isolate`]. Successes go to `output`, failures
//!   go to `error` as [`ErrorRow`]s carrying the original input. Each channel keeps arrival order.

use crate::error::{BoxError, EtlResult, StreamFault};
use crate::stream::{Emitter, NodeKind, PipelineContext, Stream, StreamNode, Subscriber};
use crate::types::{ErrorRow, NodePath};

use super::isolate::isolate_indexed;

type DirectMapper<TIn, TOut> = Box<dyn FnMut(&TIn) -> Result<TOut, BoxError>>;
type IndexedMapper<TIn, TOut> = Box<dyn FnMut(&TIn, usize) -> Result<TOut, BoxError>>;
type IsolatedMapper<TIn, TOut> = Box<dyn FnMut(&TIn, usize) -> Result<TOut, ErrorRow<TIn>>>;

/// The mapping function of a [`SelectNode`]: exactly one of a plain or an index-aware mapper.
pub enum SelectMapper<TIn, TOut> {
    Direct(DirectMapper<TIn, TOut>),
    /// Receives the 0-based arrival position of the element at this node.
    Indexed(IndexedMapper<TIn, TOut>),
}

impl<TIn, TOut> SelectMapper<TIn, TOut> {
    fn apply(&mut self, value: &TIn, index: usize) -> Result<TOut, BoxError> {
        match self {
            Self::Direct(f) => f(value),
            Self::Indexed(f) => f(value, index),
        }
    }
}

/// Configuration of a [`SelectNode`].
pub struct SelectArgs<TIn, TOut> {
    pub mapper: SelectMapper<TIn, TOut>,
    /// Send failing rows to the `error` stream instead of failing the output stream.
    pub redirect_errors: bool,
}

impl<TIn: 'static, TOut: 'static> SelectArgs<TIn, TOut> {
    /// Fail-fast arguments with a plain mapper.
    pub fn new<F, E>(mut mapper: F) -> Self
    where
        F: FnMut(&TIn) -> Result<TOut, E> + 'static,
        E: Into<BoxError>,
    {
        Self {
            mapper: SelectMapper::Direct(Box::new(move |v: &TIn| mapper(v).map_err(Into::<BoxError>::into))),
            redirect_errors: false,
        }
    }

    /// Fail-fast arguments with an index-aware mapper.
    pub fn indexed<F, E>(mut mapper: F) -> Self
    where
        F: FnMut(&TIn, usize) -> Result<TOut, E> + 'static,
        E: Into<BoxError>,
    {
        Self {
            mapper: SelectMapper::Indexed(Box::new(move |v: &TIn, idx: usize| {
                mapper(v, idx).map_err(Into::<BoxError>::into)
            })),
            redirect_errors: false,
        }
    }

    pub fn redirect_errors(mut self, redirect: bool) -> Self {
        self.redirect_errors = redirect;
        self
    }
}

/// Mapping node. `error` is `Some` only in redirect mode.
pub struct SelectNode<TIn, TOut> {
    pub path: NodePath,
    pub output: Stream<TOut>,
    pub error: Option<Stream<ErrorRow<TIn>>>,
}

impl<TIn: Clone + 'static, TOut: 'static> StreamNode for SelectNode<TIn, TOut> {
    type Input = Stream<TIn>;
    type Args = SelectArgs<TIn, TOut>;

    const KIND: NodeKind = NodeKind::Select;

    fn create(input: &Stream<TIn>, name: &str, parent: &NodePath, args: Self::Args) -> EtlResult<Self> {
        let path = parent.child(name);
        input.context().register_node(&path, Self::KIND)?;

        let (output, output_emitter) = input.derive(&path, "Output");
        let (error, route) = if args.redirect_errors {
            let (error, error_emitter) = input.derive(&path, "Error");
            let mut mapper = args.mapper;
            let isolated: IsolatedMapper<TIn, TOut> =
                Box::new(isolate_indexed(move |v: &TIn, idx: usize| mapper.apply(v, idx)));
            (
                Some(error),
                Route::Redirect {
                    mapper: isolated,
                    error: error_emitter,
                },
            )
        } else {
            (None, Route::FailFast(args.mapper))
        };

        input.subscribe(SelectSubscriber {
            node: path.clone(),
            context: input.context().clone(),
            index: 0,
            route,
            output: output_emitter,
        });

        Ok(Self { path, output, error })
    }
}

enum Route<TIn, TOut> {
    FailFast(SelectMapper<TIn, TOut>),
    Redirect {
        mapper: IsolatedMapper<TIn, TOut>,
        error: Emitter<ErrorRow<TIn>>,
    },
}

struct SelectSubscriber<TIn, TOut> {
    node: NodePath,
    context: PipelineContext,
    index: usize,
    route: Route<TIn, TOut>,
    output: Emitter<TOut>,
}

impl<TIn, TOut> Subscriber<TIn> for SelectSubscriber<TIn, TOut> {
    fn on_next(&mut self, value: &TIn) {
        if self.output.is_closed() {
            return;
        }
        let index = self.index;
        self.index += 1;

        match &mut self.route {
            Route::FailFast(mapper) => match mapper.apply(value, index) {
                Ok(mapped) => self.output.next(&mapped),
                Err(e) => {
                    let fault = StreamFault::from_error(&self.node, &e);
                    self.context.report_fault(&fault);
                    self.output.error(&fault);
                }
            },
            Route::Redirect { mapper, error } => match mapper(value, index) {
                Ok(mapped) => self.output.next(&mapped),
                Err(row) => {
                    self.context.report_redirected(&self.node, &row.fault);
                    error.next(&row);
                }
            },
        }
    }

    fn on_error(&mut self, fault: &StreamFault) {
        self.output.error(fault);
        if let Route::Redirect { error, .. } = &self.route {
            error.error(fault);
        }
    }

    fn on_complete(&mut self) {
        self.output.complete();
        if let Route::Redirect { error, .. } = &self.route {
            error.complete();
        }
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Map every value with an infallible function.
    pub fn select<U, F>(&self, name: &str, mut mapper: F) -> EtlResult<Stream<U>>
    where
        U: 'static,
        F: FnMut(&T) -> U + 'static,
    {
        let args = SelectArgs::new(move |v: &T| Ok::<U, BoxError>(mapper(v)));
        Ok(self.apply::<SelectNode<T, U>>(name, args)?.output)
    }

    /// Map every value together with its 0-based position.
    pub fn select_indexed<U, F>(&self, name: &str, mut mapper: F) -> EtlResult<Stream<U>>
    where
        U: 'static,
        F: FnMut(&T, usize) -> U + 'static,
    {
        let args = SelectArgs::indexed(move |v: &T, idx| Ok::<U, BoxError>(mapper(v, idx)));
        Ok(self.apply::<SelectNode<T, U>>(name, args)?.output)
    }

    /// Map every value with a fallible function; the first error fails the output stream.
    pub fn try_select<U, E, F>(&self, name: &str, mapper: F) -> EtlResult<Stream<U>>
    where
        U: 'static,
        E: Into<BoxError>,
        F: FnMut(&T) -> Result<U, E> + 'static,
    {
        Ok(self.apply::<SelectNode<T, U>>(name, SelectArgs::new(mapper))?.output)
    }

    /// Map every value with a fallible function, redirecting failures to the node's error stream.
    pub fn select_with_errors<U, E, F>(&self, name: &str, mapper: F) -> EtlResult<SelectNode<T, U>>
    where
        U: 'static,
        E: Into<BoxError>,
        F: FnMut(&T) -> Result<U, E> + 'static,
    {
        self.apply::<SelectNode<T, U>>(name, SelectArgs::new(mapper).redirect_errors(true))
    }
}

#[cfg(test)]
mod tests {
    use super::{SelectArgs, SelectNode};
    use crate::error::EtlError;
    use crate::execution::Pipeline;
    use crate::processing::CompletionState;

    #[test]
    fn fail_fast_maps_in_order() {
        let pipeline = Pipeline::new("select");
        let values = pipeline.create_stream("values", vec![1, 2, 3]).unwrap();
        let doubled = values.select("double", |x: &i32| x * 2).unwrap();
        let out = doubled.to_list("collect").unwrap();

        pipeline.run_default().unwrap();
        assert_eq!(out.values(), vec![2, 4, 6]);
        assert!(out.is_completed());
    }

    #[test]
    fn fail_fast_stops_at_first_fault() {
        let pipeline = Pipeline::new("select");
        let values = pipeline.create_stream("values", vec![1, 2, 3, 4]).unwrap();
        let mapped = values
            .try_select("reject three", |x: &i32| {
                if *x == 3 { Err(format!("cannot map {x}")) } else { Ok(x * 10) }
            })
            .unwrap();
        let out = mapped.to_list("collect").unwrap();

        let err = pipeline.run_default().unwrap_err();
        assert!(matches!(err, EtlError::NodeFault(ref f) if f.fault.message == "cannot map 3"));
        assert_eq!(out.values(), vec![10, 20]);
        match out.state() {
            CompletionState::Failed(fault) => assert_eq!(fault.node.to_string(), "reject three"),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn redirect_splits_successes_and_errors() {
        let pipeline = Pipeline::new("select");
        let values = pipeline
            .create_stream("values", vec!["1", "x", "3", "y"].into_iter().map(String::from))
            .unwrap();
        let node = values
            .select_with_errors("parse", |s: &String| s.parse::<i32>())
            .unwrap();
        let ok = node.output.to_list("ok").unwrap();
        let errors = node.error.as_ref().unwrap().to_list("errors").unwrap();

        pipeline.run_default().unwrap();

        assert_eq!(ok.values(), vec![1, 3]);
        let rejected: Vec<String> = errors.values().into_iter().map(|r| r.source_value).collect();
        assert_eq!(rejected, vec!["x".to_string(), "y".to_string()]);
        assert!(ok.is_completed());
        assert!(errors.is_completed());
    }

    #[test]
    fn index_aware_mapper_receives_positions() {
        let pipeline = Pipeline::new("select");
        let values = pipeline.create_stream("values", vec!['a', 'b', 'c']).unwrap();
        let node = values
            .apply::<SelectNode<char, String>>(
                "number",
                SelectArgs::indexed(|c: &char, idx| {
                    if idx == 1 { Err("skip second") } else { Ok(format!("{idx}:{c}")) }
                })
                .redirect_errors(true),
            )
            .unwrap();
        let out = node.output.to_list("collect").unwrap();
        let errors = node.error.unwrap().to_list("errors").unwrap();

        pipeline.run_default().unwrap();
        assert_eq!(out.values(), vec!["0:a".to_string(), "2:c".to_string()]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.values()[0].source_value, 'b');
    }

    #[test]
    fn fail_fast_has_no_error_stream() {
        let pipeline = Pipeline::new("select");
        let values = pipeline.create_stream("values", vec![1]).unwrap();
        let node = values
            .apply::<SelectNode<i32, i32>>("plain", SelectArgs::new(|x: &i32| Ok::<_, String>(*x)))
            .unwrap();
        assert!(node.error.is_none());
        assert_eq!(node.output.path().to_string(), "plain/Output");
    }
}
