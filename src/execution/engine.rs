use std::fmt;
use std::time::Duration;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::error::EtlResult;

use super::semaphore::Semaphore;
use super::{ExecutionMetricsSnapshot, ExecutionOptions, Pipeline};

/// A process that can be instantiated once per trigger value.
///
/// Pipelines are single-threaded, so the engine builds a fresh [`Pipeline`] on a worker thread
/// for every trigger, lets the definition wire it, runs it and then asks the definition to turn
/// the handle it kept (typically [`crate::processing::CollectedValues`]) into a sendable output.
pub trait ProcessDefinition: Sync {
    type Trigger: Send;
    type Handle;
    type Output: Send;

    fn name(&self) -> &str;

    fn define(&self, pipeline: &Pipeline, trigger: Self::Trigger) -> EtlResult<Self::Handle>;

    fn finish(&self, handle: Self::Handle) -> Self::Output;
}

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on concurrently executing runs (clamped to at least one).
    pub max_in_flight_runs: usize,
    /// Options applied to every run.
    pub execution: ExecutionOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_runs: n.max(1),
            execution: ExecutionOptions::default(),
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunReport<O> {
    /// Job name of the run (`<process>#<trigger index>`).
    pub job: String,
    pub output: O,
    pub metrics: ExecutionMetricsSnapshot,
    /// Time spent waiting for an in-flight slot.
    pub throttled_for: Duration,
}

/// Runs independent pipelines in parallel on a dedicated rayon pool.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: EngineOptions,
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("threads", &self.pool.current_num_threads())
            .field("opts", &self.opts)
            .finish()
    }
}

impl ExecutionEngine {
    pub fn new(opts: EngineOptions) -> EtlResult<Self> {
        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new().num_threads(n_threads).build()?;
        Ok(Self { pool, opts })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    /// Build and run one pipeline on the calling thread.
    pub fn run_one<D: ProcessDefinition>(&self, definition: &D, trigger: D::Trigger) -> EtlResult<RunReport<D::Output>> {
        self.execute(definition, definition.name().to_string(), trigger, Duration::ZERO)
    }

    /// Run one pipeline per trigger, in parallel, returning the reports in trigger order.
    pub fn run_all<D: ProcessDefinition>(
        &self,
        definition: &D,
        triggers: Vec<D::Trigger>,
    ) -> Vec<EtlResult<RunReport<D::Output>>> {
        info!(process = definition.name(), runs = triggers.len(), "starting runs");
        let sem = Semaphore::new(self.opts.max_in_flight_runs);
        self.pool.install(|| {
            triggers
                .into_par_iter()
                .enumerate()
                .map(|(index, trigger)| {
                    let permit = sem.acquire();
                    let job = format!("{}#{index}", definition.name());
                    self.execute(definition, job, trigger, permit.waited())
                })
                .collect()
        })
    }

    fn execute<D: ProcessDefinition>(
        &self,
        definition: &D,
        job: String,
        trigger: D::Trigger,
        throttled_for: Duration,
    ) -> EtlResult<RunReport<D::Output>> {
        if !throttled_for.is_zero() {
            debug!(%job, ?throttled_for, "run throttled");
        }
        let pipeline = Pipeline::new(job.clone());
        let handle = definition.define(&pipeline, trigger)?;
        let metrics = pipeline.run(self.opts.execution.clone())?;
        Ok(RunReport {
            job,
            output: definition.finish(handle),
            metrics,
            throttled_for,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::{EngineOptions, ExecutionEngine, ProcessDefinition};
    use crate::error::{EtlError, EtlResult};
    use crate::execution::{ExecutionOptions, Pipeline};
    use crate::processing::CollectedValues;

    struct SumUpTo {
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl SumUpTo {
        fn new() -> Self {
            Self {
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ProcessDefinition for SumUpTo {
        type Trigger = u32;
        type Handle = CollectedValues<u32>;
        type Output = u32;

        fn name(&self) -> &str {
            "sum"
        }

        fn define(&self, pipeline: &Pipeline, trigger: u32) -> EtlResult<Self::Handle> {
            if trigger == 0 {
                return Err(EtlError::Cancelled {
                    job: pipeline.job_name().to_string(),
                });
            }
            let active = Arc::clone(&self.active);
            let max_active = Arc::clone(&self.max_active);
            let values = pipeline.create_stream("values", 1..=trigger)?;
            let watched = values.do_action("track", move |v: &u32| {
                if *v == 1 {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    let _ = active.fetch_sub(1, Ordering::SeqCst);
                }
            })?;
            let sums = watched.aggregate("total", |_| 0, |_| (), |acc, v| acc + v)?;
            sums.select("value", |r| r.aggregation)?.to_list("collect")
        }

        fn finish(&self, handle: Self::Handle) -> u32 {
            handle.values().last().copied().unwrap_or(0)
        }
    }

    #[test]
    fn runs_each_trigger_in_order() {
        let engine = ExecutionEngine::new(EngineOptions {
            num_threads: Some(4),
            max_in_flight_runs: 4,
            execution: ExecutionOptions::default(),
        })
        .unwrap();
        let definition = SumUpTo::new();

        let reports = engine.run_all(&definition, vec![3, 4, 10]);
        let outputs: Vec<u32> = reports.into_iter().map(|r| r.unwrap().output).collect();
        assert_eq!(outputs, vec![6, 10, 55]);
    }

    #[test]
    fn failing_definition_only_fails_its_run() {
        let engine = ExecutionEngine::new(EngineOptions::default()).unwrap();
        let definition = SumUpTo::new();

        let reports = engine.run_all(&definition, vec![2, 0, 3]);
        assert_eq!(reports[0].as_ref().unwrap().output, 3);
        assert!(matches!(reports[1], Err(EtlError::Cancelled { ref job }) if job == "sum#1"));
        let last = reports[2].as_ref().unwrap();
        assert_eq!(last.output, 6);
        assert_eq!(last.job, "sum#2");
        assert_eq!(last.metrics.rows_pushed, 3);
    }

    #[test]
    fn max_in_flight_runs_throttles_concurrency() {
        let engine = ExecutionEngine::new(EngineOptions {
            num_threads: Some(4),
            max_in_flight_runs: 2,
            execution: ExecutionOptions::default(),
        })
        .unwrap();
        let definition = SumUpTo::new();

        let reports = engine.run_all(&definition, (1..=16).collect());
        assert!(reports.iter().all(|r| r.is_ok()));
        assert!(definition.max_active.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn run_one_uses_process_name() {
        let engine = ExecutionEngine::new(EngineOptions::default()).unwrap();
        let report = engine.run_one(&SumUpTo::new(), 5).unwrap();
        assert_eq!(report.job, "sum");
        assert_eq!(report.output, 15);
        assert!(report.throttled_for.is_zero());
    }
}
