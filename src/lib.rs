//! `push-etl` is a typed, push-based dataflow engine for ETL pipelines.
//!
//! A pipeline is a graph of named nodes wired on typed [`stream::Stream`]s. Sources push values
//! into root streams; every node subscribes to one upstream stream and publishes derived values
//! downstream, synchronously, one element at a time.
//!
//! ## What you can build
//!
//! - element-wise mapping ([`processing::SelectNode`]), fail-fast or with failing rows redirected
//!   to an error stream as [`types::ErrorRow`]s
//! - filtering, side effects and collection ([`processing::WhereNode`], [`processing::DoNode`],
//!   [`processing::ToListNode`])
//! - per-key aggregation of unordered input ([`processing::AggregateNode`], one result per input)
//!   and of sorted input ([`processing::AggregateSortedNode`], one result per key run)
//! - file-driven sources ([`ingestion::FileValueProvider`]) and a CSV record reader
//!
//! ## Quick example
//!
//! ```rust
//! use push_etl::execution::Pipeline;
//!
//! # fn main() -> Result<(), push_etl::EtlError> {
//! let pipeline = Pipeline::new("orders");
//! let lines = pipeline.create_stream("lines", vec![("de", 7), ("fr", 10), ("fr", 5)])?;
//!
//! let parsed = lines.select_with_errors("check amount", |(country, amount)| {
//!     if *amount > 0 { Ok((*country, *amount)) } else { Err("amount must be positive") }
//! })?;
//! let totals = parsed
//!     .output
//!     .ensure_sorted("by country", |(country, _)| *country)?
//!     .aggregate("total", |_| 0, |total, (_, amount)| total + amount)?;
//! let out = totals.stream().to_list("collect")?;
//!
//! pipeline.run_default()?;
//! let totals: Vec<_> = out.values().into_iter().map(|r| (r.key, r.aggregation)).collect();
//! assert_eq!(totals, vec![("de", 7), ("fr", 15)]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`stream`]: streams, subscribers and the node construction contract
//! - [`processing`]: the node kinds
//! - [`ingestion`]: file value providers and the CSV reader
//! - [`execution`]: running pipelines, metrics, observers and the parallel engine
//! - [`types`]: node paths, faults, error rows and aggregation results
//! - [`error`]: error types

pub mod error;
pub mod execution;
pub mod ingestion;
pub mod processing;
pub mod stream;
pub mod types;

pub use error::{BoxError, EtlError, EtlResult, StreamFault};
