//! Stream nodes.
//!
//! Every node follows the same contract ([`crate::stream::StreamNode`]): it subscribes to one
//! upstream stream, is named `parent/name`, and publishes derived values on its own output
//! stream(s). Faults raised by user functions are fatal for the node's output stream unless the
//! node runs in error-redirection mode (currently [`SelectNode`]).
//!
//! Implemented nodes:
//!
//! - [`SelectNode`]: element-wise mapping, plain or index-aware, fail-fast or redirecting errors
//! - [`WhereNode`]: filtering by predicate
//! - [`AggregateNode`]: per-key aggregation of unordered input, one result per input
//! - [`EnsureSortedNode`]: checks the sort order and yields a [`crate::stream::SortedStream`]
//! - [`AggregateSortedNode`]: per-group aggregation of sorted input, one result per group
//! - [`DoNode`] / [`ToListNode`]: side effects and collection
//!
//! ## Example: average per group
//!
//! ```rust
//! use push_etl::execution::Pipeline;
//!
//! # fn main() -> Result<(), push_etl::EtlError> {
//! let pipeline = Pipeline::new("average");
//! let values = pipeline.create_stream("values", 0..10)?;
//!
//! let sums = values.aggregate(
//!     "sum and count by modulo",
//!     |_| (0, 0),
//!     |v: &i32| v % 3,
//!     |(sum, nb), v| (sum + v, nb + 1),
//! )?;
//! let averages = sums.select("average", |r| (r.key, r.aggregation.0 / r.aggregation.1))?;
//! let out = averages.to_list("collect")?;
//!
//! pipeline.run_default()?;
//! // The last emission per key holds the final state.
//! assert_eq!(out.values().last(), Some(&(0, 4)));
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod aggregate_sorted;
pub mod ensure_sorted;
pub mod filter;
pub mod isolate;
pub mod select;
pub mod sink;

pub use aggregate::{AggregateArgs, AggregateNode};
pub use aggregate_sorted::{AggregateSortedArgs, AggregateSortedNode};
pub use ensure_sorted::{EnsureSortedArgs, EnsureSortedNode};
pub use filter::{WhereArgs, WhereNode};
pub use isolate::{isolate, isolate_indexed};
pub use select::{SelectArgs, SelectMapper, SelectNode};
pub use sink::{CollectedValues, CompletionState, DoArgs, DoNode, ToListNode};
