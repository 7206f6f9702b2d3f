use serde::{Deserialize, Serialize};

use crate::error::EtlResult;
use crate::types::NodePath;

/// The kinds of nodes a pipeline can contain. Used for tracing and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Root stream fed by a source.
    Source,
    Select,
    Where,
    Aggregate,
    AggregateSorted,
    EnsureSorted,
    Do,
    ToList,
    ReadCsv,
}

/// Uniform construction contract shared by every node kind.
///
/// A node subscribes to one upstream stream (which it does not own and must not alter), is
/// identified by `parent/name`, and derives its outputs from the upstream at construction time.
/// No data flows until the pipeline is run.
pub trait StreamNode: Sized {
    /// Upstream stream type (`Stream<T>` or `SortedStream<T, K>`).
    type Input;
    /// Strongly typed node configuration.
    type Args;

    const KIND: NodeKind;

    fn create(
        input: &Self::Input,
        name: &str,
        parent: &NodePath,
        args: Self::Args,
    ) -> EtlResult<Self>;
}
