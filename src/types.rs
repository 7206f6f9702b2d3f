//! Core data model types shared by every node.
//!
//! Values flowing through a pipeline are user types; this module only defines the carriers the
//! engine itself produces: node identities ([`NodePath`]), captured faults ([`FaultInfo`]),
//! redirected rows ([`ErrorRow`]) and group results ([`AggregationResult`]).

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Hierarchical identity of a node or stream inside a pipeline definition.
///
/// Segments are ordered from the outermost scope to the node itself. The empty path is the
/// pipeline root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    /// The root path (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns a new path with `name` appended.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    /// Path of the enclosing scope. The root is its own parent.
    pub fn parent(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Last segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        f.write_str(&self.segments.join("/"))
    }
}

/// A captured fault: the error message plus the messages of its source chain.
///
/// Faults are flattened to strings so they can be cloned to every subscriber of an error channel
/// and serialized alongside the offending row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultInfo {
    /// Top-level error message.
    pub message: String,
    /// Messages of the underlying causes, outermost first.
    pub causes: Vec<String>,
}

impl FaultInfo {
    /// A fault with a message and no causes.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Capture an error and walk its `source()` chain.
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            causes,
        }
    }
}

impl fmt::Display for FaultInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// An input value that could not be processed, paired with the fault it raised.
///
/// Error rows are only produced by nodes running in error-redirection mode and travel on the
/// node's `error` stream; they never re-enter the main computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRow<T> {
    /// The original input, unchanged.
    pub source_value: T,
    /// What went wrong.
    pub fault: FaultInfo,
}

impl<T> ErrorRow<T> {
    pub fn new(source_value: T, fault: FaultInfo) -> Self {
        Self {
            source_value,
            fault,
        }
    }
}

/// Aggregation state for one key, as emitted by the aggregate nodes.
///
/// The unsorted aggregate emits one of these per input (cumulative state so far); the sorted
/// aggregate emits exactly one per contiguous key run (final state).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationResult<K, A> {
    pub key: K,
    pub aggregation: A,
}

impl<K, A> AggregationResult<K, A> {
    pub fn new(key: K, aggregation: A) -> Self {
        Self { key, aggregation }
    }
}
