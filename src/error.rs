use thiserror::Error;

use crate::types::{FaultInfo, NodePath};

/// Boxed error returned by user-supplied node functions (mappers, keys, combiners, ...).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience result type for pipeline definition and execution.
pub type EtlResult<T> = Result<T, EtlError>;

/// A fatal fault raised by a node, with the path of the node that raised it.
///
/// This is the payload of a stream's `on_error` terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{node}: {fault}")]
pub struct StreamFault {
    /// Node that raised the fault.
    pub node: NodePath,
    /// What went wrong.
    pub fault: FaultInfo,
}

impl StreamFault {
    pub fn new(node: NodePath, fault: FaultInfo) -> Self {
        Self { node, fault }
    }

    /// Capture a boxed user error raised by `node`.
    pub fn from_error(node: &NodePath, error: &BoxError) -> Self {
        Self::new(node.clone(), FaultInfo::from_error(&**error))
    }
}

/// Error type returned by pipeline definition and execution.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Two sibling nodes under the same parent path were given the same name.
    #[error("node name conflict: '{path}' is already defined in this pipeline")]
    NameConflict { path: NodePath },

    /// A node raised a fatal fault; the stream it feeds was terminated.
    #[error("node fault: {0}")]
    NodeFault(#[from] StreamFault),

    /// A file value provider stands in for a source that was never configured.
    #[error("{code}: this file value provider does not exist")]
    ProviderNotConfigured { code: String },

    /// A provider's self-check rejected its configuration.
    #[error("{code}: provider self-check failed: {message}")]
    ProviderTestFailed { code: String, message: String },

    /// The run was cancelled through its cancellation token.
    #[error("execution of '{job}' was cancelled")]
    Cancelled { job: String },

    /// Underlying I/O error (file not found, permission denied, ...).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A CSV record could not be decoded or deserialized.
    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: u64, message: String },

    /// Invalid glob pattern in a provider configuration.
    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Directory traversal error.
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Configuration could not be deserialized.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The batch engine could not start its worker pool.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
