//! File value providers: sources that enumerate files for a pipeline.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EtlError, EtlResult};
use crate::execution::{CancellationToken, ExecutionContext, Pipeline, Source};
use crate::stream::Stream;

/// Rough cost hint a provider gives to schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessImpact {
    Light,
    Moderate,
    Heavy,
}

/// Handle to one file produced by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValue {
    /// Name used to identify the file downstream (relative to the provider's root).
    pub name: String,
    pub path: PathBuf,
    /// Size in bytes when the file was listed.
    pub size: u64,
}

impl FileValue {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
        }
    }

    /// Build a value from an existing file, reading its size.
    pub fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        Ok(Self::new(name, path, size))
    }

    pub fn open(&self) -> EtlResult<File> {
        Ok(File::open(&self.path)?)
    }
}

/// Something that can enumerate files and push them into a pipeline.
pub trait FileValueProvider {
    /// Identifier of the provider configuration, used in error messages.
    fn code(&self) -> &str;

    fn performance_impact(&self) -> ProcessImpact;

    fn memory_footprint(&self) -> ProcessImpact;

    /// Push every file this provider knows about. Implementations check `cancel` between files.
    fn provide(
        &self,
        push: &mut dyn FnMut(FileValue),
        cancel: &CancellationToken,
        context: &ExecutionContext,
    ) -> EtlResult<()>;

    /// Self-check of the configuration. Succeeds unless overridden.
    fn test(&self) -> EtlResult<()> {
        Ok(())
    }
}

/// Placeholder for a provider that was referenced but never configured.
///
/// Constructing one always succeeds; using it as a source fails the run with
/// [`EtlError::ProviderNotConfigured`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoFileValueProvider {
    code: String,
}

impl NoFileValueProvider {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl FileValueProvider for NoFileValueProvider {
    fn code(&self) -> &str {
        &self.code
    }

    fn performance_impact(&self) -> ProcessImpact {
        ProcessImpact::Light
    }

    fn memory_footprint(&self) -> ProcessImpact {
        ProcessImpact::Light
    }

    fn provide(
        &self,
        _push: &mut dyn FnMut(FileValue),
        _cancel: &CancellationToken,
        _context: &ExecutionContext,
    ) -> EtlResult<()> {
        Err(EtlError::ProviderNotConfigured {
            code: self.code.clone(),
        })
    }
}

struct ProviderSource<P>(P);

impl<P: FileValueProvider> Source<FileValue> for ProviderSource<P> {
    fn drive(self: Box<Self>, push: &mut dyn FnMut(FileValue), context: &ExecutionContext) -> EtlResult<()> {
        debug!(
            code = self.0.code(),
            performance = ?self.0.performance_impact(),
            memory = ?self.0.memory_footprint(),
            "providing files"
        );
        self.0.provide(push, context.cancellation_token(), context)
    }
}

impl Pipeline {
    /// Create a root stream of the files listed by `provider`.
    pub fn create_file_stream<P>(&self, name: &str, provider: P) -> EtlResult<Stream<FileValue>>
    where
        P: FileValueProvider + 'static,
    {
        self.create_stream_from(name, ProviderSource(provider))
    }
}
