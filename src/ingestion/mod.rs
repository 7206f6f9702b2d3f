//! Getting files into a pipeline.
//!
//! - [`provider`]: the [`FileValueProvider`] contract, [`FileValue`] and [`NoFileValueProvider`]
//! - [`filesystem`]: a provider listing a local folder
//! - [`csv`]: a node reading a stream of files as typed CSV records
//!
//! A provider becomes a root stream through [`crate::execution::Pipeline::create_file_stream`].

pub mod csv;
pub mod filesystem;
pub mod provider;

pub use csv::{CsvReadArgs, ReadCsvNode, SourceLine};
pub use filesystem::{FileSystemProviderArgs, FileSystemValueProvider};
pub use provider::{FileValue, FileValueProvider, NoFileValueProvider, ProcessImpact};
