use std::path::PathBuf;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{EtlError, EtlResult};
use crate::execution::{CancellationToken, ExecutionContext};

use super::provider::{FileValue, FileValueProvider, ProcessImpact};

fn default_file_pattern() -> String {
    "*".to_string()
}

/// Configuration of a [`FileSystemValueProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemProviderArgs {
    pub root_folder: PathBuf,
    /// Glob matched against file names (not paths), e.g. `*.csv`.
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    /// Also list files of sub-folders.
    #[serde(default)]
    pub recursive: bool,
}

impl FileSystemProviderArgs {
    pub fn new(root_folder: impl Into<PathBuf>, file_pattern: impl Into<String>) -> Self {
        Self {
            root_folder: root_folder.into(),
            file_pattern: file_pattern.into(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Parse arguments from JSON, e.g. `{"root_folder": "in", "file_pattern": "*.csv"}`.
    pub fn from_json_str(json: &str) -> EtlResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Lists the files of a local folder whose names match a glob pattern.
#[derive(Debug, Clone)]
pub struct FileSystemValueProvider {
    code: String,
    args: FileSystemProviderArgs,
}

impl FileSystemValueProvider {
    pub fn new(code: impl Into<String>, args: FileSystemProviderArgs) -> Self {
        Self {
            code: code.into(),
            args,
        }
    }

    pub fn args(&self) -> &FileSystemProviderArgs {
        &self.args
    }

    /// Matching files, sorted by their name relative to the root folder.
    pub fn list_files(&self) -> EtlResult<Vec<FileValue>> {
        let pattern = Pattern::new(&self.args.file_pattern)?;
        let max_depth = if self.args.recursive { usize::MAX } else { 1 };

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.args.root_folder).min_depth(1).max_depth(max_depth) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if !pattern.matches(&file_name) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.args.root_folder)
                .unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size = entry.metadata()?.len();
            files.push(FileValue::new(name, entry.path(), size));
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

impl FileValueProvider for FileSystemValueProvider {
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
        push: &mut dyn FnMut(FileValue),
        cancel: &CancellationToken,
        context: &ExecutionContext,
    ) -> EtlResult<()> {
        let files = self.list_files()?;
        debug!(code = %self.code, root = %self.args.root_folder.display(), files = files.len(), "listed files");
        for file in files {
            if cancel.is_cancelled() || context.should_stop() {
                warn!(code = %self.code, "file listing interrupted");
                break;
            }
            push(file);
        }
        Ok(())
    }

    fn test(&self) -> EtlResult<()> {
        Pattern::new(&self.args.file_pattern).map_err(|e| EtlError::ProviderTestFailed {
            code: self.code.clone(),
            message: format!("invalid file pattern '{}': {e}", self.args.file_pattern),
        })?;
        if !self.args.root_folder.is_dir() {
            return Err(EtlError::ProviderTestFailed {
                code: self.code.clone(),
                message: format!("'{}' is not a folder", self.args.root_folder.display()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::FileSystemProviderArgs;

    #[test]
    fn args_from_json_use_defaults() {
        let args = FileSystemProviderArgs::from_json_str(r#"{"root_folder": "data/in"}"#).unwrap();
        assert_eq!(args, FileSystemProviderArgs::new("data/in", "*"));
        assert!(!args.recursive);

        let args =
            FileSystemProviderArgs::from_json_str(r#"{"root_folder": "in", "file_pattern": "*.csv", "recursive": true}"#)
                .unwrap();
        assert_eq!(args.file_pattern, "*.csv");
        assert!(args.recursive);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = FileSystemProviderArgs::from_json_str("{").unwrap_err();
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
