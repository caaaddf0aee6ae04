//! File discovery for the data roots.
//!
//! [`FsWalker`] walks a root recursively with the `ignore` crate and turns
//! every regular file into a [`FileMeta`]. Hidden files and configured
//! ignore patterns are skipped. Unlike a source-code walker it does not
//! consult `.gitignore`: document roots are rarely repositories.

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::FileMeta;

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Data root does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("Data root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Stream of discovered files.
pub type FileStream<'a> = Box<dyn Iterator<Item = FileMeta> + 'a>;

/// Produces the files below a data root.
pub trait FileLister: Send + Sync {
    fn list_files<'a>(&'a self, root: &Path) -> Result<FileStream<'a>, WalkError>;
}

/// Recursive file-system walker.
#[derive(Debug, Clone, Default)]
pub struct FsWalker {
    ignore_patterns: Vec<String>,
}

impl FsWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }
}

impl FileLister for FsWalker {
    fn list_files<'a>(&'a self, root: &Path) -> Result<FileStream<'a>, WalkError> {
        if !root.exists() {
            return Err(WalkError::MissingRoot(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(WalkError::NotADirectory(root.to_path_buf()));
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .follow_links(false);

        if !self.ignore_patterns.is_empty() {
            let mut overrides = OverrideBuilder::new(root);
            for pattern in &self.ignore_patterns {
                overrides
                    .add(&format!("!{pattern}"))
                    .map_err(|e| WalkError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?;
            }
            let overrides = overrides.build().map_err(|e| WalkError::InvalidPattern {
                pattern: self.ignore_patterns.join(", "),
                reason: e.to_string(),
            })?;
            builder.overrides(overrides);
        }

        let files = builder
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!(target: "walker", "skipping entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                let modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
                Some(FileMeta::new(entry.into_path(), metadata.len(), modified))
            });

        Ok(Box::new(files))
    }
}
