//! Recursive directory scanning.
//!
//! Every regular file under the base directory is collected with its path
//! relative to the base and grouped by lowercased extension. Entries in each
//! directory are visited in file-name order, so the order of each group is
//! stable between runs.

use crate::config::CompiledFilters;
use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Errors that can occur while scanning the base directory.
#[derive(Debug)]
pub enum ScanError {
    /// The base directory is missing or is not a directory.
    InvalidBasePath { path: PathBuf },
    /// A directory entry could not be read during the walk.
    Walk {
        path: Option<PathBuf>,
        source: walkdir::Error,
    },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBasePath { path } => {
                write!(f, "Not a directory: {}", path.display())
            }
            Self::Walk {
                path: Some(path),
                source,
            } => write!(f, "Failed to scan {}: {}", path.display(), source),
            Self::Walk { path: None, source } => write!(f, "Failed to scan: {}", source),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Walk { source, .. } => Some(source),
            Self::InvalidBasePath { .. } => None,
        }
    }
}

/// Scanned files grouped by lowercased extension, in discovery order.
#[derive(Debug, Default, Clone)]
pub struct ExtensionIndex {
    by_extension: BTreeMap<String, Vec<PathBuf>>,
    without_extension: Vec<PathBuf>,
    filtered_out: usize,
}

impl ExtensionIndex {
    /// Records a file under its extension, or in the no-extension list.
    pub fn push(&mut self, relative: PathBuf) {
        match extension_of(&relative) {
            Some(ext) => self.by_extension.entry(ext).or_default().push(relative),
            None => self.without_extension.push(relative),
        }
    }

    /// Extension groups in sorted extension order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.by_extension
            .iter()
            .map(|(ext, files)| (ext.as_str(), files.as_slice()))
    }

    pub fn files_with_extension(&self, extension: &str) -> &[PathBuf] {
        self.by_extension
            .get(extension)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Files whose extension is missing or could not be determined.
    pub fn without_extension(&self) -> &[PathBuf] {
        &self.without_extension
    }

    /// Number of files skipped by the configured filters.
    pub fn filtered_out(&self) -> usize {
        self.filtered_out
    }

    pub fn total_files(&self) -> usize {
        self.by_extension.values().map(Vec::len).sum::<usize>() + self.without_extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_files() == 0
    }
}

/// Lowercased extension of a path, or `None` when it has none (or it is not UTF-8).
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
}

/// Walks `base` recursively and groups every kept file by extension.
///
/// Symbolic links are not followed. Hidden directories are skipped unless the
/// filters enable hidden files.
pub fn scan_directory(base: &Path, filters: &CompiledFilters) -> Result<ExtensionIndex, ScanError> {
    if !base.is_dir() {
        return Err(ScanError::InvalidBasePath {
            path: base.to_path_buf(),
        });
    }

    let mut index = ExtensionIndex::default();
    let walker = WalkDir::new(base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || filters.should_descend(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry.map_err(|e| ScanError::Walk {
            path: e.path().map(Path::to_path_buf),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(base) else {
            continue;
        };
        if filters.should_include(relative) {
            index.push(relative.to_path_buf());
        } else {
            index.filtered_out += 1;
        }
    }

    debug!(
        "scanned {}: {} files in {} extension groups, {} without extension, {} filtered out",
        base.display(),
        index.total_files(),
        index.by_extension.len(),
        index.without_extension.len(),
        index.filtered_out
    );
    Ok(index)
}
