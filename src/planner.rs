//! Organization planning.
//!
//! The planner turns an [`ExtensionIndex`] into a [`PlanTree`]: every
//! supported file gets a capture time, and from it a year folder, a
//! year-month folder and a canonical file name
//! `{YYYYMMDD_HHMMSS}_{size}.{ext}`. Files that end up with the same canonical
//! name share a bucket; the first one discovered is kept under that name and
//! the rest are backed up by the executor.

use crate::config::OrganizeSettings;
use crate::resolver::PathResolver;
use crate::scanner::ExtensionIndex;
use crate::timestamp::{MetadataError, MetadataReader, RawTimestamp, TimestampError};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Errors that abort planning. Each one names the file it was raised for.
#[derive(Debug)]
pub enum PlanError {
    /// Size or modification time could not be read.
    Stat { path: PathBuf, source: io::Error },
    /// Embedded metadata exists but could not be read.
    Metadata {
        path: PathBuf,
        source: MetadataError,
    },
    /// A metadata timestamp is not a valid calendar time.
    Timestamp {
        path: PathBuf,
        source: TimestampError,
    },
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stat { path, source } => {
                write!(f, "Failed to read file info for {}: {}", path.display(), source)
            }
            Self::Metadata { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Timestamp { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stat { source, .. } => Some(source),
            Self::Metadata { source, .. } => Some(source),
            Self::Timestamp { source, .. } => Some(source),
        }
    }
}

/// Result type for planning.
pub type PlanResult<T> = Result<T, PlanError>;

/// Where a file lands: year folder, year-month folder and canonical name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub year: String,
    pub year_month: String,
    pub canonical_name: String,
}

impl BucketKey {
    pub fn new(captured: NaiveDateTime, size: u64, extension: &str) -> Self {
        Self {
            year: captured.format("%Y").to_string(),
            year_month: captured.format("%Y%m").to_string(),
            canonical_name: format!("{}_{}.{}", captured.format("%Y%m%d_%H%M%S"), size, extension),
        }
    }

    /// `{year}/{year_month}`, relative to the base directory.
    pub fn dir(&self) -> PathBuf {
        Path::new(&self.year).join(&self.year_month)
    }

    /// `{year}/{year_month}/{canonical_name}`, relative to the base directory.
    pub fn destination(&self) -> PathBuf {
        self.dir().join(&self.canonical_name)
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.year, self.year_month, self.canonical_name)
    }
}

type MonthBuckets = BTreeMap<String, Vec<PathBuf>>;

/// Year → year-month → canonical name → source files in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanTree {
    years: BTreeMap<String, BTreeMap<String, MonthBuckets>>,
}

impl PlanTree {
    fn insert(&mut self, key: BucketKey, relative: PathBuf) {
        self.years
            .entry(key.year)
            .or_default()
            .entry(key.year_month)
            .or_default()
            .entry(key.canonical_name)
            .or_default()
            .push(relative);
    }

    /// Every bucket in year, year-month, canonical-name order.
    pub fn buckets(&self) -> impl Iterator<Item = (BucketKey, &[PathBuf])> {
        self.years.iter().flat_map(|(year, months)| {
            months.iter().flat_map(move |(year_month, names)| {
                names.iter().map(move |(name, sources)| {
                    (
                        BucketKey {
                            year: year.clone(),
                            year_month: year_month.clone(),
                            canonical_name: name.clone(),
                        },
                        sources.as_slice(),
                    )
                })
            })
        })
    }

    pub fn bucket(&self, year: &str, year_month: &str, canonical_name: &str) -> Option<&[PathBuf]> {
        self.years
            .get(year)?
            .get(year_month)?
            .get(canonical_name)
            .map(Vec::as_slice)
    }

    pub fn years(&self) -> impl Iterator<Item = &str> {
        self.years.keys().map(String::as_str)
    }

    /// Number of files per year-month folder.
    pub fn month_counts(&self) -> BTreeMap<String, usize> {
        self.years
            .values()
            .flat_map(|months| months.iter())
            .map(|(year_month, names)| (year_month.clone(), names.values().map(Vec::len).sum()))
            .collect()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets().count()
    }

    pub fn file_count(&self) -> usize {
        self.buckets().map(|(_, sources)| sources.len()).sum()
    }

    /// Number of files that will be moved to the backup folder.
    pub fn duplicate_count(&self) -> usize {
        self.buckets()
            .map(|(_, sources)| sources.len().saturating_sub(1))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// A group of scanned files that is not planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredGroup {
    /// Lowercased extension, `None` for files without one.
    pub extension: Option<String>,
    pub count: usize,
}

/// A file left out of the plan because no capture time could be derived.
#[derive(Debug, Clone)]
pub struct UnresolvedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// The plan and everything that was left out of it.
#[derive(Debug, Clone, Default)]
pub struct PlanOutcome {
    pub tree: PlanTree,
    pub ignored: Vec<IgnoredGroup>,
    pub unresolved: Vec<UnresolvedFile>,
}

/// Receives "processed N of M" updates while an extension group is planned.
pub trait PlanProgress {
    fn begin(&mut self, extension: &str, total: usize);
    fn advance(&mut self, processed: usize, total: usize);
    fn finish(&mut self);
}

/// Discards progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl PlanProgress for NoProgress {
    fn begin(&mut self, _extension: &str, _total: usize) {}
    fn advance(&mut self, _processed: usize, _total: usize) {}
    fn finish(&mut self) {}
}

/// Builds a [`PlanTree`] from scanned files.
pub struct Planner<'a, M> {
    settings: &'a OrganizeSettings,
    resolver: &'a PathResolver,
    metadata: M,
}

impl<'a, M: MetadataReader> Planner<'a, M> {
    pub fn new(settings: &'a OrganizeSettings, resolver: &'a PathResolver, metadata: M) -> Self {
        Self {
            settings,
            resolver,
            metadata,
        }
    }

    /// Plans every supported file in `index`.
    ///
    /// Unsupported extensions are reported in [`PlanOutcome::ignored`] and
    /// files without a usable capture time in [`PlanOutcome::unresolved`].
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] naming the offending file if its size cannot be
    /// read or its embedded metadata is malformed.
    pub fn plan(
        &self,
        index: ExtensionIndex,
        progress: &mut dyn PlanProgress,
    ) -> PlanResult<PlanOutcome> {
        let mut outcome = PlanOutcome::default();

        for (extension, files) in index.groups() {
            if !self.settings.is_target(extension) {
                info!("skipping .{} files: {} not in the target list", extension, files.len());
                outcome.ignored.push(IgnoredGroup {
                    extension: Some(extension.to_string()),
                    count: files.len(),
                });
                continue;
            }

            progress.begin(extension, files.len());
            for (processed, relative) in files.iter().enumerate() {
                match self.plan_file(relative, extension)? {
                    Ok(key) => {
                        debug!("{} -> {}", relative.display(), key);
                        outcome.tree.insert(key, relative.clone());
                    }
                    Err(reason) => {
                        warn!("skipping {}: {}", relative.display(), reason);
                        outcome.unresolved.push(UnresolvedFile {
                            path: relative.clone(),
                            reason,
                        });
                    }
                }
                progress.advance(processed + 1, files.len());
            }
            progress.finish();
        }

        let without_extension = index.without_extension().len();
        if without_extension > 0 {
            info!("skipping {} files without extension", without_extension);
            outcome.ignored.push(IgnoredGroup {
                extension: None,
                count: without_extension,
            });
        }

        info!(
            "planned {} files into {} buckets ({} duplicates, {} unresolved)",
            outcome.tree.file_count(),
            outcome.tree.bucket_count(),
            outcome.tree.duplicate_count(),
            outcome.unresolved.len()
        );
        Ok(outcome)
    }

    /// Derives the bucket of one file.
    ///
    /// The outer error aborts planning; the inner one is a reason to skip the file.
    fn plan_file(&self, relative: &Path, extension: &str) -> PlanResult<Result<BucketKey, String>> {
        let path = self.resolver.resolve(relative);
        let file_info = fs::metadata(&path).map_err(|source| PlanError::Stat {
            path: path.clone(),
            source,
        })?;

        let from_metadata = if self.settings.reads_metadata(extension) {
            self.read_capture_time(&path)?
        } else {
            None
        };

        let raw = match from_metadata {
            Some(raw) => raw,
            None => match file_info.modified() {
                Ok(modified) => RawTimestamp::from_system_time(modified),
                Err(e) => return Ok(Err(format!("modification time unavailable: {}", e))),
            },
        };

        let captured = match raw.resolve() {
            Ok(captured) => captured,
            Err(e @ TimestampError::OutOfRange { .. }) => return Ok(Err(e.to_string())),
            Err(source) => return Err(PlanError::Timestamp { path, source }),
        };

        Ok(Ok(BucketKey::new(captured, file_info.len(), extension)))
    }

    fn read_capture_time(&self, path: &Path) -> PlanResult<Option<RawTimestamp>> {
        let file = File::open(path).map_err(|source| PlanError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let fields = self
            .metadata
            .read_capture_fields(&mut reader)
            .map_err(|source| PlanError::Metadata {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(fields.and_then(|fields| fields.capture_timestamp()))
    }
}
