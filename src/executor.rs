/// Plan execution: moving files into the year/year-month hierarchy.
///
/// This module walks a [`PlanTree`] bucket by bucket. One file of each bucket
/// holds its canonical name: the file already there if a previous run put it
/// there, otherwise the first one discovered. Every other file is moved into
/// the bucket's backup folder under its original relative path, unless it
/// already sits in that folder. In preview mode the same steps are reported
/// without touching the filesystem.
use crate::planner::{BucketKey, PlanTree};
use crate::resolver::PathResolver;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Whether the executor touches the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Report the intended operations only.
    Preview,
    /// Perform the moves.
    Execute,
}

/// Why a file is moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// The bucket's original, moved to the canonical name.
    Canonical,
    /// Any other file of the bucket, moved to the backup folder.
    Backup,
}

/// A single file move, planned or performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// The bucket, as `{year}/{year_month}/{canonical_name}`.
    pub bucket: String,
    pub kind: MoveKind,
    /// Path of the file before the move, relative to the base directory.
    pub source: PathBuf,
    /// Path of the file after the move, relative to the base directory.
    pub destination: PathBuf,
    /// Whether the source existed when the step was reported.
    pub source_exists: bool,
}

/// One reported step of an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A missing year-month directory.
    CreateDirectory { path: PathBuf },
    Move(Operation),
    /// The file is already where the plan puts it.
    AlreadyInPlace { path: PathBuf },
}

/// Counts accumulated while a plan is executed or previewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub mode: PlanMode,
    /// Files moved (or to be moved) to a canonical name.
    pub canonical_moves: usize,
    /// Files moved (or to be moved) to a backup folder.
    pub backup_moves: usize,
    /// Files (canonical or backed up) that needed no move.
    pub already_in_place: usize,
    /// Year-month directories created (or to be created).
    pub directories_created: usize,
    /// Directories files were moved out of, relative to the base directory.
    pub vacated_dirs: BTreeSet<PathBuf>,
}

impl ExecutionReport {
    fn new(mode: PlanMode) -> Self {
        Self {
            mode,
            canonical_moves: 0,
            backup_moves: 0,
            already_in_place: 0,
            directories_created: 0,
            vacated_dirs: BTreeSet::new(),
        }
    }

    pub fn total_moves(&self) -> usize {
        self.canonical_moves + self.backup_moves
    }
}

/// Errors that can occur while executing a plan.
#[derive(Debug)]
pub enum OrganizeError {
    /// Failed to create a destination directory.
    DirectoryCreationFailed {
        bucket: String,
        path: PathBuf,
        source: io::Error,
    },
    /// The destination is already taken by another file.
    DestinationExists {
        bucket: String,
        destination: PathBuf,
    },
    /// Failed to move a file.
    FileMoveFailure {
        bucket: String,
        source: PathBuf,
        destination: PathBuf,
        source_error: io::Error,
    },
}

impl std::fmt::Display for OrganizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectoryCreationFailed {
                bucket,
                path,
                source,
            } => {
                write!(
                    f,
                    "Bucket {}: failed to create directory {}: {}",
                    bucket,
                    path.display(),
                    source
                )
            }
            Self::DestinationExists {
                bucket,
                destination,
            } => {
                write!(
                    f,
                    "Bucket {}: destination {} already exists",
                    bucket,
                    destination.display()
                )
            }
            Self::FileMoveFailure {
                bucket,
                source,
                destination,
                source_error,
            } => {
                write!(
                    f,
                    "Bucket {}: failed to move {} to {}: {}",
                    bucket,
                    source.display(),
                    destination.display(),
                    source_error
                )
            }
        }
    }
}

impl std::error::Error for OrganizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DirectoryCreationFailed { source, .. } => Some(source),
            Self::FileMoveFailure { source_error, .. } => Some(source_error),
            Self::DestinationExists { .. } => None,
        }
    }
}

/// Result type for plan execution.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Applies (or previews) a [`PlanTree`] under a base directory.
pub struct Executor<'a> {
    resolver: &'a PathResolver,
    backup_dir: &'a str,
    mode: PlanMode,
}

impl<'a> Executor<'a> {
    pub fn new(resolver: &'a PathResolver, backup_dir: &'a str, mode: PlanMode) -> Self {
        Self {
            resolver,
            backup_dir,
            mode,
        }
    }

    /// Walks every bucket in key order and reports each step to `on_step`.
    ///
    /// In [`PlanMode::Execute`] the first failing move aborts the run; buckets
    /// handled before it stay moved.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use phototidy::executor::{Executor, PlanMode};
    /// use phototidy::planner::PlanTree;
    /// use phototidy::resolver::PathResolver;
    ///
    /// let resolver = PathResolver::new("/path/to/photos");
    /// let executor = Executor::new(&resolver, "bk", PlanMode::Preview);
    /// let report = executor.run(&PlanTree::default(), &mut |step| println!("{:?}", step));
    ///
    /// match report {
    ///     Ok(report) => println!("{} files would move", report.total_moves()),
    ///     Err(e) => eprintln!("Preview failed: {}", e),
    /// }
    /// ```
    pub fn run(
        &self,
        plan: &PlanTree,
        on_step: &mut dyn FnMut(&Step),
    ) -> OrganizeResult<ExecutionReport> {
        let mut report = ExecutionReport::new(self.mode);
        let mut ensured_dirs = BTreeSet::new();

        for (key, sources) in plan.buckets() {
            if sources.is_empty() {
                continue;
            }
            let bucket = key.to_string();

            let dir = key.dir();
            if ensured_dirs.insert(dir.clone()) && !self.resolver.resolve(&dir).is_dir() {
                self.create_dir(&bucket, &dir)?;
                report.directories_created += 1;
                on_step(&Step::CreateDirectory { path: dir.clone() });
            }

            // A file already holding the canonical name stays the original.
            let destination = key.destination();
            let original = canonical_index(sources, &destination);

            let source = &sources[original];
            if *source == destination {
                report.already_in_place += 1;
                on_step(&Step::AlreadyInPlace { path: destination });
            } else {
                let operation = self.relocate(&bucket, MoveKind::Canonical, source, destination)?;
                report.canonical_moves += 1;
                self.record_vacated(&mut report, &operation);
                on_step(&Step::Move(operation));
            }

            let backup_root = dir.join(self.backup_dir);
            for (position, duplicate) in sources.iter().enumerate() {
                if position == original {
                    continue;
                }
                if duplicate.starts_with(&backup_root) {
                    report.already_in_place += 1;
                    on_step(&Step::AlreadyInPlace {
                        path: duplicate.clone(),
                    });
                    continue;
                }
                let destination = self.backup_destination(&key, duplicate);
                let operation = self.relocate(&bucket, MoveKind::Backup, duplicate, destination)?;
                report.backup_moves += 1;
                self.record_vacated(&mut report, &operation);
                on_step(&Step::Move(operation));
            }
        }

        info!(
            "{:?}: {} canonical moves, {} backup moves, {} already in place",
            self.mode, report.canonical_moves, report.backup_moves, report.already_in_place
        );
        Ok(report)
    }

    /// `{year}/{year_month}/{backup_dir}/{original relative path}`.
    pub fn backup_destination(&self, key: &BucketKey, source: &Path) -> PathBuf {
        key.dir().join(self.backup_dir).join(source)
    }

    /// Removes directories emptied by an executed plan, deepest first.
    ///
    /// Each vacated directory and its ancestors are removed while they are
    /// empty. The base directory itself is never removed. Returns the number
    /// of directories removed.
    pub fn prune_vacated_dirs(&self, report: &ExecutionReport) -> usize {
        if self.mode != PlanMode::Execute {
            return 0;
        }

        let mut candidates: BTreeSet<PathBuf> = BTreeSet::new();
        for dir in &report.vacated_dirs {
            candidates.extend(
                dir.ancestors()
                    .filter(|ancestor| !ancestor.as_os_str().is_empty())
                    .map(Path::to_path_buf),
            );
        }

        let mut ordered: Vec<PathBuf> = candidates.into_iter().collect();
        ordered.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

        let mut removed = 0;
        for dir in ordered {
            match fs::remove_dir(self.resolver.resolve(&dir)) {
                Ok(()) => {
                    debug!("removed empty directory {}", dir.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {}
                Err(e) => warn!("could not remove {}: {}", dir.display(), e),
            }
        }
        removed
    }

    fn create_dir(&self, bucket: &str, dir: &Path) -> OrganizeResult<()> {
        if self.mode == PlanMode::Preview {
            return Ok(());
        }
        let path = self.resolver.resolve(dir);
        debug!("creating directory {}", path.display());
        fs::create_dir_all(&path).map_err(|source| OrganizeError::DirectoryCreationFailed {
            bucket: bucket.to_string(),
            path,
            source,
        })
    }

    fn relocate(
        &self,
        bucket: &str,
        kind: MoveKind,
        source: &Path,
        destination: PathBuf,
    ) -> OrganizeResult<Operation> {
        let from = self.resolver.resolve(source);
        let to = self.resolver.resolve(&destination);
        let source_exists = from.is_file();

        if self.mode == PlanMode::Execute {
            if to.exists() {
                return Err(OrganizeError::DestinationExists {
                    bucket: bucket.to_string(),
                    destination: to,
                });
            }
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| OrganizeError::DirectoryCreationFailed {
                    bucket: bucket.to_string(),
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            move_file(&from, &to).map_err(|e| OrganizeError::FileMoveFailure {
                bucket: bucket.to_string(),
                source: from.clone(),
                destination: to.clone(),
                source_error: e,
            })?;
            info!("moved {} -> {}", from.display(), to.display());
        }

        Ok(Operation {
            bucket: bucket.to_string(),
            kind,
            source: source.to_path_buf(),
            destination,
            source_exists,
        })
    }

    fn record_vacated(&self, report: &mut ExecutionReport, operation: &Operation) {
        if let Some(parent) = operation.source.parent()
            && !parent.as_os_str().is_empty()
        {
            report.vacated_dirs.insert(parent.to_path_buf());
        }
    }
}

/// Position of the bucket's original: the source already at `destination`,
/// otherwise the first one discovered.
fn canonical_index(sources: &[PathBuf], destination: &Path) -> usize {
    sources
        .iter()
        .position(|source| source == destination)
        .unwrap_or(0)
}

/// Renames `from` to `to`, copying and deleting when they are on different filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompiledFilters, OrganizeSettings};
    use crate::planner::{NoProgress, Planner};
    use crate::scanner::scan_directory;
    use crate::timestamp::{CaptureFields, MetadataError, MetadataReader};
    use std::io::{BufRead, Seek};
    use tempfile::TempDir;

    /// Every metadata-bearing file was captured at the same instant.
    struct FixedCapture;

    impl MetadataReader for FixedCapture {
        fn read_capture_fields<R: BufRead + Seek>(
            &self,
            _reader: &mut R,
        ) -> Result<Option<CaptureFields>, MetadataError> {
            Ok(Some(CaptureFields {
                datetime_original: Some("2023:05:01 10:00:00".to_string()),
                ..Default::default()
            }))
        }
    }

    fn write_file(base: &Path, relative: &str, content: &[u8]) {
        let path = base.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn plan(base: &Path) -> PlanTree {
        let settings = OrganizeSettings::default();
        let resolver = PathResolver::new(base);
        let index = scan_directory(base, &CompiledFilters::default()).unwrap();
        Planner::new(&settings, &resolver, FixedCapture)
            .plan(index, &mut NoProgress)
            .unwrap()
            .tree
    }

    fn run(base: &Path, tree: &PlanTree, mode: PlanMode) -> (OrganizeResult<ExecutionReport>, Vec<Step>) {
        let resolver = PathResolver::new(base);
        let mut steps = Vec::new();
        let result = Executor::new(&resolver, "bk", mode).run(tree, &mut |step| steps.push(step.clone()));
        (result, steps)
    }

    #[test]
    fn test_execute_moves_canonical_and_backs_up_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "b.jpg", &[1u8; 2048]);
        write_file(base, "c.jpg", &[2u8; 2048]);
        write_file(base, "sub/d.jpg", &[3u8; 2048]);

        let tree = plan(base);
        let (result, _) = run(base, &tree, PlanMode::Execute);
        let report = result.unwrap();

        assert_eq!(report.canonical_moves, 1);
        assert_eq!(report.backup_moves, 2);
        assert_eq!(fs::read(base.join("2023/202305/20230501_100000_2048.jpg")).unwrap(), vec![1u8; 2048]);
        assert!(base.join("2023/202305/bk/c.jpg").is_file());
        assert!(base.join("2023/202305/bk/sub/d.jpg").is_file());
        assert!(!base.join("b.jpg").exists());
        assert!(!base.join("c.jpg").exists());
    }

    #[test]
    fn test_preview_reports_without_touching_files() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "b.jpg", b"same");
        write_file(base, "c.jpg", b"same");

        let tree = plan(base);
        let (result, steps) = run(base, &tree, PlanMode::Preview);
        let report = result.unwrap();

        assert_eq!(report.canonical_moves, 1);
        assert_eq!(report.backup_moves, 1);
        assert_eq!(report.directories_created, 1);
        assert!(base.join("b.jpg").is_file());
        assert!(base.join("c.jpg").is_file());
        assert!(!base.join("2023").exists());

        assert_eq!(
            steps,
            vec![
                Step::CreateDirectory {
                    path: PathBuf::from("2023/202305")
                },
                Step::Move(Operation {
                    bucket: "2023/202305/20230501_100000_4.jpg".to_string(),
                    kind: MoveKind::Canonical,
                    source: PathBuf::from("b.jpg"),
                    destination: PathBuf::from("2023/202305/20230501_100000_4.jpg"),
                    source_exists: true,
                }),
                Step::Move(Operation {
                    bucket: "2023/202305/20230501_100000_4.jpg".to_string(),
                    kind: MoveKind::Backup,
                    source: PathBuf::from("c.jpg"),
                    destination: PathBuf::from("2023/202305/bk/c.jpg"),
                    source_exists: true,
                }),
            ]
        );
    }

    #[test]
    fn test_existing_destination_aborts_with_bucket_name() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "b.jpg", b"new");

        let tree = plan(base);
        fs::create_dir_all(base.join("2023/202305/20230501_100000_3.jpg")).unwrap();

        let (result, _) = run(base, &tree, PlanMode::Execute);
        match result {
            Err(OrganizeError::DestinationExists { bucket, .. }) => {
                assert_eq!(bucket, "2023/202305/20230501_100000_3.jpg")
            }
            other => panic!("expected DestinationExists, got {:?}", other),
        }
        assert!(base.join("b.jpg").is_file());
    }

    #[test]
    fn test_file_already_at_canonical_name_stays() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "2023/202305/20230501_100000_5.jpg", b"12345");

        let tree = plan(base);
        let (result, steps) = run(base, &tree, PlanMode::Execute);
        let report = result.unwrap();

        assert_eq!(report.already_in_place, 1);
        assert_eq!(report.total_moves(), 0);
        assert_eq!(
            steps,
            vec![Step::AlreadyInPlace {
                path: PathBuf::from("2023/202305/20230501_100000_5.jpg")
            }]
        );
        assert!(base.join("2023/202305/20230501_100000_5.jpg").is_file());
    }

    #[test]
    fn test_file_at_canonical_name_wins_over_earlier_discovery() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "2023/202305/20230501_100000_3.jpg", b"old");
        write_file(base, "0_import/new.jpg", b"new");

        let tree = plan(base);
        assert_eq!(
            tree.bucket("2023", "202305", "20230501_100000_3.jpg").unwrap()[0],
            PathBuf::from("0_import/new.jpg")
        );

        let (preview, preview_steps) = run(base, &tree, PlanMode::Preview);
        let (result, steps) = run(base, &tree, PlanMode::Execute);
        let report = result.unwrap();

        assert_eq!(preview.unwrap().backup_moves, 1);
        assert_eq!(preview_steps.len(), steps.len());
        assert_eq!(report.already_in_place, 1);
        assert_eq!(report.canonical_moves, 0);
        assert_eq!(report.backup_moves, 1);
        assert_eq!(
            fs::read(base.join("2023/202305/20230501_100000_3.jpg")).unwrap(),
            b"old"
        );
        assert_eq!(
            fs::read(base.join("2023/202305/bk/0_import/new.jpg")).unwrap(),
            b"new"
        );
    }

    #[test]
    fn test_backed_up_files_stay_in_backup_folder() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "b.jpg", b"bb");
        write_file(base, "c.jpg", b"cc");

        let first = plan(base);
        run(base, &first, PlanMode::Execute).0.unwrap();

        let second = plan(base);
        let (result, steps) = run(base, &second, PlanMode::Execute);
        let report = result.unwrap();

        assert_eq!(report.total_moves(), 0);
        assert_eq!(report.already_in_place, 2);
        assert_eq!(
            steps,
            vec![
                Step::AlreadyInPlace {
                    path: PathBuf::from("2023/202305/20230501_100000_2.jpg")
                },
                Step::AlreadyInPlace {
                    path: PathBuf::from("2023/202305/bk/c.jpg")
                },
            ]
        );
        assert!(base.join("2023/202305/bk/c.jpg").is_file());
    }

    #[test]
    fn test_prune_skips_paths_it_cannot_remove() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "not_a_dir", b"file");

        let resolver = PathResolver::new(base);
        let executor = Executor::new(&resolver, "bk", PlanMode::Execute);
        let mut report = ExecutionReport::new(PlanMode::Execute);
        report.vacated_dirs.insert(PathBuf::from("not_a_dir"));

        assert_eq!(executor.prune_vacated_dirs(&report), 0);
        assert!(base.join("not_a_dir").is_file());
    }

    #[test]
    fn test_missing_source_fails_in_execute_mode() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "gone.jpg", b"x");

        let tree = plan(base);
        fs::remove_file(base.join("gone.jpg")).unwrap();

        let (preview, steps) = run(base, &tree, PlanMode::Preview);
        assert!(preview.is_ok());
        assert!(steps.iter().any(|step| matches!(
            step,
            Step::Move(Operation {
                source_exists: false,
                ..
            })
        )));

        let (result, _) = run(base, &tree, PlanMode::Execute);
        assert!(matches!(result, Err(OrganizeError::FileMoveFailure { .. })));
    }

    #[test]
    fn test_prune_removes_only_emptied_directories() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        write_file(base, "trip/day1/a.jpg", b"a");
        write_file(base, "trip/day2/b.jpg", b"bb");
        write_file(base, "trip/day2/notes.txt", b"keep");

        let tree = plan(base);
        let resolver = PathResolver::new(base);
        let executor = Executor::new(&resolver, "bk", PlanMode::Execute);
        let report = executor.run(&tree, &mut |_| {}).unwrap();
        let removed = executor.prune_vacated_dirs(&report);

        assert_eq!(removed, 1);
        assert!(!base.join("trip/day1").exists());
        assert!(base.join("trip/day2/notes.txt").is_file());
        assert!(base.is_dir());
    }
}
