//! phototidy - sort photos and videos into year/month folders
//!
//! This library scans a directory tree, derives a capture time for every
//! media file (EXIF first, modification time as fallback), plans a
//! `YYYY/YYYYMM/{YYYYMMDD_HHMMSS}_{size}.{ext}` layout in which same-time,
//! same-size files collide into one bucket, and then previews or executes the
//! moves. Colliding duplicates are moved to a per-folder backup directory,
//! never deleted.

pub mod cli;
pub mod config;
pub mod executor;
pub mod output;
pub mod planner;
pub mod prompt;
pub mod resolver;
pub mod scanner;
pub mod timestamp;

pub use config::{CompiledConfig, CompiledFilters, Config, ConfigError, OrganizeSettings};
pub use executor::{ExecutionReport, Executor, OrganizeError, PlanMode};
pub use planner::{BucketKey, PlanError, PlanOutcome, PlanTree, Planner};
pub use resolver::PathResolver;
pub use scanner::{ExtensionIndex, ScanError, scan_directory};
pub use timestamp::{CaptureField, CaptureFields, ExifReader, MetadataReader, RawTimestamp};

pub use cli::{Cli, RunSummary, organize_directory, run_cli_with_config};
