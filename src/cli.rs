//! Command-line interface module for phototidy.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Configuration loading
//! - Scan, plan and execute orchestration
//! - Reporting to the terminal

use crate::config::{CompiledConfig, Config};
use crate::executor::{ExecutionReport, Executor, PlanMode};
use crate::output::{OutputFormatter, ProgressBars};
use crate::planner::{PlanOutcome, Planner};
use crate::prompt::{EXECUTE_PLAN_QUESTION, Prompter, SHOW_PLAN_QUESTION};
use crate::resolver::PathResolver;
use crate::scanner::scan_directory;
use crate::timestamp::ExifReader;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Sort photos and videos into YYYY/YYYYMM folders by capture time.
#[derive(Debug, Parser)]
#[command(name = "phototidy", version, about)]
pub struct Cli {
    /// Directory to organize. Asked for interactively when omitted.
    pub directory: Option<PathBuf>,

    /// Configuration file (defaults to ./.phototidyrc.toml, then ~/.config/phototidy/config.toml).
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show the plan without moving anything.
    #[arg(long, conflicts_with = "yes")]
    pub dry_run: bool,

    /// Show and execute the plan without asking.
    #[arg(short, long)]
    pub yes: bool,

    /// Remove directories left empty after the plan is executed.
    #[arg(long)]
    pub prune_empty: bool,
}

/// What a finished run did.
#[derive(Debug)]
pub struct RunSummary {
    pub plan: PlanOutcome,
    /// Report of the preview, if the plan was shown.
    pub preview: Option<ExecutionReport>,
    /// Report of the execution, if the plan was executed.
    pub execution: Option<ExecutionReport>,
    /// Directories removed after execution.
    pub pruned_dirs: usize,
}

/// Runs the organizer on `dir_path`, loading configuration from `config_path`
/// or the default locations.
///
/// # Examples
///
/// ```no_run
/// use phototidy::cli::run_cli_with_config;
/// use phototidy::prompt::PresetAnswers;
/// use std::path::Path;
///
/// let result = run_cli_with_config(
///     Path::new("/path/to/photos"),
///     None,
///     false,
///     &mut PresetAnswers::preview(),
/// );
/// match result {
///     Ok(summary) => println!("{} files planned", summary.plan.tree.file_count()),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli_with_config(
    dir_path: &Path,
    config_path: Option<&Path>,
    prune_empty: bool,
    prompter: &mut dyn Prompter,
) -> Result<RunSummary, String> {
    let config =
        Config::load(config_path).map_err(|e| format!("Error loading configuration: {}", e))?;
    let mut compiled = config
        .compile()
        .map_err(|e| format!("Error compiling configuration: {}", e))?;
    compiled.settings = compiled.settings.with_prune_empty_dirs(prune_empty);

    organize_directory(dir_path, &compiled, prompter)
}

/// Scans `base_path`, builds the plan, then shows and executes it as the
/// prompter decides.
///
/// This function:
/// 1. Scans the directory tree and groups files by extension
/// 2. Derives a capture time and bucket for every supported file
/// 3. Asks whether to show the plan, and previews it
/// 4. Asks whether to execute the plan, and executes it
/// 5. Optionally removes directories the moves left empty
pub fn organize_directory(
    base_path: &Path,
    config: &CompiledConfig,
    prompter: &mut dyn Prompter,
) -> Result<RunSummary, String> {
    OutputFormatter::info(&format!("Organizing contents of: {}", base_path.display()));

    let index = scan_directory(base_path, &config.filters).map_err(|e| e.to_string())?;
    if index.filtered_out() > 0 {
        OutputFormatter::plain(&format!(
            "{} files excluded by filters",
            index.filtered_out()
        ));
    }

    let resolver = PathResolver::new(base_path);
    let planner = Planner::new(&config.settings, &resolver, ExifReader);
    let plan = planner
        .plan(index, &mut ProgressBars::default())
        .map_err(|e| format!("Planning failed: {}", e))?;
    report_plan(&plan);

    let mut summary = RunSummary {
        plan,
        preview: None,
        execution: None,
        pruned_dirs: 0,
    };

    if summary.plan.tree.is_empty() {
        OutputFormatter::warning("No files found to organize.");
        return Ok(summary);
    }

    let executor_for = |mode| Executor::new(&resolver, config.settings.backup_dir(), mode);

    if prompter.confirm(SHOW_PLAN_QUESTION)? {
        OutputFormatter::header("PLAN");
        let report = executor_for(PlanMode::Preview)
            .run(&summary.plan.tree, &mut |step| OutputFormatter::step(step, true))
            .map_err(|e| e.to_string())?;
        print_counts(&report);
        summary.preview = Some(report);
    }

    if !prompter.confirm(EXECUTE_PLAN_QUESTION)? {
        OutputFormatter::warning("Plan not executed. No files were moved.");
        return Ok(summary);
    }

    OutputFormatter::header("EXECUTING");
    let executor = executor_for(PlanMode::Execute);
    let report = executor
        .run(&summary.plan.tree, &mut |step| OutputFormatter::step(step, false))
        .map_err(|e| format!("Execution aborted: {}", e))?;
    print_counts(&report);

    if config.settings.prune_empty_dirs() {
        summary.pruned_dirs = executor.prune_vacated_dirs(&report);
        if summary.pruned_dirs > 0 {
            OutputFormatter::plain(&format!(
                "Removed {} empty directories",
                summary.pruned_dirs
            ));
        }
    }
    summary.execution = Some(report);

    OutputFormatter::success("Organization complete!");
    Ok(summary)
}

fn report_plan(plan: &PlanOutcome) {
    for group in &plan.ignored {
        let count = group.count;
        let files = if count == 1 { "file" } else { "files" };
        match &group.extension {
            Some(ext) => {
                OutputFormatter::plain(&format!("Skipping .{} ({} {}): not a media type", ext, count, files))
            }
            None => OutputFormatter::plain(&format!("Skipping {} {} without extension", count, files)),
        }
    }

    for unresolved in &plan.unresolved {
        OutputFormatter::warning(&format!(
            "No capture time for {}: {}",
            unresolved.path.display(),
            unresolved.reason
        ));
    }

    if !plan.tree.is_empty() {
        OutputFormatter::summary_table(
            &plan.tree.month_counts(),
            plan.tree.file_count(),
            plan.tree.duplicate_count(),
        );
    }
}

fn print_counts(report: &ExecutionReport) {
    let prefix = match report.mode {
        PlanMode::Preview => "would move",
        PlanMode::Execute => "moved",
    };
    OutputFormatter::plain(&format!(
        "\n{} {} files to their new names, {} duplicates to backup",
        prefix, report.canonical_moves, report.backup_moves
    ));
    if report.already_in_place > 0 {
        OutputFormatter::plain(&format!("{} files already in place", report.already_in_place));
    }
}
