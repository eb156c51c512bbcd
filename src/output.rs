//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking while planning, and the plan summary table.

use crate::executor::{MoveKind, Step};
use crate::planner::PlanProgress;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for planning
/// - Summary tables with statistics
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use phototidy::output::OutputFormatter;
    /// OutputFormatter::success("Plan executed");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar for one extension group.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use phototidy::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100, "jpg");
    /// pb.inc(1);
    /// pb.finish();
    /// ```
    pub fn create_progress_bar(total: u64, extension: &str) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {prefix:>5} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        pb.set_prefix(extension.to_string());
        pb
    }

    /// Prints one executor step, prefixed in preview mode.
    pub fn step(step: &Step, preview: bool) {
        let line = match step {
            Step::CreateDirectory { path } => format!("mkdir {}", path.display()),
            Step::AlreadyInPlace { path } => format!("keep  {} (already in place)", path.display()),
            Step::Move(op) => {
                let verb = match op.kind {
                    MoveKind::Canonical => "move ",
                    MoveKind::Backup => "backup",
                };
                let missing = if op.source_exists { "" } else { " (source missing)" };
                format!(
                    "{} {} => {}{}",
                    verb,
                    op.source.display(),
                    op.destination.display(),
                    missing
                )
            }
        };

        if preview {
            Self::dry_run_notice(&line);
        } else {
            println!("  {} {}", "→".dimmed(), line);
        }
    }

    /// Prints a summary table with planned file counts per year-month folder.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use phototidy::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("202305".to_string(), 15);
    /// counts.insert("202306".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23, 2);
    /// ```
    pub fn summary_table(month_counts: &BTreeMap<String, usize>, total_files: usize, duplicates: usize) {
        Self::header("PLAN SUMMARY");

        let width = "Folder".len().max(
            month_counts
                .keys()
                .map(|year_month| year_month.len() + 5)
                .max()
                .unwrap_or(0),
        );

        println!(
            "{:<width$} | {}",
            "Folder".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));

        for (year_month, count) in month_counts {
            let folder = format!("{}/{}", &year_month[..4.min(year_month.len())], year_month);
            println!(
                "{:<width$} | {} {}",
                folder,
                count.to_string().green(),
                if *count == 1 { "file" } else { "files" },
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            if total_files == 1 { "file" } else { "files" },
            width = width
        );
        if duplicates > 0 {
            println!(
                "{:<width$} | {} to backup",
                "Duplicates".bold(),
                duplicates.to_string().yellow(),
                width = width
            );
        }
    }
}

/// Renders planning progress as one indicatif bar per extension group.
#[derive(Default)]
pub struct ProgressBars {
    current: Option<ProgressBar>,
}

impl PlanProgress for ProgressBars {
    fn begin(&mut self, extension: &str, total: usize) {
        self.finish();
        self.current = Some(OutputFormatter::create_progress_bar(total as u64, extension));
    }

    fn advance(&mut self, processed: usize, _total: usize) {
        if let Some(bar) = &self.current {
            bar.set_position(processed as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.current.take() {
            bar.finish();
        }
    }
}
