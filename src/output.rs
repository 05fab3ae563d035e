//! Console output and logging.
//!
//! All user-facing output goes through a [`Logger`] built once by the CLI and
//! passed by reference to the components that report progress. There is no
//! global logging state; library callers and tests use [`Logger::silent`].

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fmt::Display;

/// How much the logger prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Nothing at all.
    Silent,
    /// Warnings and errors only.
    Quiet,
    Normal,
    /// Includes per-file debug lines.
    Verbose,
}

/// Styled console logger.
///
/// - success messages: green ✓
/// - errors: red ✗ on stderr
/// - warnings: yellow ⚠ on stderr
/// - debug lines: dimmed, only when verbose
#[derive(Debug, Clone)]
pub struct Logger {
    verbosity: Verbosity,
}

impl Logger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Picks the verbosity from the `--verbose` / `--quiet` flags.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        let verbosity = match (verbose, quiet) {
            (_, true) => Verbosity::Quiet,
            (true, false) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        };
        Self::new(verbosity)
    }

    /// A logger that prints nothing.
    pub fn silent() -> Self {
        Self::new(Verbosity::Silent)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    pub fn debug(&self, message: impl Display) {
        if self.enabled(Verbosity::Verbose) {
            println!("{}", message.to_string().dimmed());
        }
    }

    pub fn info(&self, message: impl Display) {
        if self.enabled(Verbosity::Normal) {
            println!("{}", message.to_string().cyan());
        }
    }

    /// Unstyled line.
    pub fn plain(&self, message: impl Display) {
        if self.enabled(Verbosity::Normal) {
            println!("{}", message);
        }
    }

    pub fn success(&self, message: impl Display) {
        if self.enabled(Verbosity::Normal) {
            println!("{} {}", "✓".green(), message);
        }
    }

    pub fn warning(&self, message: impl Display) {
        if self.enabled(Verbosity::Quiet) {
            eprintln!("{} {}", "⚠".yellow(), message);
        }
    }

    pub fn error(&self, message: impl Display) {
        if self.enabled(Verbosity::Quiet) {
            eprintln!("{} {}", "✗".red(), message);
        }
    }

    pub fn header(&self, header: &str) {
        if self.enabled(Verbosity::Normal) {
            println!("\n{}", header.bold());
        }
    }

    pub fn dry_run_notice(&self, message: impl Display) {
        if self.enabled(Verbosity::Normal) {
            println!("{}", format!("[DRY RUN] {}", message).yellow());
        }
    }

    /// Progress bar for `total` items.
    ///
    /// Hidden unless the logger prints normal output and no per-file debug
    /// lines would interleave with it.
    pub fn progress_bar(&self, total: u64) -> ProgressBar {
        if self.verbosity != Verbosity::Normal {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }

    /// Prints the number of files per group.
    pub fn summary_table(&self, group_counts: &BTreeMap<String, usize>, total_files: usize) {
        if !self.enabled(Verbosity::Normal) {
            return;
        }
        self.header("SUMMARY");

        let width = group_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(5);

        println!("{:<width$} | {}", "Group".bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));
        for (group, count) in group_counts {
            println!(
                "{:<width$} | {} {}",
                group,
                count.to_string().green(),
                plural(*count),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = width
        );
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Verbosity::Normal)
    }
}

/// "file" or "files".
pub fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
