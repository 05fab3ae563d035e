//! Command-line interface for sortdir.
//!
//! This module handles:
//! - Argument parsing
//! - Merging arguments with the configuration file
//! - Dispatching to organize, dry-run or undo
//! - Mapping outcomes to an exit status

use crate::classifier::{DateField, DateGranularity, GroupBy, Strategy};
use crate::config::{ConfigError, DEFAULT_DEST_DIR, FileConfig, OrganizeConfig};
use crate::executor::Executor;
use crate::manifest::{Manifest, ManifestEntry, ManifestError, ManifestHeader, ManifestWriter};
use crate::output::{Logger, plural};
use crate::planner::{ActionKind, Plan, Planner};
use crate::scanner::Scanner;
use crate::undo::Undoer;
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Group files into folders by extension, MIME type, or date.
#[derive(Debug, Clone, Parser)]
#[command(name = "sortdir", version, about)]
pub struct Args {
    /// Directory to organize
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Grouping strategy [default: ext]
    #[arg(long, value_enum)]
    pub by: Option<GroupBy>,

    /// Timestamp used by the date strategy [default: mtime]
    #[arg(long, value_enum)]
    pub date_field: Option<DateField>,

    /// Folder depth of the date strategy [default: month]
    #[arg(long, value_enum)]
    pub date_granularity: Option<DateGranularity>,

    /// Base directory for the group folders [default: PATH/organized]
    #[arg(long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Copy files instead of moving them
    #[arg(long)]
    pub copy: bool,

    /// Show what would happen without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Manifest file [default: PATH/.sortdir_manifest.jsonl]
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Only organize files matching this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub include: Vec<String>,

    /// Skip files matching this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Maximum directory depth below PATH; 0 means PATH's own files only
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Revert the run recorded in the manifest
    #[arg(long)]
    pub undo: bool,

    /// Replace existing files at the destination instead of renaming
    #[arg(long)]
    pub overwrite: bool,

    /// Include hidden files and directories
    #[arg(long)]
    pub hidden: bool,

    /// Keep the manifest after a successful undo
    #[arg(long, requires = "undo")]
    pub keep_manifest: bool,

    /// Configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print every file operation
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Apply,
    DryRun,
    Undo { dry_run: bool },
}

/// Fatal errors. Anything reported here ends the run with exit status 2.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("cannot read directory {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// Outcome of a run that did not fail fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Some actions, plan entries or undo entries failed.
    PartialFailure,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::PartialFailure => 1,
        }
    }

    fn from_success(ok: bool) -> Self {
        if ok {
            RunStatus::Success
        } else {
            RunStatus::PartialFailure
        }
    }
}

/// Exit status for fatal errors.
pub const FATAL_EXIT_CODE: u8 = 2;

impl Args {
    pub fn mode(&self) -> Mode {
        match (self.undo, self.dry_run) {
            (true, dry_run) => Mode::Undo { dry_run },
            (false, true) => Mode::DryRun,
            (false, false) => Mode::Apply,
        }
    }

    /// Resolves the arguments and `file` defaults into a run configuration.
    ///
    /// Flags win over the `[organize]` section. Relative paths from the
    /// command line are taken from the working directory; relative paths in
    /// the configuration file are taken from the organized root.
    pub fn resolve(&self, file: FileConfig) -> Result<OrganizeConfig, CliError> {
        let root = fs::canonicalize(&self.path).map_err(|source| CliError::RootUnreadable {
            path: self.path.clone(),
            source,
        })?;
        if !root.is_dir() {
            return Err(CliError::NotADirectory(root));
        }
        fs::read_dir(&root).map_err(|source| CliError::RootUnreadable {
            path: root.clone(),
            source,
        })?;

        let organize = file.organize;
        let dest = match (&self.dest, organize.dest) {
            (Some(dest), _) => absolutize(dest),
            (None, Some(dest)) => absolutize(&root.join(dest)),
            (None, None) => root.join(DEFAULT_DEST_DIR),
        };

        let mut config = OrganizeConfig::new(root, dest);
        match (&self.manifest, organize.manifest) {
            (Some(path), _) => config.manifest_path = absolutize(path),
            (None, Some(path)) => config.manifest_path = absolutize(&config.root.join(path)),
            (None, None) => {}
        }

        config.strategy = Strategy::from_selectors(
            self.by.or(organize.by).unwrap_or_default(),
            self.date_field.or(organize.date_field).unwrap_or_default(),
            self.date_granularity
                .or(organize.date_granularity)
                .unwrap_or_default(),
        );
        if self.copy || organize.copy.unwrap_or(false) {
            config.action = ActionKind::Copy;
        }
        config.allow_overwrite = self.overwrite || organize.overwrite.unwrap_or(false);
        config.max_depth = self.max_depth.or(organize.max_depth);

        config.filters = file.filters;
        config.filters.enable_hidden_files |= self.hidden;
        config.filters.include.patterns.extend(self.include.iter().cloned());
        config.filters.exclude.patterns.extend(self.exclude.iter().cloned());

        Ok(config)
    }
}

/// Makes `path` absolute, resolving symlinks in whatever part of it exists.
///
/// The destination usually does not exist yet but has to compare equal to
/// the canonical paths the scanner produces.
fn absolutize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if let Ok(canonical) = fs::canonicalize(&absolute) {
        return canonical;
    }
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => absolutize(parent).join(name),
        _ => absolute,
    }
}

/// Runs sortdir with parsed arguments.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use sortdir::cli::{run, Args};
/// use sortdir::output::Logger;
///
/// let args = Args::parse_from(["sortdir", "/path/to/directory", "--dry-run"]);
/// match run(&args, &Logger::default()) {
///     Ok(status) => println!("exit status {}", status.exit_code()),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run(args: &Args, logger: &Logger) -> Result<RunStatus, CliError> {
    let file_config = FileConfig::load(args.config.as_deref())?;
    let config = args.resolve(file_config)?;

    match args.mode() {
        Mode::Apply => organize(&config, logger),
        Mode::DryRun => organize_dry_run(&config, logger),
        Mode::Undo { dry_run } => undo_organization(&config, dry_run, args.keep_manifest, logger),
    }
}

/// Organizes files under the configured root and records a manifest.
pub fn organize(config: &OrganizeConfig, logger: &Logger) -> Result<RunStatus, CliError> {
    logger.info(format_args!(
        "Organizing contents of: {} (by {})",
        config.root.display(),
        config.strategy
    ));

    let plan = build_plan(config, logger)?;
    if plan.is_empty() {
        logger.plain("No files found to organize.");
        return Ok(RunStatus::from_success(plan.errors.is_empty()));
    }

    let dest_created = !config.dest.exists();
    if config.manifest_path.exists() {
        logger.warning(format_args!(
            "Replacing previous manifest {}; the earlier run can no longer be undone.",
            config.manifest_path.display()
        ));
    }
    let header = ManifestHeader::new(
        &config.root,
        &config.dest,
        config.strategy.to_string(),
        config.action,
        dest_created,
    );
    let mut writer = ManifestWriter::create(&config.manifest_path, &header)?;

    let mut report = Executor::new(logger, config.allow_overwrite).apply(&plan, false, &mut writer);

    logger.success(format_args!(
        "Organized {} {} into {}",
        report.succeeded(),
        plural(report.succeeded()),
        config.dest.display()
    ));
    if report.failed() > 0 {
        logger.warning(format_args!(
            "{} {} could not be organized. Please review errors above.",
            report.failed(),
            plural(report.failed())
        ));
    }
    if let Some(e) = report.aborted.take() {
        logger.warning(format_args!(
            "{} planned {} not attempted.",
            report.not_attempted,
            plural(report.not_attempted)
        ));
        return Err(e.into());
    }

    logger.plain(format_args!(
        "Manifest saved to {}. Use 'sortdir {} --undo' to revert changes.",
        writer.path().display(),
        config.root.display()
    ));

    Ok(RunStatus::from_success(
        report.is_complete_success() && plan.errors.is_empty(),
    ))
}

/// Shows what [`organize`] would do without touching the filesystem.
pub fn organize_dry_run(config: &OrganizeConfig, logger: &Logger) -> Result<RunStatus, CliError> {
    logger.dry_run_notice(format_args!(
        "Analyzing contents of: {} (by {})",
        config.root.display(),
        config.strategy
    ));

    let plan = build_plan(config, logger)?;
    if plan.is_empty() {
        logger.plain("No files found to organize.");
        return Ok(RunStatus::from_success(plan.errors.is_empty()));
    }

    let mut preview: Vec<ManifestEntry> = Vec::new();
    let report = Executor::new(logger, config.allow_overwrite).apply(&plan, true, &mut preview);
    logger.summary_table(&plan.group_counts(), report.succeeded());

    logger.success("Dry run complete. No files were modified.");
    logger.plain(format_args!(
        "Run 'sortdir {}' (without --dry-run) to execute the organization.",
        config.root.display()
    ));

    Ok(RunStatus::from_success(plan.errors.is_empty()))
}

/// Scans and plans, reporting skipped entries along the way.
pub fn build_plan(config: &OrganizeConfig, logger: &Logger) -> Result<Plan, CliError> {
    let scanner = Scanner::new(&config.root, config.scan_options()?);

    let mut entries = Vec::new();
    for item in scanner.scan() {
        match item {
            Ok(entry) => entries.push(entry),
            Err(e) => logger.warning(format_args!("Skipping: {}", e)),
        }
    }
    logger.debug(format_args!(
        "Found {} {} to consider",
        entries.len(),
        plural(entries.len())
    ));

    let plan = Planner::new(config.plan_options()).plan(entries);
    for error in &plan.errors {
        logger.error(error);
    }
    for path in &plan.already_in_place {
        logger.debug(format_args!("{} is already in place", path.display()));
    }

    Ok(plan)
}

/// Reverts the run recorded in the configured manifest.
///
/// After a complete real undo the manifest is deleted unless `keep_manifest`
/// is set. On any failure it is kept so the remaining entries can be fixed
/// and retried.
pub fn undo_organization(
    config: &OrganizeConfig,
    dry_run: bool,
    keep_manifest: bool,
    logger: &Logger,
) -> Result<RunStatus, CliError> {
    if dry_run {
        logger.dry_run_notice("Checking what undo would revert...");
    } else {
        logger.info("Undoing previous organization...");
    }

    let manifest = Manifest::load(&config.manifest_path)?;
    logger.debug(format_args!(
        "Manifest from {} ({} entries, by {})",
        manifest.header.created, manifest.entries.len(), manifest.header.strategy
    ));

    let report = Undoer::new(logger).undo(&manifest, dry_run);
    let failed = report.results.len() - report.reversed();

    if dry_run {
        logger.success(format_args!(
            "Dry run complete: {} of {} entries can be undone.",
            report.reversed(),
            report.results.len()
        ));
        return Ok(RunStatus::from_success(failed == 0));
    }

    logger.success(format_args!("Undo complete! Reverted: {}", report.reversed()));
    if !report.pruned_dirs.is_empty() {
        logger.plain(format_args!(
            "  Removed {} empty director{}",
            report.pruned_dirs.len(),
            if report.pruned_dirs.len() == 1 { "y" } else { "ies" }
        ));
    }

    if failed > 0 {
        logger.warning(format_args!("Failed: {}", failed));
        logger.warning("Manifest was NOT deleted due to failures. Please fix the issues and try again.");
        return Ok(RunStatus::PartialFailure);
    }

    if !keep_manifest && let Err(e) = fs::remove_file(&config.manifest_path) {
        logger.warning(format_args!(
            "Could not delete manifest {}: {}",
            config.manifest_path.display(),
            e
        ));
    }

    Ok(RunStatus::Success)
}
