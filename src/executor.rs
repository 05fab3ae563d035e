//! Carrying out a plan.
//!
//! Execution is best-effort: a failed action is recorded and the executor
//! moves on to the next one. Every successful action is handed to the
//! manifest sink right away, so the manifest always describes exactly the
//! actions that took effect.
use crate::manifest::{ManifestEntry, ManifestError, ManifestSink};
use crate::output::Logger;
use crate::planner::{ActionKind, Plan, PlannedAction};
use crate::transfer::{self, TransferError, TransferMethod};
use chrono::Utc;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single planned action.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Failed to create the destination directory.
    #[error("cannot create directory {}: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source vanished between planning and execution.
    #[error("source {} no longer exists", .0.display())]
    SourceMissing(PathBuf),

    /// The manifest could not store this path, so the action is not taken.
    #[error("{} is not valid UTF-8 and cannot be recorded for undo", .0.display())]
    Unrecordable(PathBuf),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// A planned action that did not take effect.
#[derive(Debug)]
pub struct ActionFailure {
    pub action: PlannedAction,
    pub error: ApplyError,
}

/// Outcome of applying a plan.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub dry_run: bool,
    /// Entries for the actions that succeeded (or would, in a dry run), in
    /// execution order.
    pub completed: Vec<ManifestEntry>,
    pub failures: Vec<ActionFailure>,
    /// Recording to the manifest failed; execution stopped there.
    pub aborted: Option<ManifestError>,
    /// Actions never attempted because of the abort.
    pub not_attempted: usize,
}

impl ApplyReport {
    pub fn succeeded(&self) -> usize {
        self.completed.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True if every planned action took effect and was recorded.
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none() && self.not_attempted == 0
    }
}

/// Applies plans to the filesystem.
pub struct Executor<'a> {
    logger: &'a Logger,
    allow_overwrite: bool,
}

impl<'a> Executor<'a> {
    pub fn new(logger: &'a Logger, allow_overwrite: bool) -> Self {
        Self {
            logger,
            allow_overwrite,
        }
    }

    /// Applies `plan`, recording each successful action to `sink`.
    ///
    /// With `dry_run` nothing on disk changes and nothing is recorded; the
    /// report lists the entries a real run would produce.
    pub fn apply(&self, plan: &Plan, dry_run: bool, sink: &mut dyn ManifestSink) -> ApplyReport {
        let mut report = ApplyReport {
            dry_run,
            ..Default::default()
        };

        if dry_run {
            for action in &plan.actions {
                self.logger.dry_run_notice(format_args!(
                    "{} {} -> {}",
                    verb(action.kind),
                    action.source.display(),
                    action.destination.display()
                ));
                report.completed.push(ManifestEntry {
                    seq: action.seq,
                    source: action.source.clone(),
                    destination: action.destination.clone(),
                    action: action.kind,
                    size: action.size,
                    overwrote: self.allow_overwrite && action.destination.exists(),
                    executed_at: Utc::now(),
                });
            }
            return report;
        }

        let pb = self.logger.progress_bar(plan.actions.len() as u64);

        for (index, action) in plan.actions.iter().enumerate() {
            match self.execute(action) {
                Ok(entry) => {
                    self.logger.debug(format_args!(
                        "{} {} -> {}",
                        past_tense(action.kind),
                        entry.source.display(),
                        entry.destination.display()
                    ));
                    if let Err(e) = sink.record(&entry) {
                        pb.suspend(|| {
                            self.logger
                                .error(format_args!("Cannot record to manifest, stopping: {}", e))
                        });
                        report.completed.push(entry);
                        report.aborted = Some(e);
                        report.not_attempted = plan.actions.len() - index - 1;
                        break;
                    }
                    report.completed.push(entry);
                }
                Err(error) => {
                    pb.suspend(|| {
                        self.logger.error(format_args!(
                            "{}: {}",
                            action.source.display(),
                            error
                        ))
                    });
                    report.failures.push(ActionFailure {
                        action: action.clone(),
                        error,
                    });
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        report
    }

    fn execute(&self, action: &PlannedAction) -> Result<ManifestEntry, ApplyError> {
        for path in [&action.source, &action.destination] {
            if path.to_str().is_none() {
                return Err(ApplyError::Unrecordable(path.clone()));
            }
        }

        if action.source.symlink_metadata().is_err() {
            return Err(ApplyError::SourceMissing(action.source.clone()));
        }

        if let Some(parent) = action.destination.parent() {
            fs::create_dir_all(parent).map_err(|source| ApplyError::DirectoryCreation {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let overwrote = self.allow_overwrite && action.destination.symlink_metadata().is_ok();
        let method = match action.kind {
            ActionKind::Move => {
                transfer::move_file(&action.source, &action.destination, self.allow_overwrite)?
            }
            ActionKind::Copy => {
                transfer::copy_file(&action.source, &action.destination, self.allow_overwrite)?
            }
        };
        if method == TransferMethod::CopiedAndRemoved {
            self.logger.debug(format_args!(
                "{} crossed filesystems, copied and removed the source",
                action.source.display()
            ));
        }

        let size = fs::symlink_metadata(&action.destination)
            .map(|m| m.len())
            .unwrap_or(action.size);

        Ok(ManifestEntry {
            seq: action.seq,
            source: action.source.clone(),
            destination: action.destination.clone(),
            action: action.kind,
            size,
            overwrote,
            executed_at: Utc::now(),
        })
    }
}

fn verb(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Move => "MOVE",
        ActionKind::Copy => "COPY",
    }
}

fn past_tense(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Move => "MOVED",
        ActionKind::Copy => "COPIED",
    }
}
