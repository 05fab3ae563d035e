/// Reverting an apply from its manifest.
///
/// Entries are undone last-first, so later actions (and the directories they
/// relied on) unwind before earlier ones. A moved file goes back to its
/// original path; a copy is deleted, since its source was never touched.
/// Every entry is attempted; entries that cannot be reversed safely are
/// reported and left alone. Nothing is ever overwritten.
use crate::manifest::{Manifest, ManifestEntry};
use crate::output::Logger;
use crate::planner::ActionKind;
use crate::transfer::{self, TransferError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a manifest entry could not be reversed.
#[derive(Debug, Error)]
pub enum UndoError {
    #[error("{} no longer exists", .0.display())]
    DestinationMissing(PathBuf),

    #[error("{} is occupied by another file, refusing to overwrite it", .0.display())]
    OriginalOccupied(PathBuf),

    #[error(
        "{} changed since it was copied (expected {expected} bytes, found {actual})",
        path.display()
    )]
    DestinationModified {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error(
        "original {} is missing, keeping the copy at {}",
        original.display(),
        copy.display()
    )]
    OriginalMissing { original: PathBuf, copy: PathBuf },

    #[error("cannot create directory {}: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// What undoing an entry did (or would do, in a dry run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoAction {
    /// Moved back to its original path.
    Restored,
    /// Copy deleted.
    Removed,
}

/// Result for one manifest entry.
#[derive(Debug)]
pub struct UndoResult {
    pub entry: ManifestEntry,
    pub outcome: Result<UndoAction, UndoError>,
}

/// Represents the result of an undo operation.
#[derive(Debug, Default)]
pub struct UndoReport {
    pub dry_run: bool,
    /// One result per entry, in the order they were processed (reverse
    /// execution order).
    pub results: Vec<UndoResult>,
    /// Directories removed because undo left them empty.
    pub pruned_dirs: Vec<PathBuf>,
}

impl UndoReport {
    /// Number of entries reversed.
    pub fn reversed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ManifestEntry, &UndoError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (&r.entry, e)))
    }

    /// Returns true if every entry was reversed.
    pub fn is_complete_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }
}

/// Reverses manifests.
pub struct Undoer<'a> {
    logger: &'a Logger,
}

impl<'a> Undoer<'a> {
    pub fn new(logger: &'a Logger) -> Self {
        Self { logger }
    }

    /// Undoes every entry of `manifest`, last first.
    ///
    /// # Edge Cases Handled
    ///
    /// * **Destination gone**: reported, nothing changes
    /// * **Original path occupied**: reported, neither file is touched
    /// * **Copy modified or original gone**: the copy is kept
    /// * **Emptied directories**: removed up to the destination base, and the
    ///   base itself when the apply created it
    pub fn undo(&self, manifest: &Manifest, dry_run: bool) -> UndoReport {
        if manifest.truncated_tail {
            self.logger
                .warning("Manifest ends with an incomplete record; it was ignored.");
        }

        let mut report = UndoReport {
            dry_run,
            ..Default::default()
        };

        for entry in manifest.entries.iter().rev() {
            let outcome = self.undo_entry(entry, dry_run);
            match &outcome {
                Ok(action) if dry_run => self.logger.dry_run_notice(format_args!(
                    "{} {}",
                    describe(*action),
                    entry.destination.display()
                )),
                Ok(action) => {
                    if entry.overwrote {
                        self.logger.warning(format_args!(
                            "{} replaced an existing file during apply; that file cannot be restored",
                            entry.destination.display()
                        ));
                    }
                    self.logger.debug(format_args!(
                        "{} {} -> {}",
                        describe(*action),
                        entry.destination.display(),
                        entry.source.display()
                    ));
                }
                Err(e) => self.logger.error(e),
            }
            report.results.push(UndoResult {
                entry: entry.clone(),
                outcome,
            });
        }

        if !dry_run {
            report.pruned_dirs = self.prune_empty_dirs(manifest, &report);
        }

        report
    }

    fn undo_entry(&self, entry: &ManifestEntry, dry_run: bool) -> Result<UndoAction, UndoError> {
        let current = fs::symlink_metadata(&entry.destination)
            .map_err(|_| UndoError::DestinationMissing(entry.destination.clone()))?;

        match entry.action {
            ActionKind::Move => {
                if entry.source.symlink_metadata().is_ok() {
                    return Err(UndoError::OriginalOccupied(entry.source.clone()));
                }
                if dry_run {
                    return Ok(UndoAction::Restored);
                }
                if let Some(parent) = entry.source.parent() {
                    fs::create_dir_all(parent).map_err(|source| UndoError::DirectoryCreation {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                transfer::move_file(&entry.destination, &entry.source, false)?;
                Ok(UndoAction::Restored)
            }
            ActionKind::Copy => {
                if entry.source.symlink_metadata().is_err() {
                    return Err(UndoError::OriginalMissing {
                        original: entry.source.clone(),
                        copy: entry.destination.clone(),
                    });
                }
                if current.len() != entry.size {
                    return Err(UndoError::DestinationModified {
                        path: entry.destination.clone(),
                        expected: entry.size,
                        actual: current.len(),
                    });
                }
                if dry_run {
                    return Ok(UndoAction::Removed);
                }
                fs::remove_file(&entry.destination).map_err(|source| UndoError::Remove {
                    path: entry.destination.clone(),
                    source,
                })?;
                Ok(UndoAction::Removed)
            }
        }
    }

    /// Removes directories that held undone destinations once they are empty.
    fn prune_empty_dirs(&self, manifest: &Manifest, report: &UndoReport) -> Vec<PathBuf> {
        let base = manifest.header.dest.as_path();
        let mut candidates: BTreeSet<PathBuf> = BTreeSet::new();

        for result in report.results.iter().filter(|r| r.outcome.is_ok()) {
            let mut dir = result.entry.destination.parent();
            while let Some(current) = dir {
                if current == base || !current.starts_with(base) {
                    break;
                }
                candidates.insert(current.to_path_buf());
                dir = current.parent();
            }
        }

        let mut ordered: Vec<PathBuf> = candidates.into_iter().collect();
        ordered.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        if manifest.header.dest_created && report.reversed() > 0 {
            ordered.push(base.to_path_buf());
        }

        ordered
            .into_iter()
            .filter(|dir| is_empty_dir(dir) && fs::remove_dir(dir).is_ok())
            .inspect(|dir| self.logger.debug(format_args!("removed empty {}", dir.display())))
            .collect()
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

fn describe(action: UndoAction) -> &'static str {
    match action {
        UndoAction::Restored => "RESTORE",
        UndoAction::Removed => "REMOVE COPY",
    }
}
