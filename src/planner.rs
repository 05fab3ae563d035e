//! Turning scanned entries into a conflict-free list of actions.
//!
//! Every entry is classified, then placed at `dest_base/<group>/<file name>`.
//! When that path is already taken, either by a file on disk or by an earlier
//! action of the same plan, ` (1)`, ` (2)`, ... is inserted before the
//! extension until a free name is found.
//!
//! ```
//! use sortdir::planner::numbered_file_name;
//! use std::ffi::OsStr;
//!
//! assert_eq!(numbered_file_name(OsStr::new("report.pdf"), 1), "report (1).pdf");
//! assert_eq!(numbered_file_name(OsStr::new("archive.tar.gz"), 2), "archive.tar (2).gz");
//! assert_eq!(numbered_file_name(OsStr::new("README"), 1), "README (1)");
//! ```

use crate::classifier::{GroupKey, Strategy, classify};
use crate::scanner::FileEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound on numbered names tried for one file.
pub const MAX_COLLISION_ATTEMPTS: usize = 10_000;

/// What happens to the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Move,
    Copy,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Move => write!(f, "move"),
            ActionKind::Copy => write!(f, "copy"),
        }
    }
}

/// One file operation proposed by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    /// Position in the plan, starting at 0.
    pub seq: usize,
    pub source: PathBuf,
    /// Collision-free destination path.
    pub destination: PathBuf,
    pub kind: ActionKind,
    pub group: GroupKey,
    /// Size of the source at scan time.
    pub size: u64,
}

/// Failure to plan a single entry. Other entries are unaffected.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "no free destination for {} after {attempts} attempts (wanted {})",
        source_path.display(),
        destination.display()
    )]
    Unresolved {
        source_path: PathBuf,
        destination: PathBuf,
        attempts: usize,
    },

    #[error("{} has no file name", .0.display())]
    NoFileName(PathBuf),

    /// The manifest stores paths as UTF-8 text, so the move could not be undone.
    #[error("{} is not valid UTF-8 and cannot be recorded for undo", .0.display())]
    NonUtf8Path(PathBuf),

    #[error(
        "cannot place {}: {} exists and is not a directory",
        source_path.display(),
        blocker.display()
    )]
    BlockedDirectory {
        source_path: PathBuf,
        blocker: PathBuf,
    },
}

/// Settings for planning.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub dest_base: PathBuf,
    pub strategy: Strategy,
    pub action: ActionKind,
    /// Existing files at a destination may be replaced.
    pub allow_overwrite: bool,
}

/// The ordered result of planning.
#[derive(Debug, Default)]
pub struct Plan {
    pub actions: Vec<PlannedAction>,
    pub errors: Vec<PlanError>,
    /// Entries that already sit at their computed destination.
    pub already_in_place: Vec<PathBuf>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Path> {
        self.actions.iter().map(|a| a.destination.as_path())
    }

    /// Number of planned files per group, sorted by group.
    pub fn group_counts(&self) -> BTreeMap<String, usize> {
        self.actions.iter().fold(BTreeMap::new(), |mut acc, action| {
            *acc.entry(action.group.to_string()).or_insert(0) += 1;
            acc
        })
    }
}

/// Builds plans.
#[derive(Debug, Clone)]
pub struct Planner {
    options: PlanOptions,
}

impl Planner {
    pub fn new(options: PlanOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    /// Plans every entry.
    ///
    /// Entries are ordered by source path first, so the same set of entries
    /// always produces the same plan regardless of the order they arrive in.
    pub fn plan<I>(&self, entries: I) -> Plan
    where
        I: IntoIterator<Item = FileEntry>,
    {
        let mut entries: Vec<FileEntry> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let sources: HashSet<PathBuf> = entries.iter().map(|e| e.path.clone()).collect();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut plan = Plan::default();

        for entry in entries {
            let Some(file_name) = entry.file_name().map(OsStr::to_os_string) else {
                plan.errors.push(PlanError::NoFileName(entry.path.clone()));
                continue;
            };

            let group = classify(&entry, &self.options.strategy);
            let dir = group
                .segments()
                .fold(self.options.dest_base.clone(), |dir, segment| dir.join(segment));
            let wanted = dir.join(&file_name);

            let unencodable = [&entry.path, &wanted]
                .into_iter()
                .find(|path| path.to_str().is_none());
            if let Some(path) = unencodable {
                plan.errors.push(PlanError::NonUtf8Path(path.clone()));
                continue;
            }

            if wanted == entry.path {
                plan.already_in_place.push(entry.path);
                continue;
            }

            if let Some(blocker) = blocking_ancestor(&dir) {
                plan.errors.push(PlanError::BlockedDirectory {
                    source_path: entry.path,
                    blocker,
                });
                continue;
            }

            match self.resolve(&dir, &file_name, &entry.path, &sources, &claimed) {
                Ok(destination) => {
                    claimed.insert(destination.clone());
                    plan.actions.push(PlannedAction {
                        seq: plan.actions.len(),
                        source: entry.path,
                        destination,
                        kind: self.options.action,
                        group,
                        size: entry.size,
                    });
                }
                Err(attempts) => plan.errors.push(PlanError::Unresolved {
                    source_path: entry.path,
                    destination: wanted,
                    attempts,
                }),
            }
        }

        plan
    }

    /// Finds the first free name in `dir`, returning the attempt count on failure.
    fn resolve(
        &self,
        dir: &Path,
        file_name: &OsStr,
        source: &Path,
        sources: &HashSet<PathBuf>,
        claimed: &HashSet<PathBuf>,
    ) -> Result<PathBuf, usize> {
        let first = dir.join(file_name);
        if !self.is_taken(&first, source, sources, claimed) {
            return Ok(first);
        }

        (1..=MAX_COLLISION_ATTEMPTS)
            .map(|n| dir.join(numbered_file_name(file_name, n)))
            .find(|candidate| !self.is_taken(candidate, source, sources, claimed))
            .ok_or(MAX_COLLISION_ATTEMPTS)
    }

    fn is_taken(
        &self,
        candidate: &Path,
        source: &Path,
        sources: &HashSet<PathBuf>,
        claimed: &HashSet<PathBuf>,
    ) -> bool {
        if claimed.contains(candidate) {
            return true;
        }
        // Another file of this run lives there; replacing it would lose it.
        if candidate != source && sources.contains(candidate) {
            return true;
        }
        match candidate.symlink_metadata() {
            Ok(metadata) => metadata.is_dir() || !self.options.allow_overwrite,
            Err(_) => false,
        }
    }
}

/// Nearest existing ancestor of `dir` (itself included) that is not a directory.
fn blocking_ancestor(dir: &Path) -> Option<PathBuf> {
    for ancestor in dir.ancestors() {
        match fs::metadata(ancestor) {
            Ok(metadata) if metadata.is_dir() => return None,
            Ok(_) => return Some(ancestor.to_path_buf()),
            Err(_) => continue,
        }
    }
    None
}

/// Inserts ` (n)` between the stem and the last extension of a file name.
pub fn numbered_file_name(file_name: &OsStr, n: usize) -> OsString {
    let path = Path::new(file_name);
    let mut name = path.file_stem().unwrap_or(file_name).to_os_string();
    name.push(format!(" ({})", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}
