//! sortdir - group the files of a directory tree into folders
//!
//! Files are grouped by extension, MIME type, or a date derived from their
//! timestamps. Every applied run writes a manifest that allows reverting it,
//! and every run can be previewed with a dry run.
//!
//! The pipeline is [`scanner`] → [`planner`] → [`executor`], with the
//! [`manifest`] as the durable record consumed by [`undo`].

pub mod classifier;
pub mod cli;
pub mod config;
pub mod executor;
pub mod filter;
pub mod manifest;
pub mod output;
pub mod planner;
pub mod scanner;
pub mod transfer;
pub mod undo;

pub use classifier::{DateField, DateGranularity, GroupBy, GroupKey, Strategy, classify};
pub use config::{ConfigError, FileConfig, OrganizeConfig};
pub use executor::{ApplyReport, Executor};
pub use filter::{FileFilter, PatternSet};
pub use manifest::{Manifest, ManifestEntry, ManifestHeader, ManifestWriter};
pub use output::Logger;
pub use planner::{ActionKind, Plan, PlannedAction, Planner};
pub use scanner::{FileEntry, ScanError, Scanner};
pub use undo::{UndoReport, Undoer};

pub use cli::{Args, run};
