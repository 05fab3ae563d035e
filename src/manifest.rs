//! The manifest: a durable, append-only record of executed actions.
//!
//! The file is JSON Lines. The first line is a header record carrying the
//! schema version and the settings of the run; every following line is one
//! executed action, in execution order:
//!
//! ```text
//! {"record":"header","version":1,"created":"2024-05-01T10:00:00Z","root":"/in","dest":"/in/organized","strategy":"ext","action":"move","dest_created":true}
//! {"record":"entry","seq":0,"source":"/in/a.jpg","destination":"/in/organized/jpg/a.jpg","action":"move","size":1024,"overwrote":false,"executed_at":"2024-05-01T10:00:00Z"}
//! ```
//!
//! Each record is flushed to disk before the next action runs, so an
//! interrupted apply leaves a manifest matching what actually happened. A
//! final line cut short by a crash is ignored on load.

use crate::planner::ActionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Schema version written by this build.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot create manifest {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write manifest {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode manifest record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("malformed manifest {} at line {line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("manifest {} has no header record", .0.display())]
    MissingHeader(PathBuf),

    #[error("unsupported manifest version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },
}

/// Settings of the run that produced a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestHeader {
    pub version: u32,
    pub created: DateTime<Utc>,
    pub root: PathBuf,
    pub dest: PathBuf,
    pub strategy: String,
    pub action: ActionKind,
    /// The destination base did not exist before this run.
    #[serde(default)]
    pub dest_created: bool,
}

impl ManifestHeader {
    pub fn new(
        root: impl Into<PathBuf>,
        dest: impl Into<PathBuf>,
        strategy: impl Into<String>,
        action: ActionKind,
        dest_created: bool,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            created: Utc::now(),
            root: root.into(),
            dest: dest.into(),
            strategy: strategy.into(),
            action,
            dest_created,
        }
    }
}

/// One successfully executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub seq: usize,
    /// Where the file was before the action.
    pub source: PathBuf,
    /// Where the action put it.
    pub destination: PathBuf,
    pub action: ActionKind,
    pub size: u64,
    /// An existing file at `destination` was replaced.
    #[serde(default)]
    pub overwrote: bool,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record {
    Header(ManifestHeader),
    Entry(ManifestEntry),
}

/// Receives entries as actions complete.
pub trait ManifestSink {
    fn record(&mut self, entry: &ManifestEntry) -> Result<(), ManifestError>;
}

impl ManifestSink for Vec<ManifestEntry> {
    fn record(&mut self, entry: &ManifestEntry) -> Result<(), ManifestError> {
        self.push(entry.clone());
        Ok(())
    }
}

/// Appends records to a manifest file, syncing after each one.
#[derive(Debug)]
pub struct ManifestWriter {
    path: PathBuf,
    file: File,
    entries: usize,
}

impl ManifestWriter {
    /// Starts a new manifest at `path`, replacing any previous one.
    pub fn create(path: &Path, header: &ManifestHeader) -> Result<Self, ManifestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ManifestError::Create {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let file = File::create(path).map_err(|source| ManifestError::Create {
            path: path.to_path_buf(),
            source,
        })?;

        let mut writer = Self {
            path: path.to_path_buf(),
            file,
            entries: 0,
        };
        writer.append(&Record::Header(header.clone()))?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn append(&mut self, record: &Record) -> Result<(), ManifestError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_data())
            .map_err(|source| ManifestError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

impl ManifestSink for ManifestWriter {
    fn record(&mut self, entry: &ManifestEntry) -> Result<(), ManifestError> {
        self.append(&Record::Entry(entry.clone()))?;
        self.entries += 1;
        Ok(())
    }
}

/// A manifest read back from disk.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub header: ManifestHeader,
    /// Entries in execution order.
    pub entries: Vec<ManifestEntry>,
    /// The last line was cut short and ignored.
    pub truncated_tail: bool,
}

impl Manifest {
    /// Reads a manifest.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or unreadable, has no header, declares an
    /// unsupported version, or contains a malformed record anywhere but an
    /// unterminated last line.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let malformed = |line: usize, reason: String| ManifestError::Malformed {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty())
            .collect();
        let last_line_no = lines.last().map(|(n, _)| *n);
        let unterminated = !content.ends_with('\n');

        let mut iter = lines.into_iter();
        let (header_line_no, header_line) = iter
            .next()
            .ok_or_else(|| ManifestError::MissingHeader(path.to_path_buf()))?;
        let header = Self::parse_header(header_line)
            .map_err(|err| match err {
                HeaderIssue::NotAHeader => ManifestError::MissingHeader(path.to_path_buf()),
                HeaderIssue::Version(found) => ManifestError::UnsupportedVersion {
                    found,
                    supported: MANIFEST_VERSION,
                },
                HeaderIssue::Invalid(reason) => malformed(header_line_no, reason),
            })?;

        let mut entries = Vec::new();
        let mut truncated_tail = false;
        for (line_no, line) in iter {
            match serde_json::from_str::<Record>(line) {
                Ok(Record::Entry(entry)) => entries.push(entry),
                Ok(Record::Header(_)) => {
                    return Err(malformed(line_no, "unexpected second header".to_string()));
                }
                Err(_) if unterminated && Some(line_no) == last_line_no => {
                    truncated_tail = true;
                }
                Err(e) => return Err(malformed(line_no, e.to_string())),
            }
        }

        Ok(Self {
            header,
            entries,
            truncated_tail,
        })
    }

    fn parse_header(line: &str) -> Result<ManifestHeader, HeaderIssue> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| HeaderIssue::Invalid(e.to_string()))?;
        if value["record"].as_str() != Some("header") {
            return Err(HeaderIssue::NotAHeader);
        }
        match value["version"].as_u64() {
            Some(version) if version == u64::from(MANIFEST_VERSION) => {}
            Some(version) => return Err(HeaderIssue::Version(version)),
            None => return Err(HeaderIssue::Invalid("missing 'version' field".to_string())),
        }
        match serde_json::from_value::<Record>(value) {
            Ok(Record::Header(header)) => Ok(header),
            Ok(Record::Entry(_)) => Err(HeaderIssue::NotAHeader),
            Err(e) => Err(HeaderIssue::Invalid(e.to_string())),
        }
    }
}

enum HeaderIssue {
    NotAHeader,
    Version(u64),
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn header() -> ManifestHeader {
        ManifestHeader::new("/in", "/in/organized", "ext", ActionKind::Move, true)
    }

    fn entry(seq: usize) -> ManifestEntry {
        ManifestEntry {
            seq,
            source: PathBuf::from(format!("/in/file{}.txt", seq)),
            destination: PathBuf::from(format!("/in/organized/txt/file{}.txt", seq)),
            action: ActionKind::Move,
            size: 10,
            overwrote: false,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn test_written_manifest_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("manifest.jsonl");

        let mut writer = ManifestWriter::create(&path, &header()).unwrap();
        writer.record(&entry(0)).unwrap();
        writer.record(&entry(1)).unwrap();
        assert_eq!(writer.len(), 2);

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.header, header_with_created(manifest.header.created));
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].seq, 0);
        assert_eq!(manifest.entries[1].seq, 1);
        assert!(!manifest.truncated_tail);
    }

    fn header_with_created(created: DateTime<Utc>) -> ManifestHeader {
        ManifestHeader {
            created,
            ..header()
        }
    }

    #[test]
    fn test_each_record_is_one_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.jsonl");

        let mut writer = ManifestWriter::create(&path, &header()).unwrap();
        writer.record(&entry(0)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""record":"header""#));
        assert!(lines[0].contains(r#""version":1"#));
        assert!(lines[1].contains(r#""record":"entry""#));
        assert!(lines[1].contains(r#""action":"move""#));
    }

    #[test]
    fn test_create_replaces_previous_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.jsonl");

        let mut writer = ManifestWriter::create(&path, &header()).unwrap();
        writer.record(&entry(0)).unwrap();
        drop(writer);
        ManifestWriter::create(&path, &header()).unwrap();

        assert!(Manifest::load(&path).unwrap().entries.is_empty());
    }

    #[test]
    fn test_truncated_last_line_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.jsonl");

        let mut writer = ManifestWriter::create(&path, &header()).unwrap();
        writer.record(&entry(0)).unwrap();
        drop(writer);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"record":"entry","seq":1,"sou"#).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert!(manifest.truncated_tail);
    }

    #[test]
    fn test_malformed_middle_line_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.jsonl");
        let header_line = serde_json::to_string(&Record::Header(header())).unwrap();
        let entry_line = serde_json::to_string(&Record::Entry(entry(1))).unwrap();
        fs::write(&path, format!("{}\nnot json\n{}\n", header_line, entry_line)).unwrap();

        let result = Manifest::load(&path);
        assert!(matches!(result, Err(ManifestError::Malformed { line: 2, .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.jsonl");
        fs::write(&path, "{\"record\":\"header\",\"version\":99}\n").unwrap();

        let result = Manifest::load(&path);
        assert!(matches!(
            result,
            Err(ManifestError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_missing_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.jsonl");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(ManifestError::MissingHeader(_))
        ));

        let entry_line = serde_json::to_string(&Record::Entry(entry(0))).unwrap();
        fs::write(&path, format!("{}\n", entry_line)).unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(ManifestError::MissingHeader(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Manifest::load(Path::new("/non/existent/manifest.jsonl"));
        assert!(matches!(result, Err(ManifestError::NotFound(_))));
    }

    #[test]
    fn test_vec_sink_collects_entries() {
        let mut sink: Vec<ManifestEntry> = Vec::new();
        sink.record(&entry(0)).unwrap();
        sink.record(&entry(1)).unwrap();
        assert_eq!(sink.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0, 1]);
    }
}
