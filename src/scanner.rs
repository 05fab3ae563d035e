//! Directory walking.
//!
//! [`Scanner::scan`] returns a lazy iterator over the candidate files below a
//! root. Each call starts a fresh walk, so a scanner can be reused to scan the
//! same tree again. Directory children are visited in file-name order, which
//! makes the sequence of entries stable for an unchanged tree.
//!
//! Directory symlinks are never followed. A symlink pointing at a file is
//! reported as a regular file using the target's metadata.

use crate::classifier::MimeTable;
use crate::filter::FileFilter;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Snapshot of a file taken at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path of the file (joined onto the scan root).
    pub path: PathBuf,
    /// Path relative to the scan root.
    pub relative_path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Creation time, where the platform reports one.
    pub created: Option<DateTime<Utc>>,
    /// Extension as written in the file name, without the dot.
    pub extension: Option<String>,
    /// MIME type from the extension table, or from content sniffing.
    pub mime: Option<String>,
}

impl FileEntry {
    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }
}

/// A non-fatal problem met while walking. The walk continues past it.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("cannot read metadata of {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("broken symlink {}", path.display())]
    BrokenLink { path: PathBuf },
}

impl ScanError {
    pub fn path(&self) -> &Path {
        match self {
            ScanError::Unreadable { path, .. }
            | ScanError::Metadata { path, .. }
            | ScanError::BrokenLink { path } => path,
        }
    }
}

/// Options controlling a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// `Some(0)` yields only the root's direct children; `None` is unlimited.
    pub max_depth: Option<usize>,
    pub filter: FileFilter,
    /// Files or directory subtrees that are never yielded (the destination
    /// base, the manifest). A path equal to the root itself is ignored.
    pub excluded_paths: Vec<PathBuf>,
    /// Sniff file contents for a MIME type when the extension is unknown.
    pub sniff_content: bool,
}

/// Walks one directory tree.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
    mime_table: MimeTable,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
            mime_table: MimeTable::default(),
        }
    }

    pub fn with_mime_table(mut self, mime_table: MimeTable) -> Self {
        self.mime_table = mime_table;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a new walk of the tree.
    pub fn scan(&self) -> ScanIter<'_> {
        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();
        if let Some(depth) = self.options.max_depth {
            walker = walker.max_depth(depth.saturating_add(1));
        }

        ScanIter {
            scanner: self,
            inner: walker.into_iter(),
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.options
            .excluded_paths
            .iter()
            .any(|excluded| excluded.as_path() != self.root && excluded == path)
    }

    fn build_entry(&self, path: &Path, metadata: &fs::Metadata) -> Result<FileEntry, ScanError> {
        let modified = metadata.modified().map_err(|source| ScanError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .filter(|ext| !ext.is_empty());

        let mime = extension
            .as_deref()
            .and_then(|ext| self.mime_table.lookup(ext))
            .map(str::to_string)
            .or_else(|| self.sniff(path));

        Ok(FileEntry {
            path: path.to_path_buf(),
            relative_path: path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_path_buf(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
            created: metadata.created().ok().map(DateTime::<Utc>::from),
            extension,
            mime,
        })
    }

    fn sniff(&self, path: &Path) -> Option<String> {
        if !self.options.sniff_content {
            return None;
        }
        infer::get_from_path(path)
            .ok()
            .flatten()
            .map(|kind| kind.mime_type().to_string())
    }
}

/// Lazy iterator over the files of one walk.
pub struct ScanIter<'a> {
    scanner: &'a Scanner,
    inner: walkdir::IntoIter,
}

impl Iterator for ScanIter<'_> {
    type Item = Result<FileEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(source) => {
                    let path = source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.scanner.root.clone());
                    return Some(Err(ScanError::Unreadable { path, source }));
                }
            };

            let path = entry.path();
            let relative = path.strip_prefix(&self.scanner.root).unwrap_or(path);
            let filter = &self.scanner.options.filter;

            if entry.file_type().is_dir() {
                if self.scanner.is_excluded(path) || !filter.should_descend(relative) {
                    self.inner.skip_current_dir();
                }
                continue;
            }

            if self.scanner.is_excluded(path) || !filter.should_include(relative) {
                continue;
            }

            let metadata = if entry.file_type().is_symlink() {
                match fs::metadata(path) {
                    Ok(metadata) if metadata.is_file() => metadata,
                    // Directory symlinks are not followed.
                    Ok(_) => continue,
                    Err(_) => {
                        return Some(Err(ScanError::BrokenLink {
                            path: path.to_path_buf(),
                        }));
                    }
                }
            } else if entry.file_type().is_file() {
                match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(source) => {
                        return Some(Err(ScanError::Unreadable {
                            path: path.to_path_buf(),
                            source,
                        }));
                    }
                }
            } else {
                // Sockets, fifos, devices.
                continue;
            };

            return Some(self.scanner.build_entry(path, &metadata));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn relative_paths(scanner: &Scanner) -> Vec<String> {
        scanner
            .scan()
            .map(|entry| entry.unwrap().relative_path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_scan_is_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.txt");
        touch(dir.path(), "a.txt");
        touch(dir.path(), "sub/c.txt");

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        assert_eq!(relative_paths(&scanner), vec!["a.txt", "b.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_scan_is_restartable() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        assert_eq!(relative_paths(&scanner).len(), 1);

        touch(dir.path(), "b.txt");
        assert_eq!(relative_paths(&scanner), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_max_depth_zero_only_top_level() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "top.txt");
        touch(dir.path(), "one/nested.txt");
        touch(dir.path(), "one/two/deeper.txt");

        let options = ScanOptions {
            max_depth: Some(0),
            ..Default::default()
        };
        let scanner = Scanner::new(dir.path(), options);
        assert_eq!(relative_paths(&scanner), vec!["top.txt"]);

        let options = ScanOptions {
            max_depth: Some(1),
            ..Default::default()
        };
        let scanner = Scanner::new(dir.path(), options);
        assert_eq!(relative_paths(&scanner), vec!["one/nested.txt", "top.txt"]);
    }

    #[test]
    fn test_max_depth_at_usize_max_is_unlimited() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "top.txt");
        touch(dir.path(), "one/two/deeper.txt");

        let options = ScanOptions {
            max_depth: Some(usize::MAX),
            ..Default::default()
        };
        let scanner = Scanner::new(dir.path(), options);
        assert_eq!(relative_paths(&scanner), vec!["one/two/deeper.txt", "top.txt"]);
    }

    #[test]
    fn test_excluded_paths_are_skipped() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "organized/txt/old.txt");
        touch(dir.path(), "manifest.jsonl");

        let options = ScanOptions {
            excluded_paths: vec![
                dir.path().join("organized"),
                dir.path().join("manifest.jsonl"),
            ],
            ..Default::default()
        };
        let scanner = Scanner::new(dir.path(), options);
        assert_eq!(relative_paths(&scanner), vec!["a.txt"]);
    }

    #[test]
    fn test_excluding_root_itself_is_ignored() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");

        let options = ScanOptions {
            excluded_paths: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let scanner = Scanner::new(dir.path(), options);
        assert_eq!(relative_paths(&scanner), vec!["a.txt"]);
    }

    #[test]
    fn test_entry_snapshot_fields() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("photo.JPG"), b"12345").unwrap();
        fs::write(dir.path().join("README"), b"hi").unwrap();

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        let entries: Vec<FileEntry> = scanner.scan().map(Result::unwrap).collect();

        let photo = entries
            .iter()
            .find(|e| e.relative_path == Path::new("photo.JPG"))
            .unwrap();
        assert_eq!(photo.size, 5);
        assert_eq!(photo.extension.as_deref(), Some("JPG"));
        assert_eq!(photo.mime.as_deref(), Some("image/jpeg"));
        assert_eq!(photo.path, dir.path().join("photo.JPG"));

        let readme = entries
            .iter()
            .find(|e| e.relative_path == Path::new("README"))
            .unwrap();
        assert_eq!(readme.extension, None);
        assert_eq!(readme.mime, None);
    }

    #[test]
    fn test_content_sniffing_for_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let png = [
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
        ];
        fs::write(dir.path().join("picture.bin"), png).unwrap();

        let options = ScanOptions {
            sniff_content: true,
            ..Default::default()
        };
        let scanner = Scanner::new(dir.path(), options);
        let entry = scanner.scan().next().unwrap().unwrap();
        assert_eq!(entry.mime.as_deref(), Some("image/png"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(outside.path(), "linked_dir/inner.txt");
        touch(outside.path(), "target.txt");

        symlink(outside.path().join("linked_dir"), dir.path().join("dirlink")).unwrap();
        symlink(outside.path().join("target.txt"), dir.path().join("filelink.txt")).unwrap();
        symlink(dir.path().join("missing"), dir.path().join("dangling")).unwrap();

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        let results: Vec<_> = scanner.scan().collect();

        let files: Vec<_> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|e| e.relative_path.clone())
            .collect();
        assert_eq!(files, vec![PathBuf::from("filelink.txt")]);

        let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ScanError::BrokenLink { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_reported_and_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "locked/secret.txt");
        touch(dir.path(), "z.txt");

        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Root ignores permission bits; nothing to test there.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let scanner = Scanner::new(dir.path(), ScanOptions::default());
        let results: Vec<_> = scanner.scan().collect();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(ok, 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path(), locked.as_path());
    }
}
