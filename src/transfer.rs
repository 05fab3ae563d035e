//! File transfer primitives shared by apply and undo.
//!
//! A move is a plain rename when source and destination share a filesystem.
//! Across filesystems the file is copied, the copy is verified against the
//! source size, and only then is the source removed. A failed copy never
//! leaves a partial destination behind and never touches the source.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How a transfer was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    Renamed,
    CopiedAndRemoved,
    Copied,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("destination {} already exists", .0.display())]
    DestinationExists(PathBuf),

    #[error(
        "copy to {} is incomplete: expected {expected} bytes, found {actual}",
        path.display()
    )]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    fn io<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| TransferError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Moves `src` to `dst`.
///
/// Without `overwrite`, an existing `dst` is an error and nothing changes.
pub fn move_file(src: &Path, dst: &Path, overwrite: bool) -> Result<TransferMethod, TransferError> {
    if !overwrite && occupied(dst) {
        return Err(TransferError::DestinationExists(dst.to_path_buf()));
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(TransferMethod::Renamed),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => move_by_copy(src, dst, overwrite),
        Err(source) => Err(TransferError::Io {
            op: "cannot rename",
            path: src.to_path_buf(),
            source,
        }),
    }
}

/// Copy-then-delete move used across filesystems.
pub(crate) fn move_by_copy(
    src: &Path,
    dst: &Path,
    overwrite: bool,
) -> Result<TransferMethod, TransferError> {
    copy_verified(src, dst, overwrite)?;

    if let Err(source) = fs::remove_file(src) {
        // Keep exactly one copy: the untouched source.
        let _ = fs::remove_file(dst);
        return Err(TransferError::Io {
            op: "cannot remove source",
            path: src.to_path_buf(),
            source,
        });
    }

    Ok(TransferMethod::CopiedAndRemoved)
}

/// Copies `src` to `dst`, leaving `src` untouched.
///
/// Content, permissions and modification time are carried over.
pub fn copy_file(src: &Path, dst: &Path, overwrite: bool) -> Result<TransferMethod, TransferError> {
    copy_verified(src, dst, overwrite)?;
    Ok(TransferMethod::Copied)
}

fn copy_verified(src: &Path, dst: &Path, overwrite: bool) -> Result<u64, TransferError> {
    let src_meta = fs::metadata(src).map_err(TransferError::io("cannot stat", src))?;
    let mut reader = File::open(src).map_err(TransferError::io("cannot open", src))?;

    let opened = if overwrite {
        File::create(dst)
    } else {
        File::create_new(dst)
    };
    let mut writer = opened.map_err(|source| {
        if source.kind() == io::ErrorKind::AlreadyExists {
            TransferError::DestinationExists(dst.to_path_buf())
        } else {
            TransferError::Io {
                op: "cannot create",
                path: dst.to_path_buf(),
                source,
            }
        }
    })?;

    let result = write_copy(&mut reader, &mut writer, dst, src_meta.len());
    if let Err(e) = result {
        drop(writer);
        let _ = fs::remove_file(dst);
        return Err(e);
    }

    // Metadata is carried over where the platform allows it.
    if let Ok(modified) = src_meta.modified() {
        let _ = writer.set_modified(modified);
    }
    drop(writer);
    let _ = fs::set_permissions(dst, src_meta.permissions());

    Ok(src_meta.len())
}

fn write_copy(
    reader: &mut File,
    writer: &mut File,
    dst: &Path,
    expected: u64,
) -> Result<(), TransferError> {
    let written = io::copy(reader, writer).map_err(TransferError::io("cannot write", dst))?;
    writer
        .sync_all()
        .map_err(TransferError::io("cannot flush", dst))?;
    let on_disk = writer
        .metadata()
        .map_err(TransferError::io("cannot stat", dst))?
        .len();

    if written != expected || on_disk != expected {
        return Err(TransferError::SizeMismatch {
            path: dst.to_path_buf(),
            expected,
            actual: on_disk.min(written),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_move_renames_on_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"hello").unwrap();

        let method = move_file(&src, &dst, false).unwrap();
        assert_eq!(method, TransferMethod::Renamed);
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"hello");
    }

    #[test]
    fn test_move_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old").unwrap();

        let result = move_file(&src, &dst, false);
        assert!(matches!(result, Err(TransferError::DestinationExists(_))));
        assert_eq!(fs::read(&src).unwrap(), b"new");
        assert_eq!(fs::read(&dst).unwrap(), b"old");
    }

    #[test]
    fn test_move_overwrites_when_allowed() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old").unwrap();

        move_file(&src, &dst, true).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn test_move_by_copy_removes_source_after_copy() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.bin");
        let dst = dir.path().join("b.bin");
        fs::write(&src, vec![7u8; 4096]).unwrap();

        let method = move_by_copy(&src, &dst, false).unwrap();
        assert_eq!(method, TransferMethod::CopiedAndRemoved);
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap().len(), 4096);
    }

    #[test]
    fn test_failed_copy_leaves_source_and_no_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("missing_dir").join("a.txt");
        fs::write(&src, b"keep me").unwrap();

        let result = move_by_copy(&src, &dst, false);
        assert!(matches!(result, Err(TransferError::Io { .. })));
        assert_eq!(fs::read(&src).unwrap(), b"keep me");
        assert!(!dst.exists());
    }

    #[test]
    fn test_copy_keeps_source_and_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"content").unwrap();
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let method = copy_file(&src, &dst, false).unwrap();
        assert_eq!(method, TransferMethod::Copied);
        assert_eq!(fs::read(&src).unwrap(), b"content");
        assert_eq!(fs::read(&dst).unwrap(), b"content");
        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), mtime);
    }

    #[test]
    fn test_copy_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old").unwrap();

        let result = copy_file(&src, &dst, false);
        assert!(matches!(result, Err(TransferError::DestinationExists(_))));
        assert_eq!(fs::read(&dst).unwrap(), b"old");
    }
}
