//! File access used by the engine.
//!
//! Everything that touches note bytes on disk goes through [`NoteStore`], so
//! tests can substitute a store that fails at a chosen step.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Modification time and size of a file, used to detect changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FileStamp {
    /// Nanoseconds since the Unix epoch.
    pub mtime_ns: u128,
    pub size: u64,
}

pub trait NoteStore: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<String>;

    fn stamp(&self, path: &Path) -> io::Result<FileStamp>;

    /// Copy `from` to `to`, overwriting `to`.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Replace `path` with `contents` so readers see either the old or the
    /// new bytes, never a mix.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

/// The local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl NoteStore for FsStore {
    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn stamp(&self, path: &Path) -> io::Result<FileStamp> {
        let metadata = fs::metadata(path)?;
        let mtime_ns = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(FileStamp {
            mtime_ns,
            size: metadata.len(),
        })
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"))?;
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

        // Same directory, so the rename stays on one filesystem.
        let temp_path = parent.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

        let result = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(contents)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&temp_path, path));

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
