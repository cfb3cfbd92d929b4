//! Vault index.
//!
//! The index keeps a snapshot of every note (file stamp, tags and promoted
//! header fields) and a tag → paths map, so tag and metadata queries do not
//! parse notes. Parsed documents are cached per entry once requested. A
//! snapshot is stale when the file's modification time or size differs from
//! its stamp.
//!
//! Snapshots can be persisted between runs as JSON files in a cache
//! directory:
//! - `meta.json`: format version, vault path, promoted fields
//! - `index.json`: note snapshots

mod cache;
mod types;
mod vault_index;

pub use cache::CacheDir;
pub use types::*;
pub use vault_index::{Reader, VaultIndex};

use crate::error::Result;
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Current index format version. Increment when the format changes.
pub const CACHE_VERSION: u32 = 1;

/// All `.md` files under `root`, relative and sorted. Hidden entries and
/// directories named in `ignored_dirs` are skipped.
pub fn list_note_paths(root: &Path, ignored_dirs: &[String]) -> Result<Vec<PathBuf>> {
    let pattern = root.join("**/*.md");
    let pattern_str = pattern.to_string_lossy();

    let mut notes = Vec::new();
    for entry in glob(&pattern_str)? {
        match entry {
            Ok(path) => {
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let skipped = relative.components().any(|c| {
                    let name = c.as_os_str().to_string_lossy();
                    name.starts_with('.') || ignored_dirs.iter().any(|d| *d == name)
                });
                if !skipped && path.is_file() {
                    notes.push(relative.to_path_buf());
                }
            }
            Err(e) => warn!("glob error: {}", e),
        }
    }

    notes.sort();
    Ok(notes)
}
