//! Semantic edits written back to disk.
//!
//! A mutation re-reads the note, applies the edit in memory, and only when
//! the text changed writes the bytes it read to a timestamped backup and
//! atomically replaces the note. A failed replace restores the backup.
//! Backups are never deleted.
//!
//! New notes are written through the same atomic replace; there is nothing
//! to back up.

use crate::document::{Document, EditStyle, TaskRef};
use crate::error::{Result, VaultError};
use crate::parser::frontmatter::FieldValue;
use crate::store::NoteStore;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// An edit to one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    SetMetadata { key: String, value: FieldValue },
    RemoveMetadata { key: String },
    AddTask { section: String, text: String, depth: usize },
    /// `checked: None` flips the current state.
    ToggleTask { task: TaskRef, checked: Option<bool> },
    AppendText { section: String, text: String },
    /// Insert text at the top of the body, below the header.
    PrependText { text: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::SetMetadata { .. } => "set_metadata",
            Operation::RemoveMetadata { .. } => "remove_metadata",
            Operation::AddTask { .. } => "add_task",
            Operation::ToggleTask { .. } => "toggle_task",
            Operation::AppendText { .. } => "append_text",
            Operation::PrependText { .. } => "prepend_text",
        }
    }

    /// Apply to an in-memory document. Returns the task handle for task
    /// operations.
    pub fn apply(&self, doc: &mut Document) -> Result<Option<TaskRef>> {
        match self {
            Operation::SetMetadata { key, value } => {
                doc.set_metadata(key, value.clone())?;
                Ok(None)
            }
            Operation::RemoveMetadata { key } => {
                doc.remove_metadata(key);
                Ok(None)
            }
            Operation::AddTask { section, text, depth } => doc.add_task(section, text, *depth).map(Some),
            Operation::ToggleTask { task, checked } => {
                doc.toggle_task(task, *checked)?;
                Ok(Some(task.clone()))
            }
            Operation::AppendText { section, text } => {
                doc.append_text(section, text)?;
                Ok(None)
            }
            Operation::PrependText { text } => {
                doc.prepend_text(text);
                Ok(None)
            }
        }
    }
}

/// What a mutation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    /// Note path relative to the vault root.
    pub path: PathBuf,
    pub changed: bool,
    /// Backup of the previous bytes, when the note was rewritten.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskRef>,
}

/// Result of a scoped edit.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub changed: bool,
    pub backup: Option<PathBuf>,
}

/// Run `f` on a freshly read copy of the note and write the result back.
///
/// The caller must hold the note's write lease. `rel` is the note path
/// relative to `root` and is what errors report.
pub fn commit<T>(
    store: &dyn NoteStore,
    root: &Path,
    rel: &Path,
    style: EditStyle,
    f: impl FnOnce(&mut Document) -> Result<T>,
) -> Result<Committed<T>> {
    let path = root.join(rel);
    if !store.exists(&path) {
        return Err(VaultError::NoteNotFound(rel.to_path_buf()));
    }

    let original = store.read(&path)?;
    let mut doc = Document::parse_with_style(&original, style);
    for issue in doc.issues() {
        warn!(note = %rel.display(), line = issue.line + 1, "{}", issue.message);
    }

    let value = f(&mut doc).map_err(|e| e.in_note(rel))?;
    let updated = doc.serialize();
    if updated == original {
        debug!(note = %rel.display(), "edit left note unchanged, nothing written");
        return Ok(Committed {
            value,
            changed: false,
            backup: None,
        });
    }

    let backup = backup_path(store, &path);
    store.write_atomic(&backup, original.as_bytes())?;
    debug!(note = %rel.display(), backup = %backup.display(), "backup written");

    if let Err(source) = store.write_atomic(&path, updated.as_bytes()) {
        match store.copy(&backup, &path) {
            Ok(()) => warn!(note = %rel.display(), "write failed, restored from backup: {source}"),
            Err(e) => error!(
                note = %rel.display(),
                backup = %backup.display(),
                "write failed and restore failed: {source}; {e}"
            ),
        }
        return Err(VaultError::WriteFailure { path, backup, source });
    }

    doc.mark_clean();
    info!(note = %rel.display(), backup = %backup.display(), "note updated");
    Ok(Committed {
        value,
        changed: true,
        backup: Some(backup),
    })
}

/// Apply one operation as a transaction.
pub fn mutate(
    store: &dyn NoteStore,
    root: &Path,
    rel: &Path,
    style: EditStyle,
    operation: &Operation,
) -> Result<MutationOutcome> {
    debug!(note = %rel.display(), op = operation.name(), "applying mutation");
    let committed = commit(store, root, rel, style, |doc| operation.apply(doc))?;
    Ok(MutationOutcome {
        path: rel.to_path_buf(),
        changed: committed.changed,
        backup: committed.backup,
        task: committed.value,
    })
}

/// Write a new note with `fields` in its header followed by `body`.
///
/// The caller must hold the note's write lease. Fails with
/// [`VaultError::NoteExists`] rather than replacing an existing file.
pub fn create(
    store: &dyn NoteStore,
    root: &Path,
    rel: &Path,
    style: EditStyle,
    fields: &[(String, FieldValue)],
    body: &str,
) -> Result<MutationOutcome> {
    let path = root.join(rel);
    if store.exists(&path) {
        return Err(VaultError::NoteExists(rel.to_path_buf()));
    }

    let mut doc = Document::parse_with_style("", style);
    for (key, value) in fields {
        doc.set_metadata(key, value.clone())?;
    }
    let mut text = doc.serialize();
    if !body.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(body);
        if !body.ends_with('\n') {
            text.push('\n');
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    store.write_atomic(&path, text.as_bytes())?;
    info!(note = %rel.display(), "note created");
    Ok(MutationOutcome {
        path: rel.to_path_buf(),
        changed: true,
        backup: None,
        task: None,
    })
}

/// `<dir>/<stem>.<YYYYmmddHHMMSSmmm>.bak`, with a numeric suffix if taken.
pub fn backup_path(store: &dyn NoteStore, path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let stamp = Local::now().format("%Y%m%d%H%M%S%3f");

    let candidate = dir.join(format!("{stem}.{stamp}.bak"));
    if !store.exists(&candidate) {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}.{stamp}-{n}.bak")))
        .find(|p| !store.exists(p))
        .unwrap_or(candidate)
}
