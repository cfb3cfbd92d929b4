//! Vault representation and the caller-facing operations.

use crate::config::Config;
use crate::document::{Document, TaskStats};
use crate::error::{Result, VaultError};
use crate::index::{list_note_paths, IndexStatus, Reader, RefreshReport, VaultIndex};
use crate::lock::LockTable;
use crate::mutation::{self, Committed, MutationOutcome, Operation};
use crate::parser::frontmatter::FieldValue;
use crate::parser::task::TaskNode;
use crate::query::{parse_query, NoteFilter, Query, SortKey};
use crate::store::{FsStore, NoteStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use std::sync::Arc;
use tracing::{debug, warn};

/// A note matched by a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRef {
    /// Path relative to the vault root.
    pub path: PathBuf,
    pub tags: Vec<String>,
}

/// Characters replaced when a title becomes a file name.
const TITLE_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const TITLE_MAX_CHARS: usize = 100;

/// File name stem for a note titled `title`.
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| {
            if TITLE_INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed: String = replaced
        .trim_matches(|c| c == ' ' || c == '.')
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}

/// Comparable value behind a [`SortKey`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Text(String),
    Date(NaiveDate),
    Time(u128),
}

/// Totals across the vault.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VaultStats {
    pub notes: usize,
    pub tags: usize,
    pub notes_with_tasks: usize,
    pub notes_with_pending_tasks: usize,
    pub notes_with_issues: usize,
    pub tasks: TaskStats,
}

/// A vault: a directory of notes plus the index and locks shared by every
/// caller. `Vault` is `Sync`; share it between threads behind an `Arc`.
///
/// Reads of one note never wait on a write to another: the index is only
/// locked after a note has been loaded.
pub struct Vault {
    /// Root path of the vault.
    pub root: PathBuf,
    config: Config,
    store: Arc<dyn NoteStore>,
    locks: LockTable,
    index: VaultIndex,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open a vault with the default configuration.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(root, Config::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        Self::with_store(root, config, Arc::new(FsStore))
    }

    /// Open a vault that reads and writes through `store`.
    pub fn with_store(root: impl Into<PathBuf>, config: Config, store: Arc<dyn NoteStore>) -> Result<Self> {
        let root = root.into();

        if !root.is_dir() {
            return Err(VaultError::VaultNotFound(root));
        }

        let index = match VaultIndex::load(root.clone(), &config) {
            Ok(index) => index,
            Err(e) => {
                warn!("ignoring unreadable index cache: {}", e);
                VaultIndex::new(root.clone(), &config)
            }
        };

        debug!(root = %root.display(), "vault opened");
        Ok(Self {
            root,
            config,
            store,
            locks: LockTable::new(),
            index,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Normalize a note path given by a caller: absolute paths must lie under
    /// the root, `..` may not leave it, and `.md` is added when there is no
    /// extension.
    pub fn normalize_note_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .map_err(|_| VaultError::OutsideVault(path.to_path_buf()))?
        } else {
            path
        };

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(VaultError::OutsideVault(path.to_path_buf()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(VaultError::OutsideVault(path.to_path_buf()));
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(VaultError::InvalidInput("empty note path".to_string()));
        }
        if normalized.extension().is_none() {
            normalized.set_extension("md");
        }
        Ok(normalized)
    }

    /// Check if a note exists.
    pub fn note_exists(&self, path: impl AsRef<Path>) -> bool {
        self.normalize_note_path(path)
            .map(|rel| self.store.exists(&self.root.join(rel)))
            .unwrap_or(false)
    }

    /// List all notes in the vault.
    pub fn list_notes(&self) -> Result<Vec<PathBuf>> {
        list_note_paths(&self.root, &self.config.vault.ignored_dirs)
    }

    fn reader(&self) -> Reader<'_> {
        Reader {
            store: self.store.as_ref(),
            locks: &self.locks,
        }
    }

    /// Run `f` after bringing the index up to date, then persist it when
    /// caching is enabled.
    fn with_fresh_index<T>(&self, f: impl FnOnce(&VaultIndex, Reader<'_>) -> Result<T>) -> Result<T> {
        let reader = self.reader();
        self.index.refresh(reader)?;
        let value = f(&self.index, reader)?;
        if let Err(e) = self.index.save(self.store.as_ref()) {
            warn!("failed to save index: {}", e);
        }
        Ok(value)
    }

    fn document_refs(index: &VaultIndex, paths: Vec<PathBuf>) -> Vec<DocumentRef> {
        paths
            .into_iter()
            .map(|path| DocumentRef {
                tags: index.tags_of(&path),
                path,
            })
            .collect()
    }

    /// Notes whose tag set contains exactly `tag` (case-sensitive; a leading
    /// `#` is ignored).
    pub fn find_documents(&self, tag: &str) -> Result<Vec<DocumentRef>> {
        let tag = tag.trim();
        let tag = tag.strip_prefix('#').unwrap_or(tag);
        if tag.is_empty() || tag.chars().any(char::is_whitespace) {
            return Err(VaultError::InvalidInput(format!("invalid tag: {:?}", tag)));
        }

        self.with_fresh_index(|index, _| {
            let paths = index.paths_with_tag(tag);
            Ok(Self::document_refs(index, paths))
        })
    }

    /// Notes matching a query expression. The expression is parsed before
    /// any note is read.
    pub fn query(&self, expr: &str) -> Result<Vec<DocumentRef>> {
        let query = parse_query(expr)?;
        self.query_ast(&query)
    }

    /// Notes matching a structured filter, in the filter's sort order.
    pub fn filter(&self, filter: &NoteFilter) -> Result<Vec<DocumentRef>> {
        let query = Query::try_from(filter)?;
        let found = self.query_ast(&query)?;
        match (filter.sort, filter.reverse) {
            (None, false) => Ok(found),
            (key, reverse) => self.sort(found, key.unwrap_or_default(), reverse),
        }
    }

    /// Order `refs` by `key`. Notes without a value come last in either
    /// direction; ties fall back to path order.
    pub fn sort(&self, refs: Vec<DocumentRef>, key: SortKey, reverse: bool) -> Result<Vec<DocumentRef>> {
        let mut keyed = refs
            .into_iter()
            .map(|r| Ok((self.sort_value(&r.path, key)?, r)))
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(|(a, left), (b, right)| {
            let order = match (a, b) {
                (Some(a), Some(b)) if reverse => b.cmp(a),
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            order.then_with(|| left.path.cmp(&right.path))
        });
        Ok(keyed.into_iter().map(|(_, r)| r).collect())
    }

    fn sort_value(&self, rel: &Path, key: SortKey) -> Result<Option<SortValue>> {
        let abs = self.root.join(rel);
        let value = match key {
            SortKey::Path => Some(SortValue::Text(rel.to_string_lossy().to_lowercase())),
            SortKey::Title => {
                let doc = self.document(rel)?;
                let title = match doc.get_metadata("title").and_then(|v| v.as_str()) {
                    Some(title) => title.to_string(),
                    None => rel.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
                };
                Some(SortValue::Text(title.to_lowercase()))
            }
            SortKey::StartDate | SortKey::EndDate => {
                let field = if key == SortKey::StartDate { "start_date" } else { "end_date" };
                let doc = self.document(rel)?;
                doc.get_metadata(field).and_then(|v| v.as_date()).map(SortValue::Date)
            }
            SortKey::ModifiedDate => self.store.stamp(&abs).ok().map(|s| SortValue::Time(s.mtime_ns)),
            SortKey::CreatedDate => std::fs::metadata(&abs)
                .and_then(|m| m.created())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| SortValue::Time(d.as_nanos())),
        };
        Ok(value)
    }

    pub fn query_ast(&self, query: &Query) -> Result<Vec<DocumentRef>> {
        self.with_fresh_index(|index, reader| {
            let paths = index.query(reader, query)?;
            Ok(Self::document_refs(index, paths))
        })
    }

    /// The parsed note. Cached until the file changes.
    pub fn document(&self, path: impl AsRef<Path>) -> Result<Arc<Document>> {
        let rel = self.normalize_note_path(path)?;
        self.index.document(self.reader(), &rel)
    }

    /// The note's task forest.
    pub fn get_tasks(&self, path: impl AsRef<Path>) -> Result<Vec<TaskNode>> {
        Ok(self.document(path)?.tasks().to_vec())
    }

    pub fn get_metadata(&self, path: impl AsRef<Path>, key: &str) -> Result<Option<FieldValue>> {
        Ok(self.document(path)?.get_metadata(key).cloned())
    }

    pub fn task_stats(&self, path: impl AsRef<Path>) -> Result<TaskStats> {
        Ok(self.document(path)?.task_stats())
    }

    /// Task and tag totals over every note.
    pub fn vault_stats(&self) -> Result<VaultStats> {
        self.with_fresh_index(|index, reader| {
            let paths = index.paths();
            let mut stats = VaultStats {
                notes: paths.len(),
                tags: index.tag_count(),
                ..Default::default()
            };
            for path in &paths {
                let doc = index.document(reader, path)?;
                let note_stats = doc.task_stats();
                if note_stats.total > 0 {
                    stats.notes_with_tasks += 1;
                }
                if note_stats.pending > 0 {
                    stats.notes_with_pending_tasks += 1;
                }
                if !doc.issues().is_empty() {
                    stats.notes_with_issues += 1;
                }
                stats.tasks.add(&note_stats);
            }
            Ok(stats)
        })
    }

    /// Apply one operation: re-read, edit, back up, replace. Holds the note's
    /// write lease for the whole sequence.
    pub fn mutate(&self, path: impl AsRef<Path>, operation: &Operation) -> Result<MutationOutcome> {
        let rel = self.normalize_note_path(path)?;
        let abs = self.root.join(&rel);
        let result = self.locks.with_write(&abs, || {
            mutation::mutate(self.store.as_ref(), &self.root, &rel, self.config.edit_style(), operation)
        });
        self.forget(&rel, result.as_ref().map_or(true, |o| o.changed));
        result
    }

    /// Run `f` on a freshly read copy of the note and write the result back
    /// under the same discipline as [`Vault::mutate`]. Nothing is written
    /// when `f` fails or leaves the text unchanged.
    pub fn edit<T>(
        &self,
        path: impl AsRef<Path>,
        f: impl FnOnce(&mut Document) -> Result<T>,
    ) -> Result<Committed<T>> {
        let rel = self.normalize_note_path(path)?;
        let abs = self.root.join(&rel);
        let result = self.locks.with_write(&abs, || {
            mutation::commit(self.store.as_ref(), &self.root, &rel, self.config.edit_style(), f)
        });
        self.forget(&rel, result.as_ref().map_or(true, |c| c.changed));
        result
    }

    /// Write a new note named after `title`, or at `path` when given. Fails
    /// with [`VaultError::NoteExists`] instead of overwriting.
    pub fn create_note(
        &self,
        title: &str,
        body: &str,
        fields: &[(String, FieldValue)],
        path: Option<&Path>,
    ) -> Result<MutationOutcome> {
        let rel = match path {
            Some(path) => self.normalize_note_path(path)?,
            None => self.normalize_note_path(format!("{}.md", sanitize_title(title)))?,
        };
        let abs = self.root.join(&rel);
        let result = self.locks.with_write(&abs, || {
            mutation::create(self.store.as_ref(), &self.root, &rel, self.config.edit_style(), fields, body)
        });
        self.forget(&rel, result.is_ok());
        result
    }

    /// Drop the index entry of a note that may have been rewritten. Called
    /// after the write lease is released.
    fn forget(&self, rel: &Path, changed: bool) {
        if changed {
            self.index.invalidate(rel);
        }
    }

    /// Re-stat every note now.
    pub fn refresh_index(&self) -> Result<RefreshReport> {
        let report = self.index.refresh(self.reader())?;
        self.index.save(self.store.as_ref())?;
        Ok(report)
    }

    /// Drop the index and re-read every note.
    pub fn rebuild_index(&self) -> Result<RefreshReport> {
        self.index.clear()?;
        let report = self.index.refresh(self.reader())?;
        self.index.save(self.store.as_ref())?;
        Ok(report)
    }

    /// Drop the index and its persisted cache.
    pub fn clear_index(&self) -> Result<()> {
        self.index.clear()
    }

    pub fn index_status(&self) -> IndexStatus {
        self.index.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TaskRef;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const TRIP: &str = "---\ntags: [trip, business]\nstatus: planning\n---\n# Lisbon\n\n## Tasks\n- [ ] book flight\n  - [ ] window seat\n";

    fn setup_test_vault() -> (TempDir, Vault) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lisbon.md"), TRIP).unwrap();
        fs::write(dir.path().join("planning.md"), "---\ntags: [trip-planning]\n---\n").unwrap();
        let vault = Vault::new(dir.path()).unwrap();
        (dir, vault)
    }

    #[test]
    fn test_open_missing_vault() {
        assert!(matches!(
            Vault::new("/definitely/not/a/vault"),
            Err(VaultError::VaultNotFound(_))
        ));
    }

    #[test]
    fn test_normalize_note_path() {
        let (dir, vault) = setup_test_vault();
        assert_eq!(vault.normalize_note_path("lisbon").unwrap(), PathBuf::from("lisbon.md"));
        assert_eq!(
            vault.normalize_note_path("a/./b/../c.md").unwrap(),
            PathBuf::from("a/c.md")
        );
        assert_eq!(
            vault.normalize_note_path(dir.path().join("lisbon.md")).unwrap(),
            PathBuf::from("lisbon.md")
        );
        assert!(matches!(
            vault.normalize_note_path("../outside.md"),
            Err(VaultError::OutsideVault(_))
        ));
        assert!(matches!(
            vault.normalize_note_path("/etc/passwd"),
            Err(VaultError::OutsideVault(_))
        ));
    }

    #[test]
    fn test_find_documents_exact_tag() {
        let (_dir, vault) = setup_test_vault();
        let found = vault.find_documents("trip").unwrap();
        assert_eq!(
            found,
            vec![DocumentRef {
                path: PathBuf::from("lisbon.md"),
                tags: vec!["trip".to_string(), "business".to_string()],
            }]
        );
        assert_eq!(vault.find_documents("#trip").unwrap().len(), 1);
        assert!(vault.find_documents("Trip").unwrap().is_empty());
        assert!(matches!(vault.find_documents(" "), Err(VaultError::InvalidInput(_))));
    }

    #[test]
    fn test_query_error_before_reading() {
        let (_dir, vault) = setup_test_vault();
        assert!(matches!(vault.query("tag:(a"), Err(VaultError::QueryError(_))));
        assert_eq!(vault.index_status().notes, 0);
    }

    #[test]
    fn test_mutation_is_visible_to_reads() {
        let (_dir, vault) = setup_test_vault();
        let before = vault.get_tasks("lisbon").unwrap();
        let task = TaskRef::from(&before[0].children[0]);

        let outcome = vault
            .mutate("lisbon", &Operation::ToggleTask { task, checked: Some(true) })
            .unwrap();
        assert!(outcome.changed);

        let stats = vault.task_stats("lisbon").unwrap();
        assert_eq!((stats.completed, stats.pending), (1, 1));
    }

    #[test]
    fn test_edit_scoped() {
        let (dir, vault) = setup_test_vault();
        let committed = vault
            .edit("lisbon.md", |doc| {
                doc.set_metadata("status", FieldValue::Scalar("booked".to_string()))?;
                doc.append_text("Tasks", "remember the adapter")
            })
            .unwrap();
        assert!(committed.changed);
        assert!(committed.backup.is_some());

        let text = fs::read_to_string(dir.path().join("lisbon.md")).unwrap();
        assert!(text.contains("status: booked\n"));
        assert!(text.ends_with("  - [ ] window seat\n\nremember the adapter\n"));
        assert_eq!(
            vault.get_metadata("lisbon", "status").unwrap(),
            Some(FieldValue::Scalar("booked".to_string()))
        );
    }

    #[test]
    fn test_vault_stats() {
        let (_dir, vault) = setup_test_vault();
        let stats = vault.vault_stats().unwrap();
        assert_eq!(stats.notes, 2);
        assert_eq!(stats.tags, 3);
        assert_eq!(stats.notes_with_tasks, 1);
        assert_eq!(stats.tasks.total, 2);
    }

    fn paths(refs: &[DocumentRef]) -> Vec<&str> {
        refs.iter().map(|r| r.path.to_str().unwrap()).collect()
    }

    #[test]
    fn test_filter_sorting() {
        let (dir, vault) = setup_test_vault();
        fs::write(dir.path().join("porto.md"), "---\ntitle: Zebra\nstart_date: 2026-05-01\n---\n").unwrap();
        fs::write(dir.path().join("athens.md"), "---\nstart_date: 2026-04-01\n---\n").unwrap();

        let by_start = NoteFilter {
            sort: Some(SortKey::StartDate),
            ..Default::default()
        };
        let found = vault.filter(&by_start).unwrap();
        assert_eq!(paths(&found), vec!["athens.md", "porto.md", "lisbon.md", "planning.md"]);

        let reversed = NoteFilter {
            reverse: true,
            ..by_start
        };
        let found = vault.filter(&reversed).unwrap();
        assert_eq!(paths(&found), vec!["porto.md", "athens.md", "lisbon.md", "planning.md"]);

        let by_title = NoteFilter {
            sort: Some(SortKey::Title),
            ..Default::default()
        };
        let found = vault.filter(&by_title).unwrap();
        assert_eq!(paths(&found), vec!["athens.md", "lisbon.md", "planning.md", "porto.md"]);
    }

    #[test]
    fn test_filter_rejects_reversed_date_range() {
        let (_dir, vault) = setup_test_vault();
        let filter = NoteFilter {
            date_range: NaiveDate::from_ymd_opt(2026, 3, 31).zip(NaiveDate::from_ymd_opt(2026, 3, 1)),
            ..Default::default()
        };
        assert!(matches!(vault.filter(&filter), Err(VaultError::QueryError(_))));
        assert_eq!(vault.index_status().notes, 0);
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Porto: Q3?"), "Porto_ Q3_");
        assert_eq!(sanitize_title("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_title(" ..notes.. "), "notes");
        assert_eq!(sanitize_title("line\nbreak"), "line_break");
        assert_eq!(sanitize_title("..."), "untitled");
        assert_eq!(sanitize_title(&"x".repeat(150)).len(), 100);
    }

    #[test]
    fn test_create_note() {
        let (dir, vault) = setup_test_vault();
        let fields = vec![("status".to_string(), FieldValue::Scalar("idea".to_string()))];
        let outcome = vault.create_note("Porto: Q3?", "# Porto\n", &fields, None).unwrap();
        assert_eq!(outcome.path, PathBuf::from("Porto_ Q3_.md"));
        assert_eq!(
            fs::read_to_string(dir.path().join("Porto_ Q3_.md")).unwrap(),
            "---\nstatus: idea\n---\n\n# Porto\n"
        );
        assert_eq!(
            vault.get_metadata("Porto_ Q3_", "status").unwrap(),
            Some(FieldValue::Scalar("idea".to_string()))
        );

        let outcome = vault
            .create_note("ignored", "hello", &[], Some(Path::new("inbox/today")))
            .unwrap();
        assert_eq!(outcome.path, PathBuf::from("inbox/today.md"));
        assert_eq!(fs::read_to_string(dir.path().join("inbox/today.md")).unwrap(), "hello\n");

        assert!(matches!(
            vault.create_note("lisbon", "", &[], None),
            Err(VaultError::NoteExists(_))
        ));
        assert_eq!(fs::read_to_string(dir.path().join("lisbon.md")).unwrap(), TRIP);
        assert!(matches!(
            vault.create_note("x", "", &[], Some(Path::new("../x.md"))),
            Err(VaultError::OutsideVault(_))
        ));
    }
}
