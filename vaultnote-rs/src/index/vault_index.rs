//! Index management.
//!
//! The index state sits behind one `RwLock`, but no file is ever read while
//! that lock is held: notes are stat'ed and loaded (under their own read
//! lease) first, and the lock is taken afterwards only to look up or install
//! entries. A writer holding one note's lease therefore never delays reads of
//! another note.

use super::types::*;
use super::{list_note_paths, CacheDir, CACHE_VERSION};
use crate::config::Config;
use crate::document::{Document, EditStyle};
use crate::error::{Result, VaultError};
use crate::lock::LockTable;
use crate::parser::frontmatter::FieldValue;
use crate::query::{evaluate, NoteSource, Query};
use crate::store::{FileStamp, NoteStore};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// How the index reads notes: through the store, under the note's read
/// lease.
#[derive(Clone, Copy)]
pub struct Reader<'a> {
    pub store: &'a dyn NoteStore,
    pub locks: &'a LockTable,
}

impl Reader<'_> {
    fn load(&self, abs: &Path) -> io::Result<(FileStamp, String)> {
        self.locks.with_read(abs, || {
            let stamp = self.store.stamp(abs)?;
            let text = self.store.read(abs)?;
            Ok((stamp, text))
        })
    }
}

/// A note read and parsed outside the index lock, ready to install.
struct LoadedNote {
    snapshot: NoteSnapshot,
    document: Arc<Document>,
}

/// Everything needed to turn a path into a [`LoadedNote`].
#[derive(Debug, Clone)]
struct Loader {
    root: PathBuf,
    style: EditStyle,
    promoted: Vec<String>,
}

impl Loader {
    /// `Ok(None)` when the note vanished.
    fn load(&self, reader: Reader<'_>, path: &Path) -> Result<Option<LoadedNote>> {
        let (stamp, text) = match reader.load(&self.root.join(path)) {
            Ok(loaded) => loaded,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document = Arc::new(Document::parse_with_style(&text, self.style));
        for issue in document.issues() {
            warn!(note = %path.display(), line = issue.line + 1, "{}", issue.message);
        }
        let snapshot = NoteSnapshot::from_document(path.to_path_buf(), stamp, &document, &self.promoted);
        debug!(note = %path.display(), "note indexed");
        Ok(Some(LoadedNote { snapshot, document }))
    }
}

#[derive(Debug)]
struct IndexState {
    meta: IndexMeta,
    entries: BTreeMap<PathBuf, IndexEntry>,
    tags: BTreeMap<String, BTreeSet<PathBuf>>,
    /// Whether snapshots changed since the last save.
    dirty: bool,
}

impl IndexState {
    fn insert(&mut self, snapshot: NoteSnapshot, document: Option<Arc<Document>>) {
        for tag in &snapshot.tags {
            self.tags.entry(tag.clone()).or_default().insert(snapshot.path.clone());
        }
        self.entries
            .insert(snapshot.path.clone(), IndexEntry { snapshot, document });
    }

    fn invalidate(&mut self, path: &Path) -> bool {
        let Some(entry) = self.entries.remove(path) else {
            return false;
        };
        for tag in &entry.snapshot.tags {
            if let Some(paths) = self.tags.get_mut(tag) {
                paths.remove(path);
                if paths.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        self.dirty = true;
        true
    }

    /// Store a loaded note. An unchanged snapshot only gains its document.
    fn install(&mut self, note: LoadedNote) {
        if let Some(entry) = self.entries.get_mut(&note.snapshot.path) {
            if entry.snapshot == note.snapshot {
                entry.document = Some(note.document);
                return;
            }
        }
        self.invalidate(&note.snapshot.path);
        self.insert(note.snapshot, Some(note.document));
        self.dirty = true;
    }

    fn is_fresh(&self, path: &Path, stamp: FileStamp) -> bool {
        self.entries.get(path).is_some_and(|e| e.snapshot.stamp == stamp)
    }

    fn cached(&self, path: &Path, stamp: FileStamp) -> Option<Arc<Document>> {
        self.entries
            .get(path)
            .filter(|e| e.snapshot.stamp == stamp)
            .and_then(|e| e.document.clone())
    }
}

/// The vault index. Shared by reference between threads.
#[derive(Debug)]
pub struct VaultIndex {
    root: PathBuf,
    ignored_dirs: Vec<String>,
    loader: Loader,
    /// Where snapshots are persisted, when enabled.
    cache: Option<CacheDir>,
    state: RwLock<IndexState>,
}

impl VaultIndex {
    /// Create an empty in-memory index.
    pub fn new(root: PathBuf, config: &Config) -> Self {
        let promoted = config.index.promoted_fields.clone();
        Self {
            state: RwLock::new(IndexState {
                meta: IndexMeta::new(root.clone(), promoted.clone()),
                entries: BTreeMap::new(),
                tags: BTreeMap::new(),
                dirty: false,
            }),
            loader: Loader {
                root: root.clone(),
                style: config.edit_style(),
                promoted,
            },
            root,
            ignored_dirs: config.vault.ignored_dirs.clone(),
            cache: None,
        }
    }

    /// Create an index, loading persisted snapshots when the cache is
    /// enabled. An outdated or mismatched cache is discarded.
    pub fn load(root: PathBuf, config: &Config) -> Result<Self> {
        let mut index = Self::new(root, config);
        if !config.cache.enabled {
            return Ok(index);
        }

        let cache = CacheDir::for_vault(&index.root, &config.cache);
        let meta: Option<IndexMeta> = cache.read_json("meta.json")?;
        let fresh = meta.filter(|meta| {
            meta.version == CACHE_VERSION
                && meta.vault_path == index.root
                && meta.promoted_fields == index.loader.promoted
        });

        if let Some(meta) = fresh {
            let snapshots: Vec<NoteSnapshot> = cache.read_json("index.json")?.unwrap_or_default();
            let state = index.state.get_mut().unwrap_or_else(PoisonError::into_inner);
            for snapshot in snapshots {
                state.insert(snapshot, None);
            }
            state.meta = meta;
            debug!(notes = state.entries.len(), "loaded index cache");
        } else {
            debug!(cache = %cache.path().display(), "no usable index cache");
        }

        index.cache = Some(cache);
        Ok(index)
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist snapshots through `store`, if persistence is enabled and
    /// anything changed. The files are written after the lock is released.
    pub fn save(&self, store: &dyn NoteStore) -> Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let (meta_json, index_json, notes) = {
            let mut state = self.write();
            if !state.dirty {
                return Ok(());
            }
            state.meta.indexed_notes = state.entries.len();
            let snapshots: Vec<&NoteSnapshot> = state.entries.values().map(|e| &e.snapshot).collect();
            let meta_json = to_json("meta.json", &state.meta)?;
            let index_json = to_json("index.json", &snapshots)?;
            let notes = snapshots.len();
            state.dirty = false;
            (meta_json, index_json, notes)
        };

        let written = cache.write_files(store, &[("meta.json", meta_json), ("index.json", index_json)]);
        if written.is_err() {
            self.write().dirty = true;
        } else {
            debug!(cache = %cache.path().display(), notes, "index saved");
        }
        written
    }

    /// Drop every entry and delete the persisted cache.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.write();
        state.entries.clear();
        state.tags.clear();
        state.meta.last_full_index = None;
        state.dirty = false;
        if let Some(cache) = &self.cache {
            cache.remove()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> IndexStatus {
        let state = self.read();
        IndexStatus {
            notes: state.entries.len(),
            tags: state.tags.len(),
            parsed_documents: state.entries.values().filter(|e| e.document.is_some()).count(),
            persisted: self.cache.is_some(),
            cache_dir: self.cache.as_ref().map(|c| c.path().to_path_buf()),
            last_full_index: state.meta.last_full_index.clone(),
        }
    }

    pub fn tag_count(&self) -> usize {
        self.read().tags.len()
    }

    /// Tags recorded for `path`; empty when it is not indexed.
    pub fn tags_of(&self, path: &Path) -> Vec<String> {
        self.read()
            .entries
            .get(path)
            .map(|e| e.snapshot.tags.clone())
            .unwrap_or_default()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.read().entries.keys().cloned().collect()
    }

    /// Notes carrying exactly `tag`.
    pub fn paths_with_tag(&self, tag: &str) -> Vec<PathBuf> {
        self.read()
            .tags
            .get(tag)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Re-stat every note: re-extract stale snapshots, add new notes and
    /// drop deleted ones.
    pub fn refresh(&self, reader: Reader<'_>) -> Result<RefreshReport> {
        let mut stamps = Vec::new();
        for path in list_note_paths(&self.root, &self.ignored_dirs)? {
            match reader.store.stamp(&self.root.join(&path)) {
                Ok(stamp) => stamps.push((path, stamp)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let stale: Vec<&PathBuf> = {
            let state = self.read();
            stamps
                .iter()
                .filter(|(path, stamp)| !state.is_fresh(path, *stamp))
                .map(|(path, _)| path)
                .collect()
        };
        let mut loaded = Vec::new();
        for path in stale {
            loaded.extend(self.loader.load(reader, path)?);
        }

        let present: HashSet<&PathBuf> = stamps.iter().map(|(path, _)| path).collect();
        let mut state = self.write();
        let deleted: Vec<PathBuf> = state.entries.keys().filter(|p| !present.contains(p)).cloned().collect();
        for path in &deleted {
            state.invalidate(path);
        }
        let reindexed = loaded.len();
        for note in loaded {
            state.install(note);
        }

        if reindexed > 0 || !deleted.is_empty() || state.meta.last_full_index.is_none() {
            state.meta.last_full_index = Some(chrono::Utc::now().to_rfc3339());
            state.dirty = true;
        }

        debug!(total = stamps.len(), reindexed, removed = deleted.len(), "index refreshed");
        Ok(RefreshReport {
            total: stamps.len(),
            reindexed,
            removed: deleted.len(),
        })
    }

    /// Drop the entry for `path`. Returns whether one existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.write().invalidate(path)
    }

    /// The parsed note, re-read when its file changed.
    pub fn document(&self, reader: Reader<'_>, path: &Path) -> Result<Arc<Document>> {
        let stamp = match reader.store.stamp(&self.root.join(path)) {
            Ok(stamp) => stamp,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.invalidate(path);
                return Err(VaultError::NoteNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let cached = self.read().cached(path, stamp);
        if let Some(doc) = cached {
            return Ok(doc);
        }

        let note = self
            .loader
            .load(reader, path)?
            .ok_or_else(|| VaultError::NoteNotFound(path.to_path_buf()))?;
        let doc = Arc::clone(&note.document);
        self.write().install(note);
        Ok(doc)
    }

    /// Paths of the indexed notes matching `query`. Entries must be fresh
    /// (see [`VaultIndex::refresh`]). Notes are parsed only when the query
    /// looks past tags, paths and promoted fields.
    pub fn query(&self, reader: Reader<'_>, query: &Query) -> Result<Vec<PathBuf>> {
        let needs_document = query.needs_document(&self.loader.promoted);
        let mut loaded = BTreeMap::new();
        if needs_document {
            let unparsed: Vec<PathBuf> = self
                .read()
                .entries
                .iter()
                .filter(|(_, e)| e.document.is_none())
                .map(|(path, _)| path.clone())
                .collect();
            for path in unparsed {
                if let Some(note) = self.loader.load(reader, &path)? {
                    loaded.insert(path, note);
                }
            }
        }

        let mut matches = Vec::new();
        {
            let state = self.read();
            for (path, entry) in &state.entries {
                let candidate = match loaded.get(path) {
                    Some(note) => Candidate {
                        snapshot: &note.snapshot,
                        document: Some(note.document.as_ref()),
                        promoted: &self.loader.promoted,
                    },
                    None => Candidate {
                        snapshot: &entry.snapshot,
                        document: entry.document.as_deref(),
                        promoted: &self.loader.promoted,
                    },
                };
                // Vanished between refresh and load.
                if needs_document && candidate.document.is_none() {
                    continue;
                }
                if evaluate(query, &candidate)? {
                    matches.push(path.clone());
                }
            }
        }

        if !loaded.is_empty() {
            let mut state = self.write();
            for note in loaded.into_values() {
                state.install(note);
            }
        }
        Ok(matches)
    }
}

fn to_json<T: serde::Serialize>(name: &str, data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| VaultError::IndexError(format!("Failed to serialize {}: {}", name, e)))
}

/// An index entry seen through [`NoteSource`].
struct Candidate<'a> {
    snapshot: &'a NoteSnapshot,
    document: Option<&'a Document>,
    promoted: &'a [String],
}

impl NoteSource for Candidate<'_> {
    fn path(&self) -> &Path {
        &self.snapshot.path
    }

    fn tags(&self) -> &[String] {
        &self.snapshot.tags
    }

    fn snapshot_field(&self, key: &str) -> Option<Option<&FieldValue>> {
        if self.promoted.iter().any(|p| p == key) {
            Some(self.snapshot.fields.get(key))
        } else {
            None
        }
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .ok_or_else(|| VaultError::IndexError(format!("{} is not parsed", self.snapshot.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;
    use crate::store::FsStore;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn create_vault() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("travel")).unwrap();
        fs::write(
            root.join("travel/lisbon.md"),
            "---\ntags: [trip, business]\nstatus: booked\n---\n## Tasks\n- [ ] book flight\n",
        )
        .unwrap();
        fs::write(root.join("planning.md"), "---\ntags: [trip-planning]\n---\nideas\n").unwrap();
        fs::write(root.join("plain.md"), "no header\n- [x] done\n").unwrap();
        temp_dir
    }

    fn reader<'a>(locks: &'a LockTable) -> Reader<'a> {
        Reader { store: &FsStore, locks }
    }

    #[test]
    fn test_refresh_and_tag_lookup() {
        let temp_dir = create_vault();
        let locks = LockTable::new();
        let index = VaultIndex::new(temp_dir.path().to_path_buf(), &Config::default());

        let report = index.refresh(reader(&locks)).unwrap();
        assert_eq!(report, RefreshReport { total: 3, reindexed: 3, removed: 0 });
        assert_eq!(index.paths_with_tag("trip"), vec![PathBuf::from("travel/lisbon.md")]);
        assert!(index.paths_with_tag("Trip").is_empty());
        assert_eq!(index.paths_with_tag("trip-planning"), vec![PathBuf::from("planning.md")]);

        let report = index.refresh(reader(&locks)).unwrap();
        assert_eq!(report.reindexed, 0);
    }

    #[test]
    fn test_refresh_picks_up_changes_and_deletions() {
        let temp_dir = create_vault();
        let locks = LockTable::new();
        let index = VaultIndex::new(temp_dir.path().to_path_buf(), &Config::default());
        index.refresh(reader(&locks)).unwrap();

        // Size changes too, so the stamp differs even on coarse clocks.
        thread::sleep(Duration::from_millis(10));
        fs::write(temp_dir.path().join("planning.md"), "---\ntags: [trip]\n---\nnow a trip\n").unwrap();
        fs::remove_file(temp_dir.path().join("plain.md")).unwrap();

        let report = index.refresh(reader(&locks)).unwrap();
        assert_eq!(report, RefreshReport { total: 2, reindexed: 1, removed: 1 });
        assert_eq!(
            index.paths_with_tag("trip"),
            vec![PathBuf::from("planning.md"), PathBuf::from("travel/lisbon.md")]
        );
        assert!(index.paths_with_tag("trip-planning").is_empty());
    }

    #[test]
    fn test_query_parses_only_when_needed() {
        let temp_dir = create_vault();
        let locks = LockTable::new();
        let mut config = Config::default();
        config.cache.enabled = true;
        config.cache.location = "local".to_string();

        let index = VaultIndex::load(temp_dir.path().to_path_buf(), &config).unwrap();
        index.refresh(reader(&locks)).unwrap();
        index.save(&FsStore).unwrap();

        // Snapshots only, no parsed documents.
        let index = VaultIndex::load(temp_dir.path().to_path_buf(), &config).unwrap();
        index.refresh(reader(&locks)).unwrap();
        assert_eq!(index.status().parsed_documents, 0);

        let query = parse_query("property:status=booked").unwrap();
        assert_eq!(index.query(reader(&locks), &query).unwrap(), vec![PathBuf::from("travel/lisbon.md")]);
        assert_eq!(index.status().parsed_documents, 0);

        let query = parse_query("tasks:done").unwrap();
        assert_eq!(index.query(reader(&locks), &query).unwrap(), vec![PathBuf::from("plain.md")]);
        assert_eq!(index.status().parsed_documents, 3);
    }

    #[test]
    fn test_document_is_cached_until_file_changes() {
        let temp_dir = create_vault();
        let locks = LockTable::new();
        let index = VaultIndex::new(temp_dir.path().to_path_buf(), &Config::default());

        let first = index.document(reader(&locks), Path::new("plain.md")).unwrap();
        let second = index.document(reader(&locks), Path::new("plain.md")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        fs::write(temp_dir.path().join("plain.md"), "changed and longer\n").unwrap();
        let third = index.document(reader(&locks), Path::new("plain.md")).unwrap();
        assert_eq!(third.serialize(), "changed and longer\n");

        let err = index.document(reader(&locks), Path::new("missing.md")).unwrap_err();
        assert!(matches!(err, VaultError::NoteNotFound(_)));
    }

    #[test]
    fn test_cached_read_does_not_wait_for_another_note() {
        let temp_dir = create_vault();
        let locks = LockTable::new();
        let index = VaultIndex::new(temp_dir.path().to_path_buf(), &Config::default());
        index.document(reader(&locks), Path::new("plain.md")).unwrap();

        let busy = temp_dir.path().join("planning.md");
        let (held, lease_taken) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                locks.with_write(&busy, || {
                    held.send(()).unwrap();
                    thread::sleep(Duration::from_millis(800));
                })
            });
            lease_taken.recv().unwrap();

            // Blocks on the held lease; must not hold the index while doing so.
            s.spawn(|| index.document(reader(&locks), Path::new("planning.md")).unwrap());
            thread::sleep(Duration::from_millis(50));

            let started = Instant::now();
            index.document(reader(&locks), Path::new("plain.md")).unwrap();
            assert_eq!(index.paths_with_tag("trip"), vec![PathBuf::from("travel/lisbon.md")]);
            assert!(started.elapsed() < Duration::from_millis(300), "took {:?}", started.elapsed());
        });
    }

    #[test]
    fn test_persisted_index_round_trip() {
        let temp_dir = create_vault();
        let locks = LockTable::new();
        let mut config = Config::default();
        config.cache.enabled = true;
        config.cache.location = "local".to_string();

        let index = VaultIndex::load(temp_dir.path().to_path_buf(), &config).unwrap();
        index.refresh(reader(&locks)).unwrap();
        index.save(&FsStore).unwrap();

        let cache_dir = temp_dir.path().join(".vaultnote/cache");
        assert!(cache_dir.join("meta.json").exists());
        assert!(cache_dir.join("index.json").exists());

        let reloaded = VaultIndex::load(temp_dir.path().to_path_buf(), &config).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.status().parsed_documents, 0);
        assert_eq!(reloaded.refresh(reader(&locks)).unwrap().reindexed, 0);

        // A different promoted field set invalidates the cache.
        config.index.promoted_fields = vec!["status".to_string()];
        let fresh = VaultIndex::load(temp_dir.path().to_path_buf(), &config).unwrap();
        assert!(fresh.is_empty());

        reloaded.clear().unwrap();
        assert!(!cache_dir.exists());
    }
}
