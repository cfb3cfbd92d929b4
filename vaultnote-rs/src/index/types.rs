//! Index data structures.

use crate::document::Document;
use crate::parser::frontmatter::FieldValue;
use crate::store::FileStamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Persisted index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index format version.
    pub version: u32,
    /// Vault root path.
    pub vault_path: PathBuf,
    /// Last full refresh timestamp.
    pub last_full_index: Option<String>,
    /// Number of indexed notes.
    pub indexed_notes: usize,
    /// Header fields captured in each snapshot.
    pub promoted_fields: Vec<String>,
    /// Crate version that wrote the index.
    pub vaultnote_version: String,
}

impl IndexMeta {
    pub fn new(vault_path: PathBuf, promoted_fields: Vec<String>) -> Self {
        Self {
            version: super::CACHE_VERSION,
            vault_path,
            last_full_index: None,
            indexed_notes: 0,
            promoted_fields,
            vaultnote_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// What the index remembers about a note without keeping it parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    /// Relative path from the vault root.
    pub path: PathBuf,
    /// Stamp of the file the snapshot was taken from.
    pub stamp: FileStamp,
    pub tags: Vec<String>,
    /// Promoted header fields that are present in the note.
    pub fields: BTreeMap<String, FieldValue>,
}

impl NoteSnapshot {
    pub fn from_document(path: PathBuf, stamp: FileStamp, doc: &Document, promoted: &[String]) -> Self {
        let fields = promoted
            .iter()
            .filter_map(|key| doc.get_metadata(key).map(|v| (key.clone(), v.clone())))
            .collect();
        Self {
            path,
            stamp,
            tags: doc.tags(),
            fields,
        }
    }
}

/// An index entry: the snapshot plus the parsed note once something asked
/// for it.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub snapshot: NoteSnapshot,
    pub document: Option<Arc<Document>>,
}

/// Counts reported by a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub total: usize,
    pub reindexed: usize,
    pub removed: usize,
}

/// Index summary for `index status`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub notes: usize,
    pub tags: usize,
    pub parsed_documents: usize,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_full_index: Option<String>,
}
