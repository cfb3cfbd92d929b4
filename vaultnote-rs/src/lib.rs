//! vaultnote - a lossless note engine for Markdown vaults.
//!
//! # Overview
//!
//! vaultnote reads a directory of Markdown notes with YAML-style front matter
//! and nested checklists, and lets automated callers:
//! - find notes by tag, header field, date range or task state
//! - read task trees and completion counts
//! - apply targeted edits (set a header field, add or toggle a task, append
//!   text under a section) that leave every other byte of the note as it was
//!
//! Parsing a note and serializing it again without edits reproduces the file
//! exactly. Every edit re-reads the note, writes a timestamped backup beside
//! it, and replaces the file atomically.
//!
//! # Example
//!
//! ```no_run
//! use vaultnote::{Operation, Vault};
//!
//! let vault = Vault::new("/path/to/vault").unwrap();
//!
//! for note in vault.find_documents("trip").unwrap() {
//!     let stats = vault.task_stats(&note.path).unwrap();
//!     println!("{}: {}/{} done", note.path.display(), stats.completed, stats.total);
//! }
//!
//! let op = Operation::AddTask {
//!     section: "Tasks".to_string(),
//!     text: "pack bags".to_string(),
//!     depth: 0,
//! };
//! vault.mutate("lisbon.md", &op).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod lock;
pub mod mutation;
pub mod parser;
pub mod query;
pub mod store;
pub mod vault;

// Re-export main types at crate root
pub use config::Config;
pub use document::{Document, EditStyle, TaskRef, TaskStats};
pub use error::{Result, VaultError};
pub use mutation::{MutationOutcome, Operation};
pub use parser::{FieldValue, TaskNode};
pub use query::{parse_query, NoteFilter, Query, SortKey};
pub use store::{FsStore, NoteStore};
pub use vault::{sanitize_title, DocumentRef, Vault, VaultStats};
