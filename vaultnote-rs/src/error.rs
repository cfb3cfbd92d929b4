//! Error types and exit codes for vaultnote.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Process exit codes used by the CLI.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOTE_NOT_FOUND: i32 = 2;
    pub const QUERY_ERROR: i32 = 3;
    pub const TASK_REF_STALE: i32 = 4;
    pub const WRITE_FAILURE: i32 = 5;
    pub const SECTION_NOT_FOUND: i32 = 6;
    pub const CHECK_ISSUES_FOUND: i32 = 10;
}

/// Main error type for vaultnote operations.
///
/// Parsing never produces an error: malformed input degrades to opaque text
/// and is reported through [`crate::parser::ParseIssue`] instead.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Note not found: {0}")]
    NoteNotFound(PathBuf),

    #[error("Note already exists: {0}")]
    NoteExists(PathBuf),

    #[error("Vault not found at: {0}")]
    VaultNotFound(PathBuf),

    #[error("Path escapes the vault root: {0}")]
    OutsideVault(PathBuf),

    #[error("Section not found in {note}: {section}")]
    SectionNotFound { note: PathBuf, section: String },

    #[error("Task not found in {note}: {query}")]
    TaskNotFound { note: PathBuf, query: String },

    /// The task handle no longer points at the task it was taken from.
    #[error("Stale task reference at line {line} (expected {expected:?}, found {found:?})")]
    TaskRefStale {
        line: usize,
        expected: String,
        found: String,
    },

    /// Filesystem failure while replacing a note. The original bytes are
    /// still available in `backup`.
    #[error("Write failed for {path} (backup at {backup}): {source}")]
    WriteFailure {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid query: {0}")]
    QueryError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),
}

impl VaultError {
    /// Fill in the note path of errors raised by document-level code, which
    /// does not know where the note lives.
    pub fn in_note(self, path: &Path) -> Self {
        match self {
            VaultError::SectionNotFound { note, section } if note.as_os_str().is_empty() => {
                VaultError::SectionNotFound {
                    note: path.to_path_buf(),
                    section,
                }
            }
            VaultError::TaskNotFound { note, query } if note.as_os_str().is_empty() => {
                VaultError::TaskNotFound {
                    note: path.to_path_buf(),
                    query,
                }
            }
            other => other,
        }
    }

    /// Returns the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            VaultError::NoteNotFound(_) => exit_code::NOTE_NOT_FOUND,
            VaultError::QueryError(_) => exit_code::QUERY_ERROR,
            VaultError::TaskRefStale { .. } | VaultError::TaskNotFound { .. } => {
                exit_code::TASK_REF_STALE
            }
            VaultError::WriteFailure { .. } => exit_code::WRITE_FAILURE,
            VaultError::SectionNotFound { .. } => exit_code::SECTION_NOT_FOUND,
            _ => exit_code::GENERAL_ERROR,
        }
    }
}

/// Result type alias for vaultnote operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    GeneralError,
    CheckIssuesFound,
}

impl ExitCode {
    /// Convert to exit code integer.
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => exit_code::SUCCESS,
            ExitCode::GeneralError => exit_code::GENERAL_ERROR,
            ExitCode::CheckIssuesFound => exit_code::CHECK_ISSUES_FOUND,
        }
    }
}
