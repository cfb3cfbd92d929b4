//! Query AST.

use crate::error::VaultError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A query AST node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    /// A predicate on one aspect of a note.
    Field(Predicate),
    /// All children must match. An empty `And` matches every note.
    And { children: Vec<Query> },
    /// At least one child must match.
    Or { children: Vec<Query> },
    /// The child must NOT match.
    Not { child: Box<Query> },
}

/// A predicate on a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Predicate {
    /// Exact, case-sensitive tag match.
    Tag { value: String },
    /// Header field comparison.
    Property {
        key: String,
        op: PropertyOp,
        value: Option<String>,
    },
    /// Any of the date fields falls within the range (inclusive). Open ends
    /// are unbounded.
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    /// Task completion state.
    Tasks { state: TaskState },
    /// Note path relative to the vault root.
    Path { matcher: StringMatcher },
    /// Any body line.
    Content { matcher: StringMatcher },
}

/// How to match a string value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StringMatcher {
    /// Case-insensitive substring match (default).
    Contains { value: String },
    /// Exact string match.
    Exact { value: String },
    /// Regular expression match.
    Regex { pattern: String },
}

/// Comparison operator for property predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOp {
    /// Property exists (any value).
    Exists,
    Eq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// At least one unchecked task.
    Pending,
    /// At least one task, all checked.
    Done,
    /// No tasks at all.
    None,
    /// At least one task.
    Any,
}

/// Header fields a date range is checked against.
pub const DATE_FIELDS: &[&str] = &["start_date", "end_date", "due_date"];

impl Query {
    /// A query that matches every note.
    pub fn all() -> Self {
        Query::And { children: Vec::new() }
    }

    /// Visit every predicate in the tree.
    fn predicates(&self) -> Vec<&Predicate> {
        match self {
            Query::Field(p) => vec![p],
            Query::And { children } | Query::Or { children } => {
                children.iter().flat_map(Query::predicates).collect()
            }
            Query::Not { child } => child.predicates(),
        }
    }

    /// Whether evaluating the query needs more than the index snapshot
    /// (tags plus the promoted header fields).
    pub fn needs_document(&self, promoted: &[String]) -> bool {
        let is_promoted = |key: &str| promoted.iter().any(|p| p == key);
        self.predicates().into_iter().any(|p| match p {
            Predicate::Tag { .. } | Predicate::Path { .. } => false,
            Predicate::Property { key, .. } => !is_promoted(key),
            Predicate::DateRange { .. } => !DATE_FIELDS.iter().all(|f| is_promoted(f)),
            Predicate::Tasks { .. } | Predicate::Content { .. } => true,
        })
    }
}

/// Tag combination mode for [`NoteFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMode {
    /// Every tag must be present.
    #[default]
    All,
    /// At least one tag must be present.
    Any,
}

/// Order of query results. Notes missing the value sort last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// `title` header field, else the file name; case-insensitive.
    Title,
    StartDate,
    EndDate,
    /// File creation time, where the filesystem records one.
    CreatedDate,
    ModifiedDate,
    /// Relative path; case-insensitive.
    #[default]
    Path,
}

impl SortKey {
    pub const ALL: &'static [SortKey] = &[
        SortKey::Title,
        SortKey::StartDate,
        SortKey::EndDate,
        SortKey::CreatedDate,
        SortKey::ModifiedDate,
        SortKey::Path,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Title => "title",
            SortKey::StartDate => "start_date",
            SortKey::EndDate => "end_date",
            SortKey::CreatedDate => "created_date",
            SortKey::ModifiedDate => "modified_date",
            SortKey::Path => "path",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortKey::ALL.iter().copied().find(|k| k.as_str() == s).ok_or_else(|| {
            let valid: Vec<&str> = SortKey::ALL.iter().map(|k| k.as_str()).collect();
            VaultError::QueryError(format!("Invalid sort field '{}'. Valid options: {}", s, valid.join(", ")))
        })
    }
}

/// Structured note filter, converted into a [`Query`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteFilter {
    pub tags: Vec<String>,
    pub tag_mode: TagMode,
    /// Inclusive; the start may not be after the end.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// Header fields that must equal the given values.
    pub properties: Vec<(String, String)>,
    /// `Some(true)`: notes with pending tasks; `Some(false)`: notes without.
    pub has_pending_tasks: Option<bool>,
    /// Result order; path order when unset.
    pub sort: Option<SortKey>,
    pub reverse: bool,
}

impl TryFrom<&NoteFilter> for Query {
    type Error = VaultError;

    fn try_from(filter: &NoteFilter) -> Result<Self, Self::Error> {
        let mut children = Vec::new();

        if !filter.tags.is_empty() {
            let tags: Vec<Query> = filter
                .tags
                .iter()
                .map(|t| Query::Field(Predicate::Tag { value: t.clone() }))
                .collect();
            children.push(match filter.tag_mode {
                TagMode::All => Query::And { children: tags },
                TagMode::Any => Query::Or { children: tags },
            });
        }

        if let Some((from, to)) = filter.date_range {
            if from > to {
                return Err(VaultError::QueryError(format!(
                    "Date range start {} is after its end {}",
                    from, to
                )));
            }
            children.push(Query::Field(Predicate::DateRange {
                from: Some(from),
                to: Some(to),
            }));
        }

        for (key, value) in &filter.properties {
            children.push(Query::Field(Predicate::Property {
                key: key.clone(),
                op: PropertyOp::Eq,
                value: Some(value.clone()),
            }));
        }

        if let Some(pending) = filter.has_pending_tasks {
            let predicate = Query::Field(Predicate::Tasks {
                state: TaskState::Pending,
            });
            children.push(if pending {
                predicate
            } else {
                Query::Not {
                    child: Box::new(predicate),
                }
            });
        }

        Ok(Query::And { children })
    }
}
