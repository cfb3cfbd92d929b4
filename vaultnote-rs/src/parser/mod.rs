//! Parsers for note syntax: lines, front matter, headings and checklists.

pub mod code_block;
pub mod frontmatter;
pub mod heading;
pub mod line;
pub mod task;

pub use frontmatter::{FieldValue, HeaderField, MetadataHeader};
pub use heading::{heading_text, slugify};
pub use line::{classify, ChecklistLine, ClassifiedText, Line, LineKind};
pub use task::{build_task_forest, TaskNode};

use serde::Serialize;

/// What kind of degradation a parse hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseIssueKind {
    /// The note opens a front matter block that is never closed.
    UnclosedHeader,
    /// A header line that is neither a `key: value` field nor part of one.
    MalformedHeaderLine,
    /// A line that resembles a checklist item but fails the strict syntax.
    NearMissChecklist,
}

/// A non-fatal parse diagnostic. The affected region is kept as opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseIssue {
    /// 0-based line index.
    pub line: usize,
    pub kind: ParseIssueKind,
    pub message: String,
}

impl ParseIssue {
    pub fn new(line: usize, kind: ParseIssueKind, message: impl Into<String>) -> Self {
        Self {
            line,
            kind,
            message: message.into(),
        }
    }
}
