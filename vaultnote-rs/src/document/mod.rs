//! Parsed note model.
//!
//! A [`Document`] owns the note's lines (raw text and terminators kept) and
//! the structure derived from them: the metadata header, the sections and the
//! task forest. Serializing concatenates the lines, so an unedited document
//! reproduces its source exactly. Edits (see [`edit`]) splice line ranges and
//! then rebuild the derived structure.

pub mod edit;
pub mod section;

pub use edit::Splice;
pub use section::{Section, SectionItem};

use crate::error::{Result, VaultError};
use crate::parser::frontmatter::{FieldValue, MetadataHeader};
use crate::parser::line::{classify, join_lines, Line};
use crate::parser::task::{build_task_forest, flatten, TaskNode};
use crate::parser::ParseIssue;
use serde::{Deserialize, Serialize};

/// Formatting defaults for lines the engine has to invent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditStyle {
    /// Indent step for nested tasks when the note has no nesting to copy.
    pub indent_width: usize,
    /// Heading level of sections created by `add_task`.
    pub section_level: u8,
}

impl Default for EditStyle {
    fn default() -> Self {
        Self {
            indent_width: 2,
            section_level: 2,
        }
    }
}

/// A handle to one task, taken from a parsed document.
///
/// Tasks have no identity beyond their position, so the handle records the
/// line together with the text and depth it expects to find there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    pub line: usize,
    pub text: String,
    pub depth: usize,
}

impl From<&TaskNode> for TaskRef {
    fn from(node: &TaskNode) -> Self {
        Self {
            line: node.line,
            text: node.text.clone(),
            depth: node.depth,
        }
    }
}

/// Completion counts for a set of tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Completed over total, 0.0 when there are no tasks.
    pub completion_ratio: f64,
}

impl TaskStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a TaskNode>) -> Self {
        let mut stats = TaskStats::default();
        for task in tasks {
            stats.total += 1;
            if task.checked {
                stats.completed += 1;
            } else {
                stats.pending += 1;
            }
        }
        if stats.total > 0 {
            stats.completion_ratio = stats.completed as f64 / stats.total as f64;
        }
        stats
    }

    pub fn add(&mut self, other: &TaskStats) {
        self.total += other.total;
        self.completed += other.completed;
        self.pending += other.pending;
        self.completion_ratio = if self.total > 0 {
            self.completed as f64 / self.total as f64
        } else {
            0.0
        };
    }
}

/// A parsed note.
#[derive(Debug, Clone)]
pub struct Document {
    lines: Vec<Line>,
    header: MetadataHeader,
    body_start: usize,
    sections: Vec<Section>,
    tasks: Vec<TaskNode>,
    issues: Vec<ParseIssue>,
    style: EditStyle,
    dirty: bool,
}

impl Document {
    /// Parse note text. Never fails: malformed regions stay opaque and are
    /// reported through [`Document::issues`].
    pub fn parse(text: &str) -> Self {
        Self::parse_with_style(text, EditStyle::default())
    }

    pub fn parse_with_style(text: &str, style: EditStyle) -> Self {
        let classified = classify(text);
        let mut issues = classified.issues;
        let lines = classified.lines;

        let (header, body_start) = match classified.header {
            Some((open, close)) => (MetadataHeader::parse(&lines, open, close, &mut issues), close + 1),
            None => (MetadataHeader::empty(), 0),
        };
        issues.sort_by_key(|i| i.line);

        let sections = section::build_sections(&lines, body_start);
        let tasks = build_task_forest(&lines, body_start..lines.len());

        Self {
            lines,
            header,
            body_start,
            sections,
            tasks,
            issues,
            style,
            dirty: false,
        }
    }

    /// Reconstruct the note text.
    pub fn serialize(&self) -> String {
        join_lines(&self.lines)
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn header(&self) -> &MetadataHeader {
        &self.header
    }

    /// Index of the first line after the header.
    pub fn body_start(&self) -> usize {
        self.body_start
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn style(&self) -> EditStyle {
        self.style
    }

    /// Diagnostics for regions that were kept as opaque text.
    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }

    /// Whether the document was edited since it was parsed or last marked clean.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn get_metadata(&self, key: &str) -> Option<&FieldValue> {
        self.header.get(key)
    }

    pub fn tags(&self) -> Vec<String> {
        self.header.tags()
    }

    /// Root-level tasks of the whole note, in document order.
    pub fn tasks(&self) -> &[TaskNode] {
        &self.tasks
    }

    /// Every task in document order.
    pub fn flat_tasks(&self) -> Vec<&TaskNode> {
        flatten(&self.tasks)
    }

    pub fn pending_tasks(&self) -> Vec<&TaskNode> {
        self.flat_tasks().into_iter().filter(|t| !t.checked).collect()
    }

    pub fn completed_tasks(&self) -> Vec<&TaskNode> {
        self.flat_tasks().into_iter().filter(|t| t.checked).collect()
    }

    pub fn task_stats(&self) -> TaskStats {
        TaskStats::from_tasks(self.flat_tasks())
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        section::find_section(&self.sections, name)
    }

    /// Root tasks within a section, subsections included.
    pub fn tasks_in_section(&self, name: &str) -> Option<Vec<&TaskNode>> {
        let span = self.section(name)?.span.clone();
        Some(self.tasks.iter().filter(|t| span.contains(&t.line)).collect())
    }

    pub fn task_at_line(&self, line: usize) -> Option<&TaskNode> {
        self.flat_tasks().into_iter().find(|t| t.line == line)
    }

    /// The first task whose trimmed text equals `text` (trimmed). When
    /// `target` is given, the first such task not already in that state is
    /// preferred.
    pub fn find_task(&self, text: &str, target: Option<bool>) -> Option<&TaskNode> {
        let text = text.trim();
        let mut matches = self.flat_tasks().into_iter().filter(|t| t.text.trim() == text);
        let first = matches.next()?;
        match target {
            Some(state) if first.checked == state => matches.find(|t| t.checked != state).or(Some(first)),
            _ => Some(first),
        }
    }

    /// Look up the task a handle points at, failing if the line no longer
    /// holds that task.
    pub fn resolve(&self, task: &TaskRef) -> Result<&TaskNode> {
        match self.task_at_line(task.line) {
            Some(node) if node.text == task.text && node.depth == task.depth => Ok(node),
            found => Err(VaultError::TaskRefStale {
                line: task.line,
                expected: task.text.clone(),
                found: found
                    .map(|n| n.text.clone())
                    .or_else(|| self.lines.get(task.line).map(|l| l.body().to_string()))
                    .unwrap_or_default(),
            }),
        }
    }

    /// Replace the derived structure after the lines changed.
    fn rebuild(&mut self) {
        let text = join_lines(&self.lines);
        let mut rebuilt = Self::parse_with_style(&text, self.style);
        rebuilt.dirty = true;
        *self = rebuilt;
    }
}
