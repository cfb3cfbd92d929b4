//! In-memory edits on a [`Document`].
//!
//! Every edit is expressed as one or more [`Splice`]s over the line array, so
//! lines outside the touched range keep their exact bytes. After splicing the
//! document is re-parsed from its lines.

use super::{Document, TaskRef};
use crate::error::{Result, VaultError};
use crate::parser::frontmatter::{render_field, FieldValue};
use crate::parser::line::{split_lines, Line, LineKind, HEADER_FENCE};
use crate::parser::task::{count_indent, flatten, TaskNode};
use std::ops::Range;
use std::path::PathBuf;

/// Replace lines `start..end` with `lines` (each carrying its terminator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub start: usize,
    pub end: usize,
    pub lines: Vec<String>,
}

impl Splice {
    pub fn replace(start: usize, end: usize, lines: Vec<String>) -> Self {
        Self { start, end, lines }
    }

    pub fn insert(at: usize, lines: Vec<String>) -> Self {
        Self::replace(at, at, lines)
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Self::replace(start, end, Vec::new())
    }
}

impl Document {
    /// Apply non-overlapping splices (positions refer to the current lines)
    /// and rebuild the document.
    pub fn apply(&mut self, mut splices: Vec<Splice>) {
        if splices.is_empty() {
            return;
        }
        splices.sort_by(|a, b| b.start.cmp(&a.start));
        for splice in splices {
            let new_lines = splice.lines.into_iter().map(|raw| Line::new(raw, LineKind::Opaque));
            self.lines.splice(splice.start..splice.end, new_lines);
        }
        self.rebuild();
    }

    /// The terminator new lines should use: the first one found in the note.
    pub fn newline(&self) -> &str {
        self.lines
            .iter()
            .map(|l| l.terminator())
            .find(|t| !t.is_empty())
            .unwrap_or("\n")
    }

    /// Insert lines at `at`. When appending after an unterminated last line,
    /// that line gets a terminator first.
    fn insertion(&self, at: usize, mut lines: Vec<String>) -> (Splice, usize) {
        if at == self.lines.len() {
            if let Some(last) = self.lines.last() {
                if last.terminator().is_empty() {
                    lines.insert(0, format!("{}{}", last.raw(), self.newline()));
                    return (Splice::replace(at - 1, at, lines), at);
                }
            }
        }
        (Splice::insert(at, lines), at)
    }

    /// Set a metadata field, rewriting it in place when it exists and adding
    /// it at the end of the header otherwise. A note without a header gets
    /// one. Returns whether the text changed.
    pub fn set_metadata(&mut self, key: &str, value: FieldValue) -> Result<bool> {
        validate_key(key)?;

        if let Some(field) = self.header.field(key) {
            if field.value == value && field.spans.len() == 1 {
                return Ok(false);
            }
            let style = self.header.style_for_update(field, &value);
            let rendered = render_field(&value, &style, self.header.newline());
            let anchor = field.anchor();

            let mut splices = vec![Splice::replace(anchor.start, anchor.end, rendered)];
            splices.extend(field.spans[1..].iter().map(|s| Splice::delete(s.start, s.end)));
            self.apply(splices);
            return Ok(true);
        }

        let style = self.header.style_for_new(key, &value);
        match self.header.delimiters() {
            Some((_, close)) => {
                let rendered = render_field(&value, &style, self.header.newline());
                self.apply(vec![Splice::insert(close, rendered)]);
            }
            None => {
                let newline = self.newline().to_string();
                let mut lines = vec![format!("{HEADER_FENCE}{newline}")];
                lines.extend(render_field(&value, &style, &newline));
                lines.push(format!("{HEADER_FENCE}{newline}"));
                self.apply(vec![Splice::insert(0, lines)]);
            }
        }
        Ok(true)
    }

    /// Remove every occurrence of a metadata field. Returns whether it existed.
    pub fn remove_metadata(&mut self, key: &str) -> bool {
        let Some(field) = self.header.field(key) else {
            return false;
        };
        let splices = field.spans.iter().map(|s| Splice::delete(s.start, s.end)).collect();
        self.apply(splices);
        true
    }

    /// Set a task's checkbox. `None` flips it. Only the state character is
    /// rewritten. Returns whether the text changed.
    pub fn toggle_task(&mut self, task: &TaskRef, checked: Option<bool>) -> Result<bool> {
        let node = self.resolve(task)?;
        let target = checked.unwrap_or(!node.checked);
        if target == node.checked {
            return Ok(false);
        }

        let line = &self.lines[node.line];
        let col = line
            .checklist()
            .map(|c| c.state_col)
            .ok_or_else(|| VaultError::TaskRefStale {
                line: task.line,
                expected: task.text.clone(),
                found: line.body().to_string(),
            })?;

        let raw = line.raw();
        let mark = if target { "x" } else { " " };
        let rewritten = format!("{}{}{}", &raw[..col], mark, &raw[col + 1..]);
        let idx = node.line;
        self.apply(vec![Splice::replace(idx, idx + 1, vec![rewritten])]);
        Ok(true)
    }

    /// Add an unchecked task as the last sibling at `depth` under `section`.
    ///
    /// The depth follows the rightmost path of the section's task forest and
    /// may be at most one below its deepest node. A missing section is
    /// created at the end of the note, where only depth 0 is possible.
    pub fn add_task(&mut self, section: &str, text: &str, depth: usize) -> Result<TaskRef> {
        validate_single_line(text, "task text")?;
        validate_single_line(section, "section name")?;

        let newline = self.newline().to_string();
        let marker = self.flat_tasks().first().map_or('-', |t| t.marker);

        let Some(found) = self.section(section).cloned() else {
            check_depth(depth, 0)?;
            let mut lines = Vec::new();
            if self.lines.last().is_some_and(|l| !l.is_blank()) {
                lines.push(newline.clone());
            }
            let hashes = "#".repeat(self.style.section_level.clamp(1, 6) as usize);
            lines.push(format!("{hashes} {}{newline}", section.trim()));
            lines.push(format!("{marker} [ ] {text}{newline}"));
            let offset = lines.len() - 1;

            let (splice, at) = self.insertion(self.lines.len(), lines);
            let line = at + offset;
            self.apply(vec![splice]);
            return Ok(TaskRef {
                line,
                text: text.to_string(),
                depth: 0,
            });
        };

        let body = found.body;
        let roots: Vec<&TaskNode> = self.tasks.iter().filter(|t| body.contains(&t.line)).collect();

        // Rightmost path: last root, its last child, and so on.
        let mut chain: Vec<&TaskNode> = Vec::new();
        if let Some(last) = roots.last() {
            let mut node = *last;
            chain.push(node);
            while let Some(child) = node.children.last() {
                chain.push(child);
                node = child;
            }
        }
        check_depth(depth, chain.len())?;
        let parent = depth.checked_sub(1).map(|d| chain[d]);
        let last_sibling = match parent {
            Some(p) => p.children.last(),
            None => roots.last().copied(),
        };

        let indent = match (last_sibling, parent) {
            (Some(sibling), _) => sibling.indent,
            (None, Some(p)) => p.indent + self.indent_unit(),
            (None, None) => 0,
        };
        let marker = last_sibling.or(parent).map_or(marker, |t| t.marker);
        let task_line = format!("{}{marker} [ ] {text}{newline}", " ".repeat(indent));

        let (at, lines) = match last_sibling.or(parent) {
            Some(anchor) => (self.subtree_end(anchor, body.end), vec![task_line]),
            None => {
                let at = self.content_end(body.clone());
                let mut lines = Vec::new();
                if at > 0 && self.lines.get(at - 1).is_some_and(|l| l.kind() == &LineKind::Opaque) {
                    lines.push(newline.clone());
                }
                lines.push(task_line);
                (at, lines)
            }
        };
        let offset = lines.len() - 1;
        let (splice, at) = self.insertion(at, lines);
        let line = at + offset;
        self.apply(vec![splice]);

        Ok(TaskRef {
            line,
            text: text.to_string(),
            depth,
        })
    }

    /// Append text at the end of a section's own content, after its last
    /// non-blank line and outside any task list. Returns whether the text
    /// changed.
    pub fn append_text(&mut self, section: &str, text: &str) -> Result<bool> {
        if text.is_empty() {
            return Ok(false);
        }
        let Some(found) = self.section(section).cloned() else {
            return Err(VaultError::SectionNotFound {
                note: PathBuf::new(),
                section: section.to_string(),
            });
        };
        let newline = self.newline().to_string();
        let at = self.content_end(found.body);

        let mut lines = Vec::new();
        if at > 0 && self.lines.get(at - 1).is_some_and(|l| l.checklist().is_some()) {
            lines.push(newline.clone());
        }
        lines.extend(text_lines(text, &newline));

        let (splice, _) = self.insertion(at, lines);
        self.apply(vec![splice]);
        Ok(true)
    }

    /// Insert text at the top of the body: after the header and the blank
    /// lines following it, with one blank line before the existing content.
    /// Returns whether the text changed.
    pub fn prepend_text(&mut self, text: &str) -> bool {
        let text = text.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            return false;
        }
        let newline = self.newline().to_string();
        let mut lines = text_lines(text, &newline);

        let first_content = (self.body_start()..self.lines.len()).find(|&idx| !self.lines[idx].is_blank());
        let splice = match first_content {
            Some(at) => {
                lines.push(newline);
                Splice::insert(at, lines)
            }
            None => self.insertion(self.lines.len(), lines).0,
        };
        self.apply(vec![splice]);
        true
    }

    /// Index just past the last non-blank line of `body`, or its start when
    /// the body is empty.
    fn content_end(&self, body: Range<usize>) -> usize {
        let start = body.start;
        body.rev()
            .find(|&idx| !self.lines[idx].is_blank())
            .map_or(start, |idx| idx + 1)
    }

    /// Index just past `node`'s subtree, including indented continuation lines
    /// that follow its last task.
    fn subtree_end(&self, node: &TaskNode, limit: usize) -> usize {
        let last = node.walk().last().map_or(node, |n| *n);
        let mut end = last.line + 1;
        while end < limit {
            let line = &self.lines[end];
            if line.kind() != &LineKind::Opaque || count_indent(line.body()) <= last.indent {
                break;
            }
            end += 1;
        }
        end
    }

    /// Indent step between a parent and its children as observed in the note.
    fn indent_unit(&self) -> usize {
        flatten(&self.tasks)
            .into_iter()
            .find_map(|t| t.children.first().map(|c| c.indent.saturating_sub(t.indent)))
            .filter(|unit| *unit > 0)
            .unwrap_or(self.style.indent_width)
    }
}

fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key != key.trim()
        || key.contains([':', '\n', '\r'])
        || key.starts_with(['#', '-', '\'', '"']);
    if invalid {
        return Err(VaultError::InvalidInput(format!("invalid metadata key: {key:?}")));
    }
    Ok(())
}

/// Caller text as terminated lines. Pieces keep their own terminator; an
/// unterminated last piece gets `newline`.
fn text_lines(text: &str, newline: &str) -> Vec<String> {
    split_lines(text)
        .into_iter()
        .map(|piece| {
            if piece.ends_with('\n') {
                piece.to_string()
            } else {
                format!("{piece}{newline}")
            }
        })
        .collect()
}

fn check_depth(depth: usize, max: usize) -> Result<()> {
    if depth > max {
        return Err(VaultError::InvalidInput(format!(
            "task depth {depth} is deeper than the section allows (at most {max})"
        )));
    }
    Ok(())
}

fn validate_single_line(text: &str, what: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(VaultError::InvalidInput(format!("{what} is empty")));
    }
    if text.contains(['\n', '\r']) {
        return Err(VaultError::InvalidInput(format!("{what} must be a single line")));
    }
    Ok(())
}
