//! Line tokenizer and classifier.
//!
//! Splits raw note text into lines that keep their original terminators and
//! tags each one with a purely syntactic [`LineKind`]. Concatenating
//! [`Line::raw`] over the result reproduces the input exactly.

use crate::parser::code_block::{find_fenced_ranges, is_line_fenced};
use crate::parser::{ParseIssue, ParseIssueKind};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Strict checklist syntax: space indentation, a list marker, one space, a
/// checkbox token, then a space and the text (or end of line).
static CHECKLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^( *)([-*+]) \[([ x])\](?: (.*))?$").unwrap()
});

/// Anything that looks like a checklist item. Lines matching this but not
/// [`CHECKLIST`] are reported as near misses.
static CHECKLIST_NEAR_MISS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s*\[[^\]]{0,2}\]").unwrap()
});

// ATX-style heading: # Heading, ## Heading, etc.
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})[ \t]+\S").unwrap());

/// The delimiter line of a front matter block.
pub const HEADER_FENCE: &str = "---";

/// Syntactic classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineKind {
    /// Opening or closing `---` of the front matter block.
    HeaderDelimiter,
    /// Any line between the two header delimiters.
    Metadata,
    /// An ATX heading.
    Heading { level: u8 },
    /// A checklist item.
    Checklist(ChecklistLine),
    /// Empty or whitespace-only line.
    Blank,
    /// Everything else, passed through untouched.
    Opaque,
}

/// The parts of a checklist line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistLine {
    /// Number of leading spaces.
    pub indent: usize,
    /// The list marker character (`-`, `*` or `+`).
    pub marker: char,
    /// Whether the checkbox holds the checked token.
    pub checked: bool,
    /// Byte offset of the checkbox state character within the line.
    pub state_col: usize,
    /// Text after the checkbox, exactly as written.
    pub text: String,
}

/// One line of a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    raw: String,
    kind: LineKind,
}

impl Line {
    pub fn new(raw: impl Into<String>, kind: LineKind) -> Self {
        Self { raw: raw.into(), kind }
    }

    /// The line exactly as it appeared, including its terminator.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The line without its terminator.
    pub fn body(&self) -> &str {
        strip_terminator(&self.raw)
    }

    /// The line terminator (`"\n"`, `"\r\n"` or `""` for an unterminated last line).
    pub fn terminator(&self) -> &str {
        &self.raw[self.body().len()..]
    }

    pub fn kind(&self) -> &LineKind {
        &self.kind
    }

    pub fn checklist(&self) -> Option<&ChecklistLine> {
        match &self.kind {
            LineKind::Checklist(item) => Some(item),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.kind == LineKind::Blank
    }
}

/// Result of classifying a whole note.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedText {
    pub lines: Vec<Line>,
    /// Line indices of the opening and closing header delimiters.
    pub header: Option<(usize, usize)>,
    pub issues: Vec<ParseIssue>,
}

/// Split text into lines, keeping terminators attached.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn strip_terminator(raw: &str) -> &str {
    raw.strip_suffix("\r\n")
        .or_else(|| raw.strip_suffix('\n'))
        .unwrap_or(raw)
}

/// Classify every line of `text`.
pub fn classify(text: &str) -> ClassifiedText {
    let raws = split_lines(text);
    let bodies: Vec<&str> = raws.iter().map(|r| strip_terminator(r)).collect();
    let mut issues = Vec::new();

    let header = find_header(&bodies);
    if header.is_none() && bodies.first().is_some_and(|b| is_fence(b)) {
        issues.push(ParseIssue::new(
            0,
            ParseIssueKind::UnclosedHeader,
            "front matter opened but never closed; treated as plain text",
        ));
    }

    let body_start = header.map(|(_, close)| close + 1).unwrap_or(0);
    let fenced: Vec<_> = find_fenced_ranges(&bodies[body_start..])
        .into_iter()
        .map(|r| (r.start() + body_start)..=(r.end() + body_start))
        .collect();

    let lines = raws
        .iter()
        .zip(&bodies)
        .enumerate()
        .map(|(idx, (raw, body))| {
            let kind = match header {
                Some((open, close)) if idx == open || idx == close => LineKind::HeaderDelimiter,
                Some((_, close)) if idx < close => LineKind::Metadata,
                _ if is_line_fenced(idx, &fenced) => {
                    if body.trim().is_empty() {
                        LineKind::Blank
                    } else {
                        LineKind::Opaque
                    }
                }
                _ => classify_body_line(idx, body, &mut issues),
            };
            Line::new(*raw, kind)
        })
        .collect();

    ClassifiedText {
        lines,
        header,
        issues,
    }
}

fn is_fence(body: &str) -> bool {
    body.trim_end() == HEADER_FENCE
}

/// Locate the front matter block: the first line must be a fence and a later
/// line must close it.
fn find_header(bodies: &[&str]) -> Option<(usize, usize)> {
    if !is_fence(bodies.first()?) {
        return None;
    }
    let close = bodies.iter().skip(1).position(|b| is_fence(b))? + 1;
    Some((0, close))
}

/// Classify a line outside the header and outside code blocks.
pub fn classify_body_line(idx: usize, body: &str, issues: &mut Vec<ParseIssue>) -> LineKind {
    if body.trim().is_empty() {
        return LineKind::Blank;
    }

    if let Some(caps) = CHECKLIST.captures(body) {
        let indent = caps.get(1).map_or(0, |m| m.len());
        let marker = caps
            .get(2)
            .and_then(|m| m.as_str().chars().next())
            .unwrap_or('-');
        let state = caps.get(3).map_or(0, |m| m.start());
        let checked = caps.get(3).is_some_and(|m| m.as_str() == "x");
        let text = caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default();
        return LineKind::Checklist(ChecklistLine {
            indent,
            marker,
            checked,
            state_col: state,
            text,
        });
    }

    if CHECKLIST_NEAR_MISS.is_match(body) {
        issues.push(ParseIssue::new(
            idx,
            ParseIssueKind::NearMissChecklist,
            format!("not a checklist item (strict syntax is `- [ ] text` / `- [x] text`): {body:?}"),
        ));
        return LineKind::Opaque;
    }

    if let Some(caps) = HEADING.captures(body) {
        let level = caps.get(1).map_or(1, |m| m.len()) as u8;
        return LineKind::Heading { level };
    }

    LineKind::Opaque
}

/// Render lines back into text.
pub fn join_lines(lines: &[Line]) -> String {
    let mut out = String::with_capacity(lines.iter().map(|l| l.raw.len()).sum());
    for line in lines {
        out.push_str(&line.raw);
    }
    out
}
