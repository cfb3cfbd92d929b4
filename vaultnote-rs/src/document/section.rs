//! Heading-delimited sections of a note body.

use crate::parser::heading::{heading_text, slugify};
use crate::parser::line::{Line, LineKind};
use serde::Serialize;
use std::ops::Range;

/// A run of body lines inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "lines", rename_all = "snake_case")]
pub enum SectionItem {
    /// Prose, blank lines and anything else kept verbatim.
    Text(Range<usize>),
    /// Consecutive checklist lines.
    Tasks(Range<usize>),
}

/// A heading and the lines under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Heading text, or `None` for the preamble before the first heading.
    pub heading: Option<String>,
    /// Heading level (0 for the preamble).
    pub level: u8,
    /// Line index of the heading itself.
    pub line: Option<usize>,
    /// From the heading to the next heading of equal or higher level.
    pub span: Range<usize>,
    /// The section's own lines: after the heading, up to the next heading of
    /// any level.
    pub body: Range<usize>,
    /// Alternating text and task runs covering `body`.
    pub items: Vec<SectionItem>,
}

impl Section {
    pub fn is_preamble(&self) -> bool {
        self.heading.is_none()
    }

    pub fn slug(&self) -> Option<String> {
        self.heading.as_deref().map(slugify)
    }
}

/// Split the body (lines from `body_start`) into the preamble and one section
/// per heading.
pub fn build_sections(lines: &[Line], body_start: usize) -> Vec<Section> {
    let headings: Vec<(usize, u8, String)> = lines
        .iter()
        .enumerate()
        .skip(body_start)
        .filter_map(|(idx, line)| match line.kind() {
            LineKind::Heading { .. } => heading_text(line.body()).map(|(level, text)| (idx, level, text)),
            _ => None,
        })
        .collect();

    let end = lines.len();
    let preamble_end = headings.first().map_or(end, |(idx, _, _)| *idx);
    let mut sections = vec![Section {
        heading: None,
        level: 0,
        line: None,
        span: body_start..preamble_end,
        body: body_start..preamble_end,
        items: split_items(lines, body_start..preamble_end),
    }];

    for (pos, (idx, level, text)) in headings.iter().enumerate() {
        let rest = &headings[pos + 1..];
        let span_end = rest
            .iter()
            .find(|(_, next_level, _)| next_level <= level)
            .map_or(end, |(next, _, _)| *next);
        let body_end = rest.first().map_or(end, |(next, _, _)| *next);
        let body = idx + 1..body_end;

        sections.push(Section {
            heading: Some(text.clone()),
            level: *level,
            line: Some(*idx),
            span: *idx..span_end,
            items: split_items(lines, body.clone()),
            body,
        });
    }

    sections
}

fn split_items(lines: &[Line], range: Range<usize>) -> Vec<SectionItem> {
    let mut items: Vec<SectionItem> = Vec::new();
    for idx in range {
        let is_task = matches!(lines[idx].kind(), LineKind::Checklist(_));
        match items.last_mut() {
            Some(SectionItem::Tasks(run)) if is_task => run.end = idx + 1,
            Some(SectionItem::Text(run)) if !is_task => run.end = idx + 1,
            _ if is_task => items.push(SectionItem::Tasks(idx..idx + 1)),
            _ => items.push(SectionItem::Text(idx..idx + 1)),
        }
    }
    items
}

/// Find a section by name: exact heading text first, then case-insensitive,
/// then by slug.
pub fn find_section<'a>(sections: &'a [Section], name: &str) -> Option<&'a Section> {
    let name = name.trim();
    let named = || sections.iter().filter(|s| !s.is_preamble());

    named()
        .find(|s| s.heading.as_deref() == Some(name))
        .or_else(|| {
            let lower = name.to_lowercase();
            named().find(|s| s.heading.as_deref().is_some_and(|h| h.to_lowercase() == lower))
        })
        .or_else(|| {
            let slug = slugify(name);
            named().find(|s| s.slug().as_deref() == Some(slug.as_str()))
        })
}
