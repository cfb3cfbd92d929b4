//! Front matter (metadata header) model.
//!
//! The header is read line by line rather than handed to a YAML parser as a
//! whole, so every field remembers which lines it came from and how it was
//! written. Values are decoded with `serde_yaml` one field at a time; anything
//! that is not a simple scalar or a flat list is kept as [`FieldValue::Raw`].

use crate::parser::line::{Line, LineKind};
use crate::parser::{ParseIssue, ParseIssueKind};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::ops::Range;
use std::sync::LazyLock;

/// `key: value` at column 0.
static KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^([^\s#'"\-:][^:]*?)[ \t]*:([ \t]*)(.*)$"#).unwrap()
});

/// A block list item under a key (`- item`, `  - item`).
static BLOCK_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([ \t]*)-(?:[ \t]+(.*))?$").unwrap());

/// Date formats accepted when reading a metadata value as a date.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",  // 2024-01-15
    "%m/%d/%Y",  // 01/15/2024
    "%d/%m/%Y",  // 15/01/2024
    "%Y/%m/%d",  // 2024/01/15
    "%d-%m-%Y",  // 15-01-2024
    "%m-%d-%Y",  // 01-15-2024
    "%B %d, %Y", // January 15, 2024
    "%b %d, %Y", // Jan 15, 2024
    "%d %B %Y",  // 15 January 2024
    "%d %b %Y",  // 15 Jan 2024
    "%Y%m%d",    // 20240115
];

/// Default block list indentation for headers that have no list yet.
pub const DEFAULT_LIST_INDENT: &str = "  ";

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Scalar(String),
    Date(NaiveDate),
    Bool(bool),
    List(Vec<String>),
    /// Anything else (nested maps, block scalars, undecodable text), verbatim.
    Raw(String),
}

impl FieldValue {
    /// Infer a typed value from user input, e.g. a CLI argument.
    pub fn infer(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed {
            "true" => return FieldValue::Bool(true),
            "false" => return FieldValue::Bool(false),
            _ => {}
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return FieldValue::Date(date);
        }
        if trimmed.starts_with('[') {
            if let Some(items) = decode_flow_list(trimmed) {
                return FieldValue::List(items);
            }
        }
        FieldValue::Scalar(input.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(s) | FieldValue::Raw(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Read the value as a date, accepting the common textual formats.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::Scalar(s) => parse_date_str(s),
            _ => None,
        }
    }

    /// Plain-text rendering used for comparisons and display.
    pub fn to_display(&self) -> String {
        match self {
            FieldValue::Scalar(s) | FieldValue::Raw(s) => s.clone(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::List(items) => items.join(", "),
        }
    }

    /// Untagged JSON rendering for output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Scalar(s) | FieldValue::Raw(s) => serde_json::Value::String(s.clone()),
            FieldValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::List(items) => {
                serde_json::Value::Array(items.iter().cloned().map(serde_json::Value::String).collect())
            }
        }
    }

    fn same_type(&self, other: &FieldValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Parse a date string using the accepted formats.
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// How a scalar was quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    #[default]
    Plain,
    Single,
    Double,
}

/// How a boolean was capitalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolCase {
    /// `true`
    #[default]
    Lower,
    /// `True`
    Title,
    /// `TRUE`
    Upper,
}

impl BoolCase {
    fn render(self, value: bool) -> &'static str {
        match (self, value) {
            (BoolCase::Lower, true) => "true",
            (BoolCase::Lower, false) => "false",
            (BoolCase::Title, true) => "True",
            (BoolCase::Title, false) => "False",
            (BoolCase::Upper, true) => "TRUE",
            (BoolCase::Upper, false) => "FALSE",
        }
    }
}

/// How a list was laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum ListLayout {
    /// `key: [a, b]`
    Flow,
    /// `key:` followed by `<indent>- a` lines.
    Block { indent: String },
}

/// Formatting hints recorded for a field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldStyle {
    /// The key line up to where the value starts (e.g. `"tags: "`).
    pub prefix: String,
    pub quote: QuoteStyle,
    pub list: Option<ListLayout>,
    pub bool_case: BoolCase,
    /// Trailing ` # comment` on the key line, kept on rewrite.
    pub comment: String,
}

/// One field of the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub key: String,
    /// Value of the last occurrence of the key.
    pub value: FieldValue,
    /// Style of the last occurrence of the key.
    pub style: FieldStyle,
    /// Absolute line ranges of every occurrence, in document order.
    pub spans: Vec<Range<usize>>,
}

impl HeaderField {
    /// Where the field is written back: its first occurrence.
    pub fn anchor(&self) -> Range<usize> {
        self.spans[0].clone()
    }
}

/// The parsed header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataHeader {
    fields: Vec<HeaderField>,
    /// Line indices of the opening and closing delimiters.
    delimiters: Option<(usize, usize)>,
    newline: String,
}

impl MetadataHeader {
    /// An absent header.
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            delimiters: None,
            newline: "\n".to_string(),
        }
    }

    /// Parse the header between `open` and `close` (delimiter line indices).
    pub fn parse(lines: &[Line], open: usize, close: usize, issues: &mut Vec<ParseIssue>) -> Self {
        let newline = match lines.get(close).map(|l| l.terminator()) {
            Some("\r\n") => "\r\n".to_string(),
            _ => "\n".to_string(),
        };

        let mut fields: Vec<HeaderField> = Vec::new();
        let mut idx = open + 1;

        while idx < close {
            let body = lines[idx].body();
            debug_assert_eq!(lines[idx].kind(), &LineKind::Metadata);

            let Some(caps) = KEY_LINE.captures(body) else {
                let trimmed = body.trim_start();
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    issues.push(ParseIssue::new(
                        idx,
                        ParseIssueKind::MalformedHeaderLine,
                        format!("unrecognized header line kept verbatim: {body:?}"),
                    ));
                }
                idx += 1;
                continue;
            };

            let key = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let sep = caps.get(2).map_or("", |m| m.as_str());
            let inline = caps.get(3).map_or("", |m| m.as_str());
            let value_start = caps.get(3).map_or(body.len(), |m| m.start());

            if !inline.is_empty() && sep.is_empty() {
                issues.push(ParseIssue::new(
                    idx,
                    ParseIssueKind::MalformedHeaderLine,
                    format!("missing space after ':' in header line: {body:?}"),
                ));
                idx += 1;
                continue;
            }

            // Continuation lines: indented lines, or `- item` lines when the
            // key has no inline value.
            let mut end = idx + 1;
            while end < close {
                let next = lines[end].body();
                let indented = next.starts_with(' ') || next.starts_with('\t');
                let col0_item = inline.is_empty() && (next == "-" || next.starts_with("- "));
                if next.trim().is_empty() || !(indented || col0_item) {
                    break;
                }
                end += 1;
            }

            let continuation: Vec<&str> = lines[idx + 1..end].iter().map(|l| l.body()).collect();
            let (value, mut style) = decode_value(inline, &continuation);
            style.prefix = body[..value_start].to_string();

            match fields.iter_mut().find(|f| f.key == key) {
                Some(existing) => {
                    existing.value = value;
                    existing.style = style;
                    existing.spans.push(idx..end);
                }
                None => fields.push(HeaderField {
                    key,
                    value,
                    style,
                    spans: vec![idx..end],
                }),
            }

            idx = end;
        }

        Self {
            fields,
            delimiters: Some((open, close)),
            newline,
        }
    }

    /// Whether the note has a header block at all.
    pub fn is_present(&self) -> bool {
        self.delimiters.is_some()
    }

    /// Line indices of the opening and closing delimiters.
    pub fn delimiters(&self) -> Option<(usize, usize)> {
        self.delimiters
    }

    /// Line terminator used inside the header.
    pub fn newline(&self) -> &str {
        &self.newline
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.field(key).map(|f| &f.value)
    }

    pub fn field(&self, key: &str) -> Option<&HeaderField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Tags from the `tags` and `tag` fields.
    ///
    /// List items are taken as-is, scalar values are split on commas, and a
    /// leading `#` is dropped. Case is preserved.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for key in ["tags", "tag"] {
            let raw: Vec<String> = match self.get(key) {
                Some(FieldValue::List(items)) => items.clone(),
                Some(FieldValue::Scalar(s)) => s.split(',').map(str::to_string).collect(),
                _ => continue,
            };
            for tag in raw {
                let tag = tag.trim();
                let tag = tag.strip_prefix('#').unwrap_or(tag).trim();
                if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                    tags.push(tag.to_string());
                }
            }
        }
        tags
    }

    /// JSON object of every field, for output.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|f| (f.key.clone(), f.value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Style for a key that does not exist yet, following the conventions
    /// already used in this header.
    pub fn style_for_new(&self, key: &str, value: &FieldValue) -> FieldStyle {
        let list = matches!(value, FieldValue::List(_)).then(|| self.observed_list_layout());
        FieldStyle {
            prefix: format!("{key}: "),
            quote: QuoteStyle::Plain,
            list,
            bool_case: BoolCase::default(),
            comment: String::new(),
        }
    }

    /// The style to use when overwriting `field` with `value`: the field's own
    /// style when the type is unchanged, otherwise defaults that keep the key
    /// spelling.
    pub fn style_for_update(&self, field: &HeaderField, value: &FieldValue) -> FieldStyle {
        if field.value.same_type(value) {
            return field.style.clone();
        }
        let mut style = self.style_for_new(&field.key, value);
        style.prefix = field.style.prefix.clone();
        style.comment = field.style.comment.clone();
        style
    }

    fn observed_list_layout(&self) -> ListLayout {
        let layouts: Vec<&ListLayout> = self.fields.iter().filter_map(|f| f.style.list.as_ref()).collect();
        if let Some(block) = layouts.iter().find(|l| matches!(l, ListLayout::Block { .. })) {
            return (*block).clone();
        }
        if !layouts.is_empty() {
            return ListLayout::Flow;
        }
        ListLayout::Block {
            indent: DEFAULT_LIST_INDENT.to_string(),
        }
    }
}

/// Decode the value of one field from its inline text and continuation lines.
fn decode_value(inline: &str, continuation: &[&str]) -> (FieldValue, FieldStyle) {
    let mut style = FieldStyle::default();

    if inline.is_empty() {
        if continuation.is_empty() {
            return (FieldValue::Scalar(String::new()), style);
        }
        let mut indent = None;
        let mut items = Vec::new();
        for line in continuation {
            let Some(caps) = BLOCK_ITEM.captures(line) else {
                return (FieldValue::Raw(continuation.join("\n")), style);
            };
            indent.get_or_insert_with(|| caps.get(1).map_or("", |m| m.as_str()).to_string());
            let item = caps.get(2).map_or("", |m| m.as_str());
            match decode_item(item) {
                Some(item) => items.push(item),
                None => return (FieldValue::Raw(continuation.join("\n")), style),
            }
        }
        style.list = Some(ListLayout::Block {
            indent: indent.unwrap_or_default(),
        });
        return (FieldValue::List(items), style);
    }

    if !continuation.is_empty() || inline.starts_with(['|', '>', '{', '&', '*', '!']) {
        let mut raw = inline.to_string();
        for line in continuation {
            raw.push('\n');
            raw.push_str(line);
        }
        return (FieldValue::Raw(raw), style);
    }

    let (text, comment) = split_comment(inline);
    style.comment = comment.to_string();
    let text = text.trim_end();

    if text.starts_with('[') {
        return match decode_flow_list(text) {
            Some(items) => {
                style.list = Some(ListLayout::Flow);
                (FieldValue::List(items), style)
            }
            None => {
                style.comment.clear();
                (FieldValue::Raw(inline.to_string()), style)
            }
        };
    }

    if text.starts_with('"') || text.starts_with('\'') {
        style.quote = if text.starts_with('"') {
            QuoteStyle::Double
        } else {
            QuoteStyle::Single
        };
        return match serde_yaml::from_str::<YamlValue>(text) {
            Ok(YamlValue::String(s)) => (FieldValue::Scalar(s), style),
            _ => {
                style.comment.clear();
                (FieldValue::Raw(inline.to_string()), style)
            }
        };
    }

    let spelled = match text {
        "true" => Some((true, BoolCase::Lower)),
        "True" => Some((true, BoolCase::Title)),
        "TRUE" => Some((true, BoolCase::Upper)),
        "false" => Some((false, BoolCase::Lower)),
        "False" => Some((false, BoolCase::Title)),
        "FALSE" => Some((false, BoolCase::Upper)),
        _ => None,
    };
    if let Some((value, case)) = spelled {
        style.bool_case = case;
        return (FieldValue::Bool(value), style);
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return (FieldValue::Date(date), style);
    }

    (FieldValue::Scalar(text.to_string()), style)
}

/// Decode one list item (block or flow) into a string.
fn decode_item(item: &str) -> Option<String> {
    let (text, _) = split_comment(item);
    let text = text.trim();
    if text.starts_with('"') || text.starts_with('\'') {
        return match serde_yaml::from_str::<YamlValue>(text).ok()? {
            YamlValue::String(s) => Some(s),
            _ => None,
        };
    }
    if text.starts_with(['[', '{']) {
        return None;
    }
    Some(text.to_string())
}

/// Decode a flow sequence of scalars.
fn decode_flow_list(text: &str) -> Option<Vec<String>> {
    match serde_yaml::from_str::<YamlValue>(text).ok()? {
        YamlValue::Sequence(seq) => seq
            .into_iter()
            .map(|v| match v {
                YamlValue::String(s) => Some(s),
                YamlValue::Bool(b) => Some(b.to_string()),
                YamlValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// Split a trailing ` # comment` off a value, ignoring `#` inside quotes.
fn split_comment(value: &str) -> (&str, &str) {
    let mut quote: Option<char> = None;
    let mut prev_ws = true;
    for (i, c) in value.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && prev_ws && i > 0 => {
                let start = value[..i].trim_end().len();
                return (&value[..start], &value[start..]);
            }
            None => {}
        }
        prev_ws = c.is_whitespace();
    }
    (value, "")
}

/// Whether a plain scalar would be misread (as another type, as syntax, or
/// with lost whitespace) if written unquoted.
fn needs_quotes(s: &str, in_flow: bool) -> bool {
    if s.is_empty() || s != s.trim() || s.contains('\n') {
        return true;
    }
    if s.starts_with(['-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`']) {
        return true;
    }
    if s.contains(": ") || s.contains(" #") || s.ends_with(':') {
        return true;
    }
    if in_flow && s.contains([',', '[', ']', '{', '}']) {
        return true;
    }
    let lower = s.to_ascii_lowercase();
    if matches!(lower.as_str(), "true" | "false" | "null" | "~" | "yes" | "no" | "on" | "off") {
        return true;
    }
    s.parse::<f64>().is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn quote_scalar(s: &str, style: QuoteStyle, in_flow: bool) -> String {
    let style = match style {
        QuoteStyle::Plain if needs_quotes(s, in_flow) => QuoteStyle::Double,
        QuoteStyle::Single if s.contains('\n') => QuoteStyle::Double,
        other => other,
    };
    match style {
        QuoteStyle::Plain => s.to_string(),
        QuoteStyle::Single => format!("'{}'", s.replace('\'', "''")),
        // A JSON string literal is a valid YAML double-quoted scalar.
        QuoteStyle::Double => serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\"")),
    }
}

/// Render a field as header lines, each ending with `newline`.
pub fn render_field(value: &FieldValue, style: &FieldStyle, newline: &str) -> Vec<String> {
    let prefix = if style.prefix.ends_with([' ', '\t']) {
        style.prefix.clone()
    } else {
        format!("{} ", style.prefix)
    };
    let key_only = style.prefix.trim_end();

    let inline = match value {
        FieldValue::Scalar(s) => quote_scalar(s, style.quote, false),
        FieldValue::Date(d) => {
            let text = d.format("%Y-%m-%d").to_string();
            match style.quote {
                QuoteStyle::Plain => text,
                quote => quote_scalar(&text, quote, false),
            }
        }
        FieldValue::Bool(b) => style.bool_case.render(*b).to_string(),
        FieldValue::List(items) => match &style.list {
            Some(ListLayout::Block { indent }) if !items.is_empty() => {
                let mut lines = vec![format!("{key_only}{}{newline}", style.comment)];
                for item in items {
                    lines.push(format!("{indent}- {}{newline}", quote_scalar(item, QuoteStyle::Plain, false)));
                }
                return lines;
            }
            _ => {
                let rendered: Vec<String> =
                    items.iter().map(|i| quote_scalar(i, QuoteStyle::Plain, true)).collect();
                format!("[{}]", rendered.join(", "))
            }
        },
        FieldValue::Raw(raw) => {
            let mut parts = raw.split('\n');
            let first = parts.next().unwrap_or("");
            let mut lines = if first.is_empty() {
                vec![format!("{key_only}{newline}")]
            } else {
                vec![format!("{prefix}{first}{newline}")]
            };
            lines.extend(parts.map(|p| format!("{p}{newline}")));
            return lines;
        }
    };

    vec![format!("{prefix}{inline}{}{newline}", style.comment)]
}
