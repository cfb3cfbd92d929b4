//! Predicate evaluation.
//!
//! Predicates are evaluated against a [`NoteSource`], which answers cheap
//! questions (path, tags, promoted header fields) from the index snapshot.
//! The full document is consulted only for the rest; see
//! [`Query::needs_document`].

use crate::document::Document;
use crate::error::{Result, VaultError};
use crate::parser::frontmatter::{parse_date_str, FieldValue};
use crate::query::types::*;
use chrono::NaiveDate;
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::path::Path;

/// What the evaluator needs to know about one note.
pub trait NoteSource {
    /// Path relative to the vault root.
    fn path(&self) -> &Path;

    fn tags(&self) -> &[String];

    /// A header field from a snapshot. `None` means the snapshot does not
    /// cover `key` and the document must be consulted; `Some(None)` means the
    /// field is known to be absent.
    fn snapshot_field(&self, key: &str) -> Option<Option<&FieldValue>>;

    /// The parsed note.
    fn document(&self) -> Result<&Document>;
}

/// Whether `source` satisfies `query`.
pub fn evaluate(query: &Query, source: &dyn NoteSource) -> Result<bool> {
    match query {
        Query::Field(predicate) => evaluate_predicate(predicate, source),
        Query::And { children } => {
            for child in children {
                if !evaluate(child, source)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Query::Or { children } => {
            for child in children {
                if evaluate(child, source)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Query::Not { child } => Ok(!evaluate(child, source)?),
    }
}

fn evaluate_predicate(predicate: &Predicate, source: &dyn NoteSource) -> Result<bool> {
    match predicate {
        Predicate::Tag { value } => Ok(source.tags().iter().any(|t| t == value)),
        Predicate::Property { key, op, value } => {
            let field = field_value(source, key)?;
            Ok(match (field, value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => property_matches(actual, expected, *op),
            })
        }
        Predicate::DateRange { from, to } => {
            for key in DATE_FIELDS {
                let date = field_value(source, key)?.and_then(FieldValue::as_date);
                if date.is_some_and(|d| in_range(d, *from, *to)) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Tasks { state } => {
            let stats = source.document()?.task_stats();
            Ok(match state {
                TaskState::Pending => stats.pending > 0,
                TaskState::Done => stats.total > 0 && stats.pending == 0,
                TaskState::None => stats.total == 0,
                TaskState::Any => stats.total > 0,
            })
        }
        Predicate::Path { matcher } => {
            let path = source.path().to_string_lossy().replace('\\', "/");
            matches_string(&path, matcher, true)
        }
        Predicate::Content { matcher } => {
            let doc = source.document()?;
            for line in &doc.lines()[doc.body_start()..] {
                if line.is_blank() {
                    continue;
                }
                if matches_string(line.body(), matcher, false)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn field_value<'a>(source: &'a dyn NoteSource, key: &str) -> Result<Option<&'a FieldValue>> {
    match source.snapshot_field(key) {
        Some(value) => Ok(value),
        None => Ok(source.document()?.get_metadata(key)),
    }
}

fn in_range(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.is_none_or(|f| date >= f) && to.is_none_or(|t| date <= t)
}

/// Lists match when any item does (`!=` when no item equals).
fn property_matches(actual: &FieldValue, expected: &str, op: PropertyOp) -> bool {
    match actual {
        FieldValue::List(items) if op == PropertyOp::NotEq => {
            !items.iter().any(|item| compare_values(item, expected, PropertyOp::Eq))
        }
        FieldValue::List(items) => items.iter().any(|item| compare_values(item, expected, op)),
        other => compare_values(&other.to_display(), expected, op),
    }
}

pub(crate) fn matches_string(haystack: &str, matcher: &StringMatcher, case_sensitive: bool) -> Result<bool> {
    match matcher {
        StringMatcher::Contains { value } => {
            if case_sensitive {
                Ok(haystack.contains(value.as_str()))
            } else {
                Ok(haystack.to_lowercase().contains(&value.to_lowercase()))
            }
        }
        StringMatcher::Exact { value } => {
            if case_sensitive {
                Ok(haystack == value)
            } else {
                Ok(haystack.to_lowercase() == value.to_lowercase())
            }
        }
        StringMatcher::Regex { pattern } => {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| VaultError::QueryError(format!("Invalid regex: {}", e)))?;
            Ok(re.is_match(haystack))
        }
    }
}

/// Numbers compare numerically, dates as dates, everything else as strings
/// (equality ignores case).
fn compare_values(actual: &str, expected: &str, op: PropertyOp) -> bool {
    if op == PropertyOp::Exists {
        return true;
    }

    let ordering = if let (Ok(a), Ok(b)) = (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        a.partial_cmp(&b)
    } else if let (Some(a), Some(b)) = (parse_date_str(actual), parse_date_str(expected)) {
        Some(a.cmp(&b))
    } else {
        match op {
            PropertyOp::Eq => return actual.eq_ignore_ascii_case(expected),
            PropertyOp::NotEq => return !actual.eq_ignore_ascii_case(expected),
            _ => Some(actual.cmp(expected)),
        }
    };

    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        PropertyOp::Eq => ordering == Ordering::Equal,
        PropertyOp::NotEq => ordering != Ordering::Equal,
        PropertyOp::Lt => ordering == Ordering::Less,
        PropertyOp::Gt => ordering == Ordering::Greater,
        PropertyOp::Lte => ordering != Ordering::Greater,
        PropertyOp::Gte => ordering != Ordering::Less,
        PropertyOp::Exists => true,
    }
}
