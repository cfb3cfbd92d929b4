//! Metadata commands: `get-meta`, `set-meta` and `remove-meta`.

use crate::cli::args::{GetMetaArgs, RemoveMetaArgs, SetMetaArgs};
use crate::cli::output::Output;
use crate::cli::tasks::report;
use crate::error::{ExitCode, Result};
use crate::mutation::Operation;
use crate::parser::frontmatter::FieldValue;
use crate::vault::Vault;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct FieldResponse {
    path: PathBuf,
    key: String,
    value: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct HeaderResponse {
    path: PathBuf,
    has_header: bool,
    fields: serde_json::Value,
    tags: Vec<String>,
}

pub fn get_meta(vault: &Vault, args: &GetMetaArgs, output: &Output) -> Result<ExitCode> {
    let path = vault.normalize_note_path(&args.note)?;
    let doc = vault.document(&path)?;

    match &args.key {
        Some(key) => output.print(&FieldResponse {
            value: doc.get_metadata(key).map(FieldValue::to_json),
            key: key.clone(),
            path,
        })?,
        None => output.print(&HeaderResponse {
            has_header: doc.header().is_present(),
            fields: doc.header().to_json(),
            tags: doc.tags(),
            path,
        })?,
    }
    Ok(ExitCode::Success)
}

/// Value given on the command line.
pub(crate) fn parse_value(raw: &str, list: bool) -> FieldValue {
    if list {
        FieldValue::List(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    } else {
        FieldValue::infer(raw)
    }
}

pub fn set_meta(vault: &Vault, args: &SetMetaArgs, output: &Output) -> Result<ExitCode> {
    let operation = Operation::SetMetadata {
        key: args.key.clone(),
        value: parse_value(&args.value, args.list),
    };
    let outcome = vault.mutate(&args.note, &operation)?;
    report(&outcome, output)
}

pub fn remove_meta(vault: &Vault, args: &RemoveMetaArgs, output: &Output) -> Result<ExitCode> {
    let operation = Operation::RemoveMetadata { key: args.key.clone() };
    let outcome = vault.mutate(&args.note, &operation)?;
    report(&outcome, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_value() {
        assert_eq!(
            parse_value("trip, business,", true),
            FieldValue::List(vec!["trip".to_string(), "business".to_string()])
        );
        assert_eq!(parse_value("true", false), FieldValue::Bool(true));
        assert_eq!(
            parse_value("2026-03-10", false),
            FieldValue::Date(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap())
        );
        assert_eq!(parse_value("done", false), FieldValue::Scalar("done".to_string()));
    }
}
