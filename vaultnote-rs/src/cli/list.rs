//! Note lookup commands: `list`, `find` and `query`.

use crate::cli::args::{FindArgs, QueryArgs};
use crate::cli::output::Output;
use crate::error::{ExitCode, Result};
use crate::query::SortKey;
use crate::vault::{DocumentRef, Vault};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub notes: Vec<PathBuf>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub notes: Vec<DocumentRef>,
    pub total: usize,
}

impl From<Vec<DocumentRef>> for MatchResponse {
    fn from(notes: Vec<DocumentRef>) -> Self {
        Self {
            total: notes.len(),
            notes,
        }
    }
}

pub fn list(vault: &Vault, output: &Output) -> Result<ExitCode> {
    let notes = vault.list_notes()?;
    output.print(&ListResponse {
        total: notes.len(),
        notes,
    })?;
    Ok(ExitCode::Success)
}

pub fn find(vault: &Vault, args: &FindArgs, output: &Output) -> Result<ExitCode> {
    let found = vault.find_documents(&args.tag)?;
    output.print(&MatchResponse::from(found))?;
    Ok(ExitCode::Success)
}

pub fn query(vault: &Vault, args: &QueryArgs, output: &Output) -> Result<ExitCode> {
    let sort = args.sort.as_deref().map(str::parse::<SortKey>).transpose()?;
    let mut found = vault.query(&args.expr)?;
    if sort.is_some() || args.reverse {
        found = vault.sort(found, sort.unwrap_or_default(), args.reverse)?;
    }
    output.print(&MatchResponse::from(found))?;
    Ok(ExitCode::Success)
}
