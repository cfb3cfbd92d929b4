//! `check` command: confirm each note serializes back to its exact bytes and
//! list the regions the parser had to keep opaque.

use crate::cli::args::CheckArgs;
use crate::cli::output::Output;
use crate::document::Document;
use crate::error::{ExitCode, Result, VaultError};
use crate::parser::ParseIssue;
use crate::vault::Vault;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct NoteCheck {
    path: PathBuf,
    round_trip: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<ParseIssue>,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    checked: usize,
    failed: usize,
    notes: Vec<NoteCheck>,
}

fn check_note(vault: &Vault, path: PathBuf) -> Result<NoteCheck> {
    let text = fs::read_to_string(vault.root.join(&path))?;
    let doc = Document::parse_with_style(&text, vault.config().edit_style());
    Ok(NoteCheck {
        round_trip: doc.serialize() == text,
        issues: doc.issues().to_vec(),
        path,
    })
}

pub fn check(vault: &Vault, args: &CheckArgs, output: &Output) -> Result<ExitCode> {
    let paths = if args.notes.is_empty() {
        vault.list_notes()?
    } else {
        args.notes
            .iter()
            .map(|n| vault.normalize_note_path(n))
            .collect::<Result<Vec<_>>>()?
    };

    let mut notes = Vec::with_capacity(paths.len());
    for path in paths {
        if !vault.note_exists(&path) {
            return Err(VaultError::NoteNotFound(path));
        }
        notes.push(check_note(vault, path)?);
    }

    let failed = notes.iter().filter(|n| !n.round_trip || !n.issues.is_empty()).count();
    let checked = notes.len();
    // Only notes with something to report are listed.
    notes.retain(|n| !n.round_trip || !n.issues.is_empty());
    output.print(&CheckResponse { checked, failed, notes })?;

    if failed > 0 {
        Ok(ExitCode::CheckIssuesFound)
    } else {
        Ok(ExitCode::Success)
    }
}
