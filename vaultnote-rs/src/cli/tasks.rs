//! Task commands: `tasks`, `stats`, `add-task` and `toggle-task`.

use crate::cli::args::{AddTaskArgs, StatsArgs, TasksArgs, ToggleTaskArgs};
use crate::cli::output::Output;
use crate::document::{TaskRef, TaskStats};
use crate::error::{ExitCode, Result, VaultError};
use crate::mutation::{MutationOutcome, Operation};
use crate::parser::task::TaskNode;
use crate::vault::{Vault, VaultStats};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct TasksResponse {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    stats: TaskStats,
    tasks: Vec<TaskNode>,
}

#[derive(Debug, Serialize)]
struct FlatTask {
    line: usize,
    depth: usize,
    checked: bool,
    text: String,
}

#[derive(Debug, Serialize)]
struct FlatTasksResponse {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    stats: TaskStats,
    tasks: Vec<FlatTask>,
}

#[derive(Debug, Serialize)]
struct NoteStatsResponse {
    path: PathBuf,
    stats: TaskStats,
}

pub fn tasks(vault: &Vault, args: &TasksArgs, output: &Output) -> Result<ExitCode> {
    let path = vault.normalize_note_path(&args.note)?;
    let doc = vault.document(&path)?;

    let roots: Vec<&TaskNode> = match &args.section {
        Some(section) => doc.tasks_in_section(section).ok_or_else(|| VaultError::SectionNotFound {
            note: path.clone(),
            section: section.clone(),
        })?,
        None => doc.tasks().iter().collect(),
    };
    let selected: Vec<&TaskNode> = roots.iter().copied().flat_map(TaskNode::walk).collect();
    let stats = TaskStats::from_tasks(selected.iter().copied());

    let keep = |task: &TaskNode| {
        if args.pending {
            !task.checked
        } else if args.completed {
            task.checked
        } else {
            true
        }
    };

    if args.flat || args.pending || args.completed {
        let tasks = selected
            .into_iter()
            .filter(|t| keep(*t))
            .map(|t| FlatTask {
                line: t.line,
                depth: t.depth,
                checked: t.checked,
                text: t.text.clone(),
            })
            .collect();
        output.print(&FlatTasksResponse {
            path,
            section: args.section.clone(),
            stats,
            tasks,
        })?;
        return Ok(ExitCode::Success);
    }

    let tasks = roots.into_iter().cloned().collect();
    output.print(&TasksResponse {
        path,
        section: args.section.clone(),
        stats,
        tasks,
    })?;
    Ok(ExitCode::Success)
}

pub fn stats(vault: &Vault, args: &StatsArgs, output: &Output) -> Result<ExitCode> {
    match &args.note {
        Some(note) => {
            let path = vault.normalize_note_path(note)?;
            let stats = vault.task_stats(&path)?;
            output.print(&NoteStatsResponse { path, stats })?;
        }
        None => {
            let stats: VaultStats = vault.vault_stats()?;
            output.print(&stats)?;
        }
    }
    Ok(ExitCode::Success)
}

pub fn add_task(vault: &Vault, args: &AddTaskArgs, output: &Output) -> Result<ExitCode> {
    let operation = Operation::AddTask {
        section: args.section.clone(),
        text: args.text.clone(),
        depth: args.depth,
    };
    let outcome = vault.mutate(&args.note, &operation)?;
    report(&outcome, output)
}

pub fn toggle_task(vault: &Vault, args: &ToggleTaskArgs, output: &Output) -> Result<ExitCode> {
    let path = vault.normalize_note_path(&args.note)?;
    let doc = vault.document(&path)?;

    let checked = if args.checked {
        Some(true)
    } else if args.unchecked {
        Some(false)
    } else {
        None
    };

    let node = match (args.line, &args.text) {
        (Some(line), _) => doc.task_at_line(line).ok_or_else(|| VaultError::TaskNotFound {
            note: path.clone(),
            query: format!("line {}", line),
        })?,
        (None, Some(text)) => doc.find_task(text, checked).ok_or_else(|| VaultError::TaskNotFound {
            note: path.clone(),
            query: text.clone(),
        })?,
        (None, None) => return Err(VaultError::InvalidInput("pass --line or --text".to_string())),
    };
    let operation = Operation::ToggleTask {
        task: TaskRef::from(node),
        checked,
    };
    drop(doc);

    let outcome = vault.mutate(&path, &operation)?;
    report(&outcome, output)
}

/// Print a mutation outcome.
pub(crate) fn report(outcome: &MutationOutcome, output: &Output) -> Result<ExitCode> {
    if !outcome.changed {
        output.info(&format!("{}: already up to date", outcome.path.display()));
    }
    output.print(outcome)?;
    Ok(ExitCode::Success)
}
