//! Index CLI commands.

use crate::cli::args::IndexCommands;
use crate::cli::output::Output;
use crate::error::{ExitCode, Result};
use crate::index::RefreshReport;
use crate::vault::Vault;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct RebuildResult {
    #[serde(flatten)]
    report: RefreshReport,
    persisted: bool,
}

#[derive(Debug, Serialize)]
struct ClearResult {
    cleared: bool,
}

pub fn run(vault: &Vault, command: &IndexCommands, output: &Output) -> Result<ExitCode> {
    match command {
        IndexCommands::Status => {
            vault.refresh_index()?;
            output.print(&vault.index_status())?;
        }
        IndexCommands::Rebuild => {
            let report = vault.rebuild_index()?;
            output.print(&RebuildResult {
                report,
                persisted: vault.config().cache.enabled,
            })?;
        }
        IndexCommands::Clear => {
            vault.clear_index()?;
            output.print(&ClearResult { cleared: true })?;
        }
    }
    Ok(ExitCode::Success)
}
