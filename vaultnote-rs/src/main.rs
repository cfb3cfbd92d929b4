//! vaultnote CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vaultnote::cli::args::{Cli, Commands};
use vaultnote::cli::output::Output;
use vaultnote::cli::{check, content, index, list, metadata, tasks};
use vaultnote::config::Config;
use vaultnote::error::{ExitCode as VaultExitCode, VaultError};
use vaultnote::vault::Vault;

/// Environment variable holding a log filter, e.g. `vaultnote=debug`.
const LOG_ENV: &str = "VAULTNOTE_LOG";

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(code) => ExitCode::from(code.code() as u8),
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {}", e);
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<VaultExitCode, VaultError> {
    let config = Config::load()?;

    let vault_path = config.resolve_vault_path(cli.vault.as_deref())?;
    let vault = Vault::with_config(vault_path, config)?;

    let output = Output::new(cli.output_format(), cli.quiet);

    match &cli.command {
        Commands::List => list::list(&vault, &output),
        Commands::Find(args) => list::find(&vault, args, &output),
        Commands::Query(args) => list::query(&vault, args, &output),
        Commands::Tasks(args) => tasks::tasks(&vault, args, &output),
        Commands::Stats(args) => tasks::stats(&vault, args, &output),
        Commands::GetMeta(args) => metadata::get_meta(&vault, args, &output),
        Commands::SetMeta(args) => metadata::set_meta(&vault, args, &output),
        Commands::RemoveMeta(args) => metadata::remove_meta(&vault, args, &output),
        Commands::AddTask(args) => tasks::add_task(&vault, args, &output),
        Commands::ToggleTask(args) => tasks::toggle_task(&vault, args, &output),
        Commands::Append(args) => content::append(&vault, args, &output),
        Commands::Prepend(args) => content::prepend(&vault, args, &output),
        Commands::Create(args) => content::create(&vault, args, &output),
        Commands::Check(args) => check::check(&vault, args, &output),
        Commands::Index(args) => index::run(&vault, &args.command, &output),
    }
}
