//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vaultnote")]
#[command(author, version, about = "Query and edit notes in a Markdown vault without disturbing their text", long_about = None)]
pub struct Cli {
    /// Path to the vault (overrides $VAULTNOTE_VAULT and the config default)
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    /// Output as JSON (default)
    #[arg(long, global = true, conflicts_with_all = ["yaml", "toml"])]
    pub json: bool,

    /// Output as YAML
    #[arg(long, global = true, conflicts_with_all = ["json", "toml"])]
    pub yaml: bool,

    /// Output as TOML
    #[arg(long, global = true, conflicts_with_all = ["json", "yaml"])]
    pub toml: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (can be repeated)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.yaml {
            OutputFormat::Yaml
        } else if self.toml {
            OutputFormat::Toml
        } else {
            OutputFormat::Json
        }
    }

    /// Default log filter for the `-v` count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Toml,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List notes in the vault
    List,

    /// Find notes carrying a tag (exact, case-sensitive)
    Find(FindArgs),

    /// Find notes matching a query expression
    Query(QueryArgs),

    /// Show the task tree of a note
    Tasks(TasksArgs),

    /// Task completion counts for a note or the whole vault
    Stats(StatsArgs),

    /// Get metadata fields of a note
    #[command(name = "get-meta")]
    GetMeta(GetMetaArgs),

    /// Set a metadata field
    #[command(name = "set-meta")]
    SetMeta(SetMetaArgs),

    /// Remove a metadata field
    #[command(name = "remove-meta")]
    RemoveMeta(RemoveMetaArgs),

    /// Add a task under a section
    #[command(name = "add-task")]
    AddTask(AddTaskArgs),

    /// Check, uncheck or flip a task
    #[command(name = "toggle-task")]
    ToggleTask(ToggleTaskArgs),

    /// Append text to the end of a section
    Append(AppendArgs),

    /// Insert text at the top of a note's body
    Prepend(PrependArgs),

    /// Create a new note
    Create(CreateArgs),

    /// Verify that notes round-trip exactly and report parse issues
    Check(CheckArgs),

    /// Manage the vault index
    Index(IndexArgs),
}

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Tag to look for (a leading # is ignored)
    #[arg(long)]
    pub tag: String,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Query expression, e.g. `tag:trip tasks:pending date:2026-03-01..2026-03-31`
    pub expr: String,

    /// Order results by title, start_date, end_date, created_date,
    /// modified_date or path
    #[arg(long)]
    pub sort: Option<String>,

    /// Descending order
    #[arg(long)]
    pub reverse: bool,
}

#[derive(Args, Debug)]
pub struct TasksArgs {
    /// Note path (relative to the vault; `.md` may be omitted)
    pub note: String,

    /// Only tasks under this section heading
    #[arg(long)]
    pub section: Option<String>,

    /// Only unchecked tasks
    #[arg(long, conflicts_with = "completed")]
    pub pending: bool,

    /// Only checked tasks
    #[arg(long)]
    pub completed: bool,

    /// Flat list instead of a tree
    #[arg(long)]
    pub flat: bool,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Note path; the whole vault when omitted
    pub note: Option<String>,
}

#[derive(Args, Debug)]
pub struct GetMetaArgs {
    /// Note path
    pub note: String,

    /// A single field; every field when omitted
    pub key: Option<String>,
}

#[derive(Args, Debug)]
pub struct SetMetaArgs {
    /// Note path
    pub note: String,

    /// Field name
    pub key: String,

    /// New value. `true`/`false` are booleans and YYYY-MM-DD is a date.
    pub value: String,

    /// Store the value as a list, splitting on commas
    #[arg(long)]
    pub list: bool,
}

#[derive(Args, Debug)]
pub struct RemoveMetaArgs {
    /// Note path
    pub note: String,

    /// Field name
    pub key: String,
}

#[derive(Args, Debug)]
pub struct AddTaskArgs {
    /// Note path
    pub note: String,

    /// Task text
    pub text: String,

    /// Section heading; created at the end of the note if missing
    #[arg(long, short)]
    pub section: String,

    /// Nesting depth under the section's last task (0 = top level)
    #[arg(long, short, default_value_t = 0)]
    pub depth: usize,
}

#[derive(Args, Debug)]
pub struct ToggleTaskArgs {
    /// Note path
    pub note: String,

    /// Task line, as reported by `tasks` (0-based)
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    pub line: Option<usize>,

    /// Task text, matched exactly after trimming
    #[arg(long)]
    pub text: Option<String>,

    /// Mark as done
    #[arg(long, conflicts_with = "unchecked")]
    pub checked: bool,

    /// Mark as not done
    #[arg(long)]
    pub unchecked: bool,
}

#[derive(Args, Debug)]
pub struct AppendArgs {
    /// Note path
    pub note: String,

    /// Section heading to append under
    #[arg(long, short)]
    pub section: String,

    /// Text to append; read from stdin when omitted
    pub text: Option<String>,

    #[command(flatten)]
    pub input: TextInput,
}

/// How text arguments are read.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct TextInput {
    /// Turn `\n` and `\t` in the text argument into newlines and tabs
    #[arg(long, short = 'e')]
    pub escapes: bool,
}

#[derive(Args, Debug)]
pub struct PrependArgs {
    /// Note path
    pub note: String,

    /// Text to insert; read from stdin when omitted
    pub text: Option<String>,

    #[command(flatten)]
    pub input: TextInput,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Note title; also the file name unless --path is given
    pub title: String,

    /// Body text; read from stdin when piped, empty otherwise
    pub text: Option<String>,

    /// Where to create the note, relative to the vault
    #[arg(long)]
    pub path: Option<String>,

    /// Header field as key=value (repeatable)
    #[arg(long = "field", short = 'f', value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    #[command(flatten)]
    pub input: TextInput,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Notes to check; every note when omitted
    pub notes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(subcommand)]
    pub command: IndexCommands,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommands {
    /// Show index status
    Status,
    /// Drop the index and re-read every note
    Rebuild,
    /// Delete the persisted index
    Clear,
}
