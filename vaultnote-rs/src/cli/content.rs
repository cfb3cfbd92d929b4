//! Free-text commands: `append`, `prepend` and `create`.

use crate::cli::args::{AppendArgs, CreateArgs, PrependArgs, TextInput};
use crate::cli::metadata::parse_value;
use crate::cli::output::Output;
use crate::cli::tasks::report;
use crate::error::{ExitCode, Result, VaultError};
use crate::mutation::Operation;
use crate::parser::frontmatter::FieldValue;
use crate::vault::Vault;
use std::io::{self, Read};
use std::path::Path;

/// Text from the argument, else from piped stdin. Stdin is always taken
/// literally; the argument only has escapes expanded when asked to.
fn read_input_text(text_arg: &Option<String>, input: TextInput) -> Result<Option<String>> {
    if let Some(text) = text_arg {
        let text = if input.escapes {
            unescape(text)
        } else {
            text.clone()
        };
        return Ok(Some(text));
    }
    if atty::isnt(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(Some(buffer))
    } else {
        Ok(None)
    }
}

fn required_text(text_arg: &Option<String>, input: TextInput) -> Result<String> {
    read_input_text(text_arg, input)?.ok_or_else(|| {
        VaultError::InvalidInput("no text given: pass it as an argument or pipe it on stdin".to_string())
    })
}

/// Expand `\n`, `\t` and `\\`. Any other backslash is kept.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// `key=value` from `--field`.
fn parse_field(raw: &str) -> Result<(String, FieldValue)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), parse_value(value.trim(), false)))
        }
        _ => Err(VaultError::InvalidInput(format!("expected KEY=VALUE, got {:?}", raw))),
    }
}

pub fn append(vault: &Vault, args: &AppendArgs, output: &Output) -> Result<ExitCode> {
    let text = required_text(&args.text, args.input)?;
    let operation = Operation::AppendText {
        section: args.section.clone(),
        text,
    };
    let outcome = vault.mutate(&args.note, &operation)?;
    report(&outcome, output)
}

pub fn prepend(vault: &Vault, args: &PrependArgs, output: &Output) -> Result<ExitCode> {
    let text = required_text(&args.text, args.input)?;
    let outcome = vault.mutate(&args.note, &Operation::PrependText { text })?;
    report(&outcome, output)
}

pub fn create(vault: &Vault, args: &CreateArgs, output: &Output) -> Result<ExitCode> {
    let fields = args
        .fields
        .iter()
        .map(|raw| parse_field(raw))
        .collect::<Result<Vec<_>>>()?;
    let body = read_input_text(&args.text, args.input)?.unwrap_or_default();
    let outcome = vault.create_note(&args.title, &body, &fields, args.path.as_deref().map(Path::new))?;
    report(&outcome, output)
}

// Check if stdin is a terminal (for reading from pipe)
mod atty {
    pub enum Stream {
        Stdin,
    }

    pub fn isnt(stream: Stream) -> bool {
        match stream {
            Stream::Stdin => {
                #[cfg(unix)]
                {
                    use std::os::unix::io::AsRawFd;
                    unsafe { libc::isatty(std::io::stdin().as_raw_fd()) == 0 }
                }
                #[cfg(not(unix))]
                {
                    false
                }
            }
        }
    }
}
