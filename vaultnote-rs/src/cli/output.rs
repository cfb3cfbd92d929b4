//! Output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::error::Result;
use serde::Serialize;

/// Helper for formatting and printing output.
pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    /// Render a serializable value in the configured format. TOML needs a
    /// table at the top level, so commands print structs, not bare lists.
    pub fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Toml => toml::to_string_pretty(value)?,
        })
    }

    /// Print a serializable value in the configured format.
    pub fn print<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", self.render(value)?);
        Ok(())
    }

    /// Print a message if not in quiet mode.
    pub fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{}", message);
        }
    }

    /// Check if quiet mode is enabled.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        path: String,
        tags: Vec<String>,
    }

    fn sample() -> Sample {
        Sample {
            path: "trip.md".to_string(),
            tags: vec!["trip".to_string()],
        }
    }

    #[test]
    fn test_render_formats() {
        let json = Output::new(OutputFormat::Json, false).render(&sample()).unwrap();
        assert!(json.contains("\"path\": \"trip.md\""));

        let yaml = Output::new(OutputFormat::Yaml, false).render(&sample()).unwrap();
        assert!(yaml.contains("path: trip.md"));

        let toml = Output::new(OutputFormat::Toml, true).render(&sample()).unwrap();
        assert!(toml.contains("path = \"trip.md\""));
    }
}
