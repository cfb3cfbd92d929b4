//! User configuration, read from a TOML file.
//!
//! Location: `$VAULTNOTE_CONFIG`, else `<config dir>/vaultnote/config.toml`.
//! A missing file yields the defaults.

use crate::document::EditStyle;
use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "VAULTNOTE_CONFIG";
pub const VAULT_ENV: &str = "VAULTNOTE_VAULT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vault: VaultConfig,
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub edit: EditConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault used when neither `--vault` nor `$VAULTNOTE_VAULT` is given.
    pub default: Option<PathBuf>,
    /// Directory names skipped while scanning for notes.
    pub ignored_dirs: Vec<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            default: None,
            ignored_dirs: vec![".git".to_string(), ".obsidian".to_string(), ".trash".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist index snapshots between runs.
    pub enabled: bool,
    /// `"local"` for `<vault>/.vaultnote/cache`, anything else for the user
    /// cache directory.
    pub location: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            location: "global".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Header fields copied into each index entry so queries on them do not
    /// need the full note.
    pub promoted_fields: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            promoted_fields: ["status", "title", "start_date", "end_date", "due_date"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Indent step for nested tasks when a note has none to copy.
    pub indent_width: usize,
    /// Heading level for sections created by `add-task`.
    pub new_section_level: u8,
}

impl Default for EditConfig {
    fn default() -> Self {
        let style = EditStyle::default();
        Self {
            indent_width: style.indent_width,
            new_section_level: style.section_level,
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("vaultnote").join("config.toml"))
    }

    /// Load from the default location; defaults when the file is absent.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| VaultError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if !(1..=6).contains(&config.edit.new_section_level) {
            return Err(VaultError::ConfigError(format!(
                "edit.new_section_level must be between 1 and 6, got {}",
                config.edit.new_section_level
            )));
        }
        Ok(config)
    }

    /// Resolve the vault root: explicit path, then `$VAULTNOTE_VAULT`, then
    /// the configured default.
    pub fn resolve_vault_path(&self, cli_vault: Option<&Path>) -> Result<PathBuf> {
        let env_vault = std::env::var_os(VAULT_ENV).map(PathBuf::from);
        self.resolve_vault_path_with(cli_vault, env_vault)
    }

    fn resolve_vault_path_with(&self, cli_vault: Option<&Path>, env_vault: Option<PathBuf>) -> Result<PathBuf> {
        let path = cli_vault
            .map(Path::to_path_buf)
            .or(env_vault)
            .or_else(|| self.vault.default.clone())
            .ok_or_else(|| {
                VaultError::ConfigError(format!(
                    "no vault given: pass --vault, set ${VAULT_ENV}, or set vault.default in the config file"
                ))
            })?;

        if !path.is_dir() {
            return Err(VaultError::VaultNotFound(path));
        }
        Ok(path)
    }

    pub fn edit_style(&self) -> EditStyle {
        EditStyle {
            indent_width: self.edit.indent_width.max(1),
            section_level: self.edit.new_section_level,
        }
    }
}
