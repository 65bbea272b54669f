//! TOML configuration file loading
//!
//! Supports `~/.config/adhoc/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AdhocConfigFile {
    /// JID the commands are registered under
    #[serde(default)]
    pub owner: Option<String>,

    /// Command engine configuration
    #[serde(default)]
    pub commands: CommandsFileConfig,

    /// Static roster groups
    #[serde(default)]
    pub roster: RosterFileConfig,
}

/// Command engine configuration
#[derive(Debug, Default, Deserialize)]
pub struct CommandsFileConfig {
    /// Session inactivity timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Interval between sweeps of idle sessions
    pub sweep_interval_secs: Option<u64>,

    /// How long running steps may finish at shutdown
    pub drain_timeout_secs: Option<u64>,

    /// Built-in status command
    #[serde(default)]
    pub status: StatusFileConfig,
}

/// Access rules and toggle of the status command
#[derive(Debug, Default, Deserialize)]
pub struct StatusFileConfig {
    pub enabled: Option<bool>,
    pub allowed_jids: Option<Vec<String>>,
    pub allowed_groups: Option<Vec<String>>,
    pub allowed_magics: Option<Vec<String>>,
    pub denied_jids: Option<Vec<String>>,
    pub denied_groups: Option<Vec<String>>,
}

/// Roster configuration
#[derive(Debug, Default, Deserialize)]
pub struct RosterFileConfig {
    /// Group name to member JIDs
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
}

/// Load the TOML config file from `path`, or the standard path
///
/// Returns `AdhocConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> AdhocConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return AdhocConfigFile::default();
    };

    if !path.exists() {
        return AdhocConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AdhocConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AdhocConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/adhoc/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("adhoc").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let file: AdhocConfigFile = toml::from_str(
            r#"
owner = "owner@example.com/desktop"

[commands]
timeout_secs = 120
sweep_interval_secs = 15
drain_timeout_secs = 2

[commands.status]
enabled = true
allowed_groups = ["family"]
denied_jids = ["eve@example.com"]

[roster.groups]
family = ["alice@example.com", "bob@example.com"]
"#,
        )
        .unwrap();

        assert_eq!(file.owner.as_deref(), Some("owner@example.com/desktop"));
        assert_eq!(file.commands.timeout_secs, Some(120));
        assert_eq!(file.commands.drain_timeout_secs, Some(2));
        assert_eq!(file.commands.status.allowed_groups, Some(vec!["family".to_string()]));
        assert_eq!(file.roster.groups["family"].len(), 2);
    }

    #[test]
    fn empty_file_is_default() {
        let file: AdhocConfigFile = toml::from_str("").unwrap();
        assert!(file.owner.is_none());
        assert!(file.commands.status.enabled.is_none());
        assert!(file.roster.groups.is_empty());
    }

    #[test]
    fn missing_file_is_default() {
        let file = load_config_file(Some(Path::new("/nonexistent/adhoc/config.toml")));
        assert!(file.owner.is_none());
    }
}
