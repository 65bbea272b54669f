//! Configuration management for the ad-hoc command gateway

pub mod file;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::commands::{AccessRules, DEFAULT_TIMEOUT};
use crate::{Error, Jid, Result};

use file::{AdhocConfigFile, StatusFileConfig};

/// Default interval between sweeps of idle sessions
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default time running steps get to finish at shutdown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// JID the commands are registered under
    pub owner: Option<Jid>,

    /// Session inactivity timeout applied to built-in commands
    pub session_timeout: Duration,

    /// Interval between sweeps of idle sessions
    pub sweep_interval: Duration,

    /// Time running steps get to deliver their replies at shutdown
    pub drain_timeout: Duration,

    /// Built-in status command
    pub status: StatusConfig,

    /// Static roster groups
    pub roster_groups: HashMap<String, Vec<Jid>>,
}

/// Status command configuration
#[derive(Debug, Clone)]
pub struct StatusConfig {
    /// Register the command at connect
    pub enabled: bool,

    /// Who may run it; the owner only by default
    pub access: AccessRules,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            access: AccessRules::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: None,
            session_timeout: DEFAULT_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            status: StatusConfig::default(),
            roster_groups: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// `path` overrides the standard config file location.
    ///
    /// # Errors
    ///
    /// Returns error if a configured JID or number is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path);
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment values
    fn resolve(fc: AdhocConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default = Self::default();

        let owner = env("ADHOC_OWNER")
            .or(fc.owner)
            .map(|s| Jid::parse(&s))
            .transpose()
            .map_err(|e| Error::Config(format!("owner: {e}")))?;

        let session_timeout = match env("ADHOC_SESSION_TIMEOUT") {
            Some(s) => s
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| Error::Config(format!("ADHOC_SESSION_TIMEOUT: not a number: {s}")))?,
            None => fc
                .commands
                .timeout_secs
                .map_or(default.session_timeout, Duration::from_secs),
        };

        let sweep_interval = fc
            .commands
            .sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map_or(default.sweep_interval, Duration::from_secs);

        let drain_timeout = fc
            .commands
            .drain_timeout_secs
            .map_or(default.drain_timeout, Duration::from_secs);

        let status = StatusConfig {
            enabled: fc.commands.status.enabled.unwrap_or(true),
            access: access_rules(&fc.commands.status)?,
        };

        let mut roster_groups = HashMap::new();
        for (group, members) in fc.roster.groups {
            let members = parse_jids(&members)
                .map_err(|e| Error::Config(format!("roster group {group}: {e}")))?;
            roster_groups.insert(group, members);
        }

        Ok(Self {
            owner,
            session_timeout,
            sweep_interval,
            drain_timeout,
            status,
            roster_groups,
        })
    }

    /// Override the owner, e.g. from the command line
    #[must_use]
    pub fn with_owner(mut self, owner: Jid) -> Self {
        self.owner = Some(owner);
        self
    }
}

fn access_rules(fc: &StatusFileConfig) -> Result<AccessRules> {
    let mut rules = AccessRules::default();
    if let Some(jids) = &fc.allowed_jids {
        rules.allowed_jids = parse_jids(jids)?.into_iter().collect();
    }
    if let Some(groups) = &fc.allowed_groups {
        rules.allowed_groups.clone_from(groups);
    }
    if let Some(magics) = &fc.allowed_magics {
        rules.allowed_magics = magics.iter().cloned().collect();
    }
    if let Some(jids) = &fc.denied_jids {
        rules.denied_jids = parse_jids(jids)?.into_iter().collect();
    }
    if let Some(groups) = &fc.denied_groups {
        rules.denied_groups.clone_from(groups);
    }
    Ok(rules)
}

fn parse_jids(values: &[String]) -> Result<Vec<Jid>> {
    values
        .iter()
        .map(|s| Jid::parse(s).map_err(|e| Error::Config(e.to_string())))
        .collect()
}
