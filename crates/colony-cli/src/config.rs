//! Configuration file and state-file management for colony.
//!
//! Grounded on the corpus's `gator-cli::config` (XDG config dir, TOML file,
//! a resolution chain with a hard default at the bottom). There's no
//! secondary secret to resolve here (no auth layer in this core), so the
//! chain collapses to config-file > built-in default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
}

/// Mirrors `colony_core::orchestrator::OrchestratorConfig` plus the one
/// knob this CLI's local funding adapter needs that the core has no
/// opinion about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    pub max_replans: i32,
    pub auto_budget_threshold_cents: i64,
    pub classification_threshold: i64,
    pub disable_spawn: bool,
    pub tick_interval_secs: u64,
    pub starting_balance_cents: i64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_replans: 3,
            auto_budget_threshold_cents: 5_000,
            classification_threshold: 3,
            disable_spawn: false,
            tick_interval_secs: 5,
            starting_balance_cents: 1_000,
        }
    }
}

/// Return the colony config directory. Always XDG layout:
/// `$XDG_CONFIG_HOME/colony` or `~/.config/colony`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("colony");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config").join("colony")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Where the CLI persists the `MemoryStore` snapshot between invocations,
/// since this crate's only `DurableStore` is in-process and loses state on
/// exit otherwise.
pub fn state_path() -> PathBuf {
    config_dir().join("state.json")
}

pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

pub fn save_config(config: &ConfigFile) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create config directory {}", dir.display()))?;
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(config_path(), contents).context("failed to write config file")
}

/// Resolve the orchestrator section, falling back to built-in defaults
/// when no config file exists yet.
pub fn resolve() -> OrchestratorSection {
    load_config().map(|c| c.orchestrator).unwrap_or_default()
}

pub fn load_state() -> Option<String> {
    std::fs::read_to_string(state_path()).ok()
}

pub fn save_state(raw: &str) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create state directory {}", dir.display()))?;
    std::fs::write(state_path(), raw).with_context(|| format!("failed to write state file at {}", state_path().display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_section_roundtrips_through_toml() {
        let config = ConfigFile {
            orchestrator: OrchestratorSection::default(),
        };
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.orchestrator.max_replans, config.orchestrator.max_replans);
        assert_eq!(parsed.orchestrator.tick_interval_secs, config.orchestrator.tick_interval_secs);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        assert!(config_path().ends_with("colony/config.toml"));
    }
}
