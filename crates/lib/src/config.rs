//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.danmu/config.json`) and environment.
//! Every field is optional; a missing file means all defaults.

use crate::ingest::IngestionStrategy;
use crate::throttle::ThrottleOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bot timing and behavior.
    #[serde(default)]
    pub bot: BotConfig,

    /// Console runner settings (simulated chat page).
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// Tick, throttle and lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// How often to read the page and process new messages, in ms (default 1000).
    #[serde(default = "default_tick_interval", rename = "tickInterval")]
    pub tick_interval_ms: u64,

    /// Minimum time between two replies, in ms (default 1000). Replies inside the window are dropped.
    #[serde(default = "default_min_reply_interval", rename = "minReplyInterval")]
    pub min_reply_interval_ms: u64,

    /// Delay between putting a reply in the input box and submitting it, in ms (default 100).
    #[serde(default = "default_reply_delay", rename = "replyDelay")]
    pub reply_delay_ms: u64,

    /// Replies are cut to this many characters (default 20, the chat input limit).
    #[serde(default = "default_max_reply_length")]
    pub max_reply_length: usize,

    /// Log new messages, dropped replies and sends at info level.
    #[serde(default)]
    pub verbose: bool,

    /// Start as soon as the bot is launched (default true).
    #[serde(default = "default_autorun")]
    pub autorun: bool,

    /// "markAndSkip" (default) or "cursor".
    #[serde(default)]
    pub ingestion: IngestionStrategy,
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_min_reply_interval() -> u64 {
    1000
}

fn default_reply_delay() -> u64 {
    100
}

fn default_max_reply_length() -> usize {
    20
}

fn default_autorun() -> bool {
    true
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            min_reply_interval_ms: default_min_reply_interval(),
            reply_delay_ms: default_reply_delay(),
            max_reply_length: default_max_reply_length(),
            verbose: false,
            autorun: default_autorun(),
            ingestion: IngestionStrategy::default(),
        }
    }
}

impl BotConfig {
    pub fn tick_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn throttle_options(&self) -> ThrottleOptions {
        ThrottleOptions {
            min_reply_interval: Duration::from_millis(self.min_reply_interval_ms),
            reply_delay: Duration::from_millis(self.reply_delay_ms),
            max_reply_length: self.max_reply_length,
            verbose: self.verbose,
        }
    }
}

/// Console runner: identities of the simulated room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleConfig {
    /// Account the bot runs as. Overridden by DANMU_OPERATOR env.
    pub operator: Option<String>,
    /// Room owner. Overridden by DANMU_OWNER env.
    pub owner: Option<String>,
    /// Entries kept on the simulated page before the oldest scroll away (default 50).
    #[serde(default = "default_visible_limit")]
    pub visible_limit: usize,
}

fn default_visible_limit() -> usize {
    50
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            operator: None,
            owner: None,
            visible_limit: default_visible_limit(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the operator identity: env DANMU_OPERATOR overrides config.
pub fn resolve_operator(config: &Config) -> Option<String> {
    non_empty_env("DANMU_OPERATOR").or_else(|| non_empty(config.console.operator.as_ref()))
}

/// Resolve the owner identity: env DANMU_OWNER overrides config.
pub fn resolve_owner(config: &Config) -> Option<String> {
    non_empty_env("DANMU_OWNER").or_else(|| non_empty(config.console.owner.as_ref()))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("DANMU_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".danmu").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, DANMU_CONFIG_PATH, or the default. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Write the default config to `path` unless a file already exists there. Returns true if written.
pub fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        log::debug!("config already exists at {}, skipping", path.display());
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    let body = serde_json::to_string_pretty(&Config::default())
        .context("serializing default config")?;
    std::fs::write(path, body)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    log::info!("created default config at {}", path.display());
    Ok(true)
}
