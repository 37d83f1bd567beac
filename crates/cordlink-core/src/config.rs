//! Configuration management
//!
//! Settings are read in the following order of precedence:
//! 1. Environment variables
//! 2. The `cordlink.toml` configuration file
//! 3. Default values
//!
//! `${VAR_NAME}` inside the configuration file is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::{Error, Result};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "cordlink.toml";

/// Discord connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (without the `Bot ` prefix)
    pub token: String,

    /// User ID of the bot owner
    #[serde(default)]
    pub owner_user_id: String,

    /// Application client ID
    #[serde(default)]
    pub client_id: String,

    /// Pass bot-authored messages through to the consumer
    #[serde(default)]
    pub allow_bots: bool,

    /// Messages kept per channel in each shard's cache
    #[serde(default = "default_message_cache_size")]
    pub message_cache_size: usize,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            owner_user_id: String::new(),
            client_id: String::new(),
            allow_bots: false,
            message_cache_size: default_message_cache_size(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("owner_user_id", &self.owner_user_id)
            .field("client_id", &self.client_id)
            .field("allow_bots", &self.allow_bots)
            .field("message_cache_size", &self.message_cache_size)
            .finish()
    }
}

/// Shard topology
///
/// With `id` unset, `count` shards are opened by this process (`None` or 0
/// asks Discord for the recommended count). With `id` set, only that shard
/// of a `total`-sized topology is opened.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardConfig {
    pub count: Option<u32>,
    pub id: Option<u32>,
    pub total: Option<u32>,
}

impl ShardConfig {
    /// The `(total, id)` pair when this process runs a single shard of a larger topology
    ///
    /// An unset `total` is taken as `id + 1`, saturating at `u32::MAX`.
    pub fn single_shard(&self) -> Option<(u32, u32)> {
        self.id
            .map(|id| (self.total.unwrap_or(id.saturating_add(1)), id))
    }
}

/// Main configuration for cordlink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub shards: ShardConfig,
}

fn default_message_cache_size() -> usize {
    100
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl Config {
    /// Expand `${VAR_NAME}` references from the environment.
    ///
    /// Unknown variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file
    ///
    /// Environment variables override values from the file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();
        cfg.validate()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(cfg)
    }

    /// Parse configuration from TOML text, expanding `${VAR}` references first
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let toml: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(Self::from_toml_config(toml))
    }

    /// Load configuration from the default location
    ///
    /// Uses `./cordlink.toml` when it exists, the environment otherwise.
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env_var)
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Config::default();
        cfg.apply_overrides(var);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let discord = toml.discord.unwrap_or_default();
        let shards = toml.shards.unwrap_or_default();

        Config {
            discord: DiscordConfig {
                token: discord.token.unwrap_or_default(),
                owner_user_id: discord
                    .owner_user_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                client_id: discord.client_id.map(|id| id.to_string()).unwrap_or_default(),
                allow_bots: discord.allow_bots.unwrap_or(false),
                message_cache_size: discord
                    .message_cache_size
                    .unwrap_or_else(default_message_cache_size),
            },
            shards: ShardConfig {
                count: shards.count,
                id: shards.id,
                total: shards.total,
            },
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(env_var);
    }

    /// Apply `DISCORD_*` overrides read through `var`; unparsable numbers are ignored
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var("DISCORD_BOT_TOKEN") {
            self.discord.token = token;
        }
        if let Some(owner) = var("DISCORD_OWNER_USER_ID") {
            self.discord.owner_user_id = owner.trim().to_string();
        }
        if let Some(client_id) = var("DISCORD_CLIENT_ID") {
            self.discord.client_id = client_id.trim().to_string();
        }
        if let Some(allow) = var("DISCORD_ALLOW_BOTS") {
            self.discord.allow_bots = allow.trim().eq_ignore_ascii_case("true");
        }
        if let Some(size) = var("DISCORD_MESSAGE_CACHE_SIZE").and_then(|v| v.trim().parse().ok()) {
            self.discord.message_cache_size = size;
        }

        if let Some(count) = var("DISCORD_SHARD_COUNT").and_then(|v| v.trim().parse().ok()) {
            self.shards.count = Some(count);
        }
        if let Some(id) = var("DISCORD_SHARD_ID").and_then(|v| v.trim().parse().ok()) {
            self.shards.id = Some(id);
        }
        if let Some(total) = var("DISCORD_SHARD_TOTAL").and_then(|v| v.trim().parse().ok()) {
            self.shards.total = Some(total);
        }
    }

    /// Check the settings that cannot be defaulted
    pub fn validate(&self) -> Result<()> {
        if self.discord.token.trim().is_empty() {
            return Err(Error::Config("DISCORD_BOT_TOKEN not set".to_string()));
        }

        if let Some((total, id)) = self.shards.single_shard() {
            if id >= total {
                return Err(Error::Config(format!(
                    "shard id {} is outside a topology of {} shards",
                    id, total
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    discord: Option<TomlDiscordConfig>,
    shards: Option<TomlShardConfig>,
}

/// IDs are accepted either as TOML integers or strings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
enum TomlId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for TomlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TomlId::Number(n) => write!(f, "{}", n),
            TomlId::Text(s) => f.write_str(s.trim()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct TomlDiscordConfig {
    token: Option<String>,
    owner_user_id: Option<TomlId>,
    client_id: Option<TomlId>,
    allow_bots: Option<bool>,
    message_cache_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlShardConfig {
    count: Option<u32>,
    id: Option<u32>,
    total: Option<u32>,
}
