use crate::gate::cooldown::DEFAULT_COOLDOWN_CAPACITY;
use crate::gate::{ChannelPolicy, DEFAULT_COOLDOWN_SECS};
use crate::persona::PersonalityProfile;
use crate::providers::chain::DEFAULT_CALL_TIMEOUT_SECS;
use crate::providers::traits::DEFAULT_MAX_TOKENS;
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable that relocates the config directory.
pub const CONFIG_DIR_ENV: &str = "QUIPBOT_CONFIG_DIR";

const REDACTED: &str = "[REDACTED]";

/// Errors that stop the process before it starts serving.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not set. Set the {env} environment variable or add it to config.toml")]
    MissingSecret {
        name: &'static str,
        env: &'static str,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Top-level config ──────────────────────────────────────────────

/// Top-level quipbot configuration, loaded from `config.toml`.
///
/// Resolution order: `QUIPBOT_CONFIG_DIR` env → `~/.quipbot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Discord connection and command settings (`[discord]`).
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Personality profile (`[personality]`).
    #[serde(default)]
    pub personality: PersonalityProfile,

    /// Response probabilities, cooldown and worker limits (`[response]`).
    #[serde(default)]
    pub response: ResponseConfig,

    /// Parameters shared by every provider call (`[generation]`).
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Generation backends, tried in order (`[[providers]]`).
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            discord: DiscordConfig::default(),
            personality: PersonalityProfile::default(),
            response: ResponseConfig::default(),
            generation: GenerationConfig::default(),
            providers: default_providers(),
        }
    }
}

// ── Discord ───────────────────────────────────────────────────────

/// Discord bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiscordConfig {
    /// Discord bot token. Overridden by `QUIPBOT_DISCORD_TOKEN` or `DISCORD_TOKEN`.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Optional guild (server) ID to restrict the bot to a single guild.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// User IDs allowed to run admin commands such as `setresponse`.
    /// Empty means nobody can change response chances from chat.
    #[serde(default)]
    pub admin_users: Vec<String>,
    /// Prefix that marks a message as a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// When true, messages from other bots are fed to the gate as well.
    /// The bot always ignores its own messages.
    #[serde(default)]
    pub listen_to_bots: bool,
}

fn default_command_prefix() -> String {
    "!".into()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            guild_id: None,
            admin_users: Vec::new(),
            command_prefix: default_command_prefix(),
            listen_to_bots: false,
        }
    }
}

// ── Response policy ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResponseConfig {
    /// Seconds before the same author can get another unprompted reply.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Maximum number of authors tracked for cooldown.
    #[serde(default = "default_cooldown_capacity")]
    pub cooldown_capacity: usize,
    /// How often expired cooldown entries are swept, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Replies generated concurrently.
    #[serde(default = "default_max_concurrent_replies")]
    pub max_concurrent_replies: usize,
    /// Global/per-channel chances and time-of-day modifiers.
    #[serde(flatten)]
    pub policy: ChannelPolicy,
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_cooldown_capacity() -> usize {
    DEFAULT_COOLDOWN_CAPACITY
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_concurrent_replies() -> usize {
    4
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            cooldown_capacity: default_cooldown_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_concurrent_replies: default_max_concurrent_replies(),
            policy: ChannelPolicy::default(),
        }
    }
}

// ── Generation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationConfig {
    /// Upper bound on generated tokens per provider call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Hard cutoff for a single provider call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Providers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Huggingface,
    Deepinfra,
    Ollama,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Huggingface => "huggingface",
            Self::Deepinfra => "deepinfra",
            Self::Ollama => "ollama",
        })
    }
}

/// One generation backend entry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model identifier; the backend's default when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (e.g. a remote Ollama host).
    #[serde(default)]
    pub api_url: Option<String>,
    /// Credential. Missing credentials make the provider fail at call time.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            model: None,
            api_url: None,
            api_key: None,
        }
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(ProviderKind::Huggingface),
        ProviderConfig::new(ProviderKind::Deepinfra),
    ]
}

// ── Loading ───────────────────────────────────────────────────────

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".quipbot"))
}

/// `QUIPBOT_CONFIG_DIR` when set, else `~/.quipbot`.
pub fn resolve_config_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(CONFIG_DIR_ENV) {
        let custom = custom.trim();
        if !custom.is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    default_config_dir()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        Self::load_or_init_in(&config_dir).await
    }

    /// Load `config.toml` from `config_dir`, writing defaults on first run.
    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;
            config
        } else {
            // Warn if config file is world-readable (may contain tokens)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            providers = config.providers.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Write the config back to `config_path` (mode 0600 on unix).
    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;
        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("config.toml");
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", std::process::id()));

        fs::write(&temp_path, toml_str.as_bytes())
            .await
            .with_context(|| {
                format!(
                    "Failed to write temporary config file: {}",
                    temp_path.display()
                )
            })?;

        #[cfg(unix)]
        {
            use std::{fs::Permissions, os::unix::fs::PermissionsExt};
            let _ = fs::set_permissions(&temp_path, Permissions::from_mode(0o600)).await;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to replace config file: {e}");
        }
        Ok(())
    }

    /// Apply environment variable overrides. `QUIPBOT_`-prefixed names win
    /// over the bare names.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |names: &[&str]| names.iter().find_map(|name| non_empty(lookup(name)));

        if let Some(token) = read(&["QUIPBOT_DISCORD_TOKEN", "DISCORD_TOKEN"]) {
            self.discord.bot_token = Some(token);
        }

        let hf_token = read(&["QUIPBOT_HUGGINGFACE_TOKEN", "HUGGINGFACE_TOKEN"]);
        let deepinfra_key = read(&["QUIPBOT_DEEPINFRA_API_KEY", "DEEPINFRA_API_KEY"]);
        let ollama_url = read(&["QUIPBOT_OLLAMA_URL", "OLLAMA_URL"]);

        for provider in &mut self.providers {
            match provider.kind {
                ProviderKind::Huggingface => {
                    if let Some(token) = &hf_token {
                        provider.api_key = Some(token.clone());
                    }
                }
                ProviderKind::Deepinfra => {
                    if let Some(key) = &deepinfra_key {
                        provider.api_key = Some(key.clone());
                    }
                }
                ProviderKind::Ollama => {
                    if let Some(url) = &ollama_url {
                        provider.api_url = Some(url.clone());
                    }
                }
            }
        }
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.personality
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("personality: {e}")))?;
        self.response
            .policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.response.cooldown_capacity == 0 {
            return Err(ConfigError::Invalid(
                "response.cooldown_capacity must be greater than 0".into(),
            ));
        }
        if self.response.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "response.sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if self.response.max_concurrent_replies == 0 {
            return Err(ConfigError::Invalid(
                "response.max_concurrent_replies must be greater than 0".into(),
            ));
        }
        if self.generation.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "generation.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_tokens must be greater than 0".into(),
            ));
        }
        if self.discord.command_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "discord.command_prefix must not be empty".into(),
            ));
        }
        for (i, provider) in self.providers.iter().enumerate() {
            if let Some(url) = provider.api_url.as_deref() {
                if reqwest::Url::parse(url.trim()).is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "providers[{i}].api_url is not a valid URL ({url})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The bot token, or the fatal error reported when it is missing.
    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.discord
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingSecret {
                name: "discord.bot_token",
                env: "DISCORD_TOKEN",
            })
    }

    /// Copy of the config with every credential masked, for display.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.discord.bot_token.is_some() {
            shown.discord.bot_token = Some(REDACTED.into());
        }
        for provider in &mut shown.providers {
            if provider.api_key.is_some() {
                provider.api_key = Some(REDACTED.into());
            }
        }
        shown
    }
}

/// HTTP client with request and connect timeouts. Falls back to a default
/// client if the builder fails.
pub fn build_http_client(
    service_key: &str,
    timeout_secs: u64,
    connect_timeout_secs: u64,
) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .connect_timeout(std::time::Duration::from_secs(connect_timeout_secs))
        .build()
        .unwrap_or_else(|error| {
            tracing::warn!(service_key, "Failed to build timeout client: {error}");
            reqwest::Client::new()
        })
}
