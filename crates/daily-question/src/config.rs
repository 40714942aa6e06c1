//! Bot configuration: a TOML file, overridden by environment variables.
//!
//! ```toml
//! [discord]
//! channel_id = 123456789012345678
//!
//! [schedule]
//! time = "20:00"
//! utc_offset = "+08:00"
//!
//! [[participants]]
//! id = 111111111111111111
//! display_name = "Ann"
//! ```
//!
//! Secrets are normally supplied through the environment
//! (`DISCORD_BOT_TOKEN`, `OPENAI_API_KEY`) rather than the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use round_coordination::{ChannelId, Participant, PromptStyle, RoundConfig};
use serde::Deserialize;

use crate::scheduler::DailySchedule;

pub const ENV_DISCORD_TOKEN: &str = "DISCORD_BOT_TOKEN";
pub const ENV_DISCORD_CHANNEL: &str = "DISCORD_CHANNEL_ID";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_HISTORY_PATH: &str = "DAILY_QUESTION_HISTORY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Discord bot credentials and the broadcast channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: String,
    pub channel_id: u64,
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            channel_id: 0,
            api_base: "https://discord.com/api/v10".into(),
        }
    }
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            max_tokens: 100,
            temperature: 1.2,
            request_timeout_secs: 30,
        }
    }
}

/// Daily fire time, in a fixed UTC offset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local `HH:MM`.
    pub time: String,
    /// `+HH:MM` or `-HH:MM`.
    pub utc_offset: String,
    /// Open a round immediately when `run` starts.
    pub ask_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time: "20:00".into(),
            utc_offset: "+08:00".into(),
            ask_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundSettings {
    pub answer_timeout_secs: u64,
    /// Past questions shown to the generator.
    pub history_context: usize,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            answer_timeout_secs: 3600,
            history_context: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// JSON file backing the history. `None` keeps it in memory only.
    pub path: Option<PathBuf>,
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            path: None,
            capacity: round_coordination::history::DEFAULT_CAPACITY,
        }
    }
}

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub discord: DiscordConfig,
    pub openai: OpenAiConfig,
    pub schedule: ScheduleConfig,
    pub round: RoundSettings,
    pub history: HistorySettings,
    pub prompt: PromptStyle,
    pub participants: Vec<Participant>,
}

impl BotConfig {
    /// Load from `path` (or defaults when absent), apply process environment
    /// overrides, and check the settings. Credentials and participants are
    /// left to [`BotConfig::validate`] so offline commands work without them.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate_settings()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_DISCORD_TOKEN) {
            self.discord.token = token;
        }
        if let Some(channel) = lookup(ENV_DISCORD_CHANNEL) {
            self.discord.channel_id = channel
                .trim()
                .parse()
                .map_err(|e| invalid(ENV_DISCORD_CHANNEL, format!("{e}")))?;
        }
        if let Some(key) = lookup(ENV_OPENAI_KEY) {
            self.openai.api_key = key;
        }
        if let Some(url) = lookup(ENV_OPENAI_BASE_URL) {
            self.openai.base_url = url;
        }
        if let Some(path) = lookup(ENV_HISTORY_PATH) {
            self.history.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Check everything the bot needs before it connects anywhere.
    /// Everything needed to talk to Discord and OpenAI and run rounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        if self.discord.token.trim().is_empty() {
            return Err(ConfigError::Missing("discord.token"));
        }
        if self.discord.channel_id == 0 {
            return Err(ConfigError::Missing("discord.channel_id"));
        }
        if self.openai.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("openai.api_key"));
        }
        if self.participants.is_empty() {
            return Err(invalid("participants", "at least one participant is required"));
        }
        for (i, p) in self.participants.iter().enumerate() {
            if self.participants[..i].iter().any(|q| q.id == p.id) {
                return Err(invalid("participants", format!("duplicate id {}", p.id)));
            }
            if p.display_name.trim().is_empty() {
                return Err(invalid("participants", format!("empty name for {}", p.id)));
            }
        }
        Ok(())
    }

    /// Schedule, timeout and history settings.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        if self.round.answer_timeout_secs == 0 {
            return Err(invalid("round.answer_timeout_secs", "must be positive"));
        }
        if self.history.capacity == 0 {
            return Err(invalid("history.capacity", "must be positive"));
        }
        self.schedule()?;
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.schedule.utc_offset)
    }

    pub fn schedule(&self) -> Result<DailySchedule, ConfigError> {
        let at = NaiveTime::parse_from_str(self.schedule.time.trim(), "%H:%M")
            .map_err(|e| invalid("schedule.time", format!("{e} (expected HH:MM)")))?;
        Ok(DailySchedule::new(at, self.utc_offset()?))
    }

    /// Settings for the round machine.
    pub fn round_config(&self) -> Result<RoundConfig, ConfigError> {
        let mut config = RoundConfig::new(
            self.participants.clone(),
            ChannelId(self.discord.channel_id),
        );
        config.answer_timeout = Duration::from_secs(self.round.answer_timeout_secs);
        config.history_context = self.round.history_context;
        config.utc_offset = self.utc_offset()?;
        config.prompt_style = self.prompt.clone();
        Ok(config)
    }
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z`).
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| invalid("schedule.utc_offset", raw));
    }

    let bad = || invalid("schedule.utc_offset", format!("{raw:?} (expected +HH:MM)"));
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(bad()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(bad)?;
    let hours: i32 = hours.parse().map_err(|_| bad())?;
    let minutes: i32 = minutes.parse().map_err(|_| bad())?;
    if hours > 23 || minutes > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}
