//! Configuration management
//!
//! This module handles loading, validation, and management of the Middag configuration.
//! Configuration is stored in TOML format at ~/.middag/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level and test mode
//! - **discord**: Channel, API endpoints and the token's environment variable
//! - **schedule**: Ask, reminder and cutoff times of day
//! - **round**: Reaction emoji, minimum participants and dinner ideas
//! - **retry**: Attempt budget and delay for chat API calls
//! - **messages**: Every text the bot posts
//!
//! # Environment
//!
//! A `.env` file in the working directory is loaded at startup. `CHANNEL_ID`
//! overrides `discord.channel_id`. The bot token never lives in this file; see
//! [`crate::secrets`].
//!
//! # Examples
//!
//! ```no_run
//! use middag_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Cutoff: {}", config.schedule.cutoff_time);
//! println!("Minimum guests: {}", config.round.required_count);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scheduler::TimeOfDay;

/// Environment variable that overrides `discord.channel_id`
pub const CHANNEL_ID_ENV: &str = "CHANNEL_ID";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Discord connection settings
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Daily schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Round rules
    #[serde(default)]
    pub round: RoundConfig,

    /// Retry policy for chat API calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Posted texts
    #[serde(default)]
    pub messages: MessagesConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Ask every minute with a short window, always post the full summary,
    /// and dump the ledger after every round
    #[serde(default)]
    pub test_mode: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            test_mode: false,
        }
    }
}

/// Discord configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Channel the bot posts in and listens to
    #[serde(default)]
    pub channel_id: String,

    /// REST API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Gateway websocket URL
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Name of the environment variable holding the bot token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Delay in seconds before reconnecting to the gateway
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    // Note: the token itself is read from the environment or the OS keychain
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            api_base_url: default_api_base_url(),
            gateway_url: default_gateway_url(),
            token_env: default_token_env(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl DiscordConfig {
    /// The configured channel, or an error if none is set
    pub fn channel(&self) -> Result<ChannelId, EngineError> {
        let id = self.channel_id.trim();
        if id.is_empty() {
            return Err(EngineError::Config(format!(
                "discord.channel_id is not set. Add it to config.toml or set {}",
                CHANNEL_ID_ENV
            )));
        }
        Ok(ChannelId::new(id))
    }
}

/// Daily schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// When the prompt is posted
    #[serde(default = "default_ask_time")]
    pub ask_time: TimeOfDay,

    /// When the reminder is posted
    #[serde(default = "default_reminder_time")]
    pub reminder_time: TimeOfDay,

    /// When the collection window closes
    #[serde(default = "default_cutoff_time")]
    pub cutoff_time: TimeOfDay,

    /// Window length in test mode (seconds)
    #[serde(default = "default_test_window_secs")]
    pub test_window_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ask_time: default_ask_time(),
            reminder_time: default_reminder_time(),
            cutoff_time: default_cutoff_time(),
            test_window_secs: default_test_window_secs(),
        }
    }
}

/// Round rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Reaction that counts as "I want dinner"
    #[serde(default = "default_emoji")]
    pub emoji: String,

    /// Minimum participants for a proper dinner
    #[serde(default = "default_required_count")]
    pub required_count: usize,

    /// Dishes to suggest
    #[serde(default = "default_dinner_ideas")]
    pub dinner_ideas: Vec<String>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            emoji: default_emoji(),
            required_count: default_required_count(),
            dinner_ideas: default_dinner_ideas(),
        }
    }
}

/// Retry configuration for chat API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (milliseconds)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Texts posted by the bot.
///
/// `{cutoff}` in the prompt and reminder is replaced with the window's
/// closing time; `{id}` in `mention` with a participant id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,

    #[serde(default = "default_reminder")]
    pub reminder: String,

    #[serde(default = "default_summary_heading")]
    pub summary_heading: String,

    #[serde(default = "default_guests_label")]
    pub guests_label: String,

    #[serde(default = "default_chefs_label")]
    pub chefs_label: String,

    #[serde(default = "default_dish_label")]
    pub dish_label: String,

    #[serde(default = "default_too_few")]
    pub too_few: String,

    #[serde(default = "default_nobody_could_cook")]
    pub nobody_could_cook: String,

    #[serde(default = "default_mention")]
    pub mention: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            reminder: default_reminder(),
            summary_heading: default_summary_heading(),
            guests_label: default_guests_label(),
            chefs_label: default_chefs_label(),
            dish_label: default_dish_label(),
            too_few: default_too_few(),
            nobody_could_cook: default_nobody_could_cook(),
            mention: default_mention(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".to_string()
}

fn default_token_env() -> String {
    "TOKEN".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_ask_time() -> TimeOfDay {
    TimeOfDay::new(12, 0).unwrap_or_default()
}

fn default_reminder_time() -> TimeOfDay {
    TimeOfDay::new(15, 0).unwrap_or_default()
}

fn default_cutoff_time() -> TimeOfDay {
    TimeOfDay::new(16, 0).unwrap_or_default()
}

fn default_test_window_secs() -> u64 {
    10
}

fn default_emoji() -> String {
    "👍".to_string()
}

fn default_required_count() -> usize {
    2
}

fn default_dinner_ideas() -> Vec<String> {
    [
        "Taco",
        "Spaghetti bolognese",
        "Pasta carbonara",
        "Kjøttkaker i brun saus",
        "Fiskesuppe",
        "Laks med poteter og brokkoli",
        "Fiskegrateng",
        "Lasagne",
        "Hjemmelaget pizza",
        "Kylling tikka masala",
        "Chili con carne",
        "Wok med kylling og grønnsaker",
        "Pølser i lompe",
        "Hamburgere",
        "Tomatsuppe med egg",
        "Fårikål",
        "Pannekaker med bacon",
        "Risotto med sopp",
        "Kyllinggryte med ris",
        "Ovnsbakt torsk",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_prompt() -> String {
    [
        "@everyone 💬",
        "Send en melding (eller reager på denne) innen {cutoff} ⏰ for å få middag",
        "- Hvis du vil ha, men ikke kan lage -> skriv '0'",
        "- Hvis du gjerne vil lage -> skriv '1'",
        "- Hvis du vil ha trekning -> skriv alt annet",
    ]
    .join("\n")
}

fn default_reminder() -> String {
    "@everyone 💬\nHusk å respondere innen {cutoff} 🧑‍🍳".to_string()
}

fn default_summary_heading() -> String {
    "@everyone 🍽️ Dagens middag:".to_string()
}

fn default_guests_label() -> String {
    "🤑 Gjester".to_string()
}

fn default_chefs_label() -> String {
    "🧑‍🍳 Dagens chef(s)".to_string()
}

fn default_dish_label() -> String {
    "🍳 Middagsforslag".to_string()
}

fn default_too_few() -> String {
    "@everyone 😔 Kun én eller ingen skal ha middag".to_string()
}

fn default_nobody_could_cook() -> String {
    "@everyone 😔 Ingen kunne lage middag idag".to_string()
}

fn default_mention() -> String {
    "<@{id}>".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            discord: DiscordConfig::default(),
            schedule: ScheduleConfig::default(),
            round: RoundConfig::default(),
            retry: RetryConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.middag/config.toml)
    ///
    /// If the configuration file doesn't exist, writes a default configuration
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment overrides are applied before validation.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text without environment overrides
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Wrote default configuration to {}", path.display());

        let mut config = config;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.middag/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".middag").join("config.toml"))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(channel) = std::env::var(CHANNEL_ID_ENV) {
            if !channel.trim().is_empty() {
                self.discord.channel_id = channel.trim().to_string();
            }
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The log level is unknown
    /// - The channel id is set but not numeric
    /// - The emoji, dinner ideas or token variable name are empty
    /// - `required_count` or `max_attempts` is zero
    /// - The reminder is not between ask and cutoff time
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let channel = self.discord.channel_id.trim();
        if !channel.is_empty() && !channel.chars().all(|c| c.is_ascii_digit()) {
            return Err(EngineError::Config(format!(
                "discord.channel_id must be a numeric snowflake, got '{}'",
                channel
            )));
        }

        if self.discord.token_env.trim().is_empty() {
            return Err(EngineError::Config(
                "discord.token_env cannot be empty".to_string(),
            ));
        }

        if self.round.emoji.trim().is_empty() {
            return Err(EngineError::Config("round.emoji cannot be empty".to_string()));
        }

        if self.round.required_count == 0 {
            return Err(EngineError::Config(
                "round.required_count must be at least 1".to_string(),
            ));
        }

        if self.round.dinner_ideas.iter().all(|d| d.trim().is_empty()) {
            return Err(EngineError::Config(
                "round.dinner_ideas must contain at least one dish".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        let schedule = &self.schedule;
        if !(schedule.ask_time < schedule.reminder_time
            && schedule.reminder_time < schedule.cutoff_time)
        {
            return Err(EngineError::Config(format!(
                "schedule times must satisfy ask_time < reminder_time < cutoff_time (got {} / {} / {})",
                schedule.ask_time, schedule.reminder_time, schedule.cutoff_time
            )));
        }

        if self.core.test_mode && schedule.test_window_secs == 0 {
            return Err(EngineError::Config(
                "schedule.test_window_secs must be positive in test mode".to_string(),
            ));
        }

        Ok(())
    }
}
