//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! falls back to defaults for missing sections, and rejects invalid values.

use middag_engine::config::{Config, CHANNEL_ID_ENV};
use middag_engine::round::RoundSettings;
use middag_engine::scheduler::{TimeOfDay, WindowPolicy};
use sdk::errors::EngineError;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_full_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[core]
log_level = "debug"
test_mode = false

[discord]
channel_id = "4242"
token_env = "MIDDAG_TOKEN"

[schedule]
ask_time = "11:30"
reminder_time = "14:00"
cutoff_time = "15:45"

[round]
emoji = "🍕"
required_count = 3
dinner_ideas = ["Pizza", "Suppe"]

[retry]
max_attempts = 5
delay_ms = 100

[messages]
too_few = "For få i dag"
"#,
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.discord.token_env, "MIDDAG_TOKEN");
    assert_eq!(config.schedule.ask_time, TimeOfDay::new(11, 30).unwrap());
    assert_eq!(config.schedule.cutoff_time.to_string(), "15:45");
    assert_eq!(config.round.emoji, "🍕");
    assert_eq!(config.round.required_count, 3);
    assert_eq!(config.round.dinner_ideas, vec!["Pizza", "Suppe"]);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.messages.too_few, "For få i dag");
    // Unset messages keep their defaults
    assert!(config.messages.reminder.contains("{cutoff}"));
}

#[test]
fn test_empty_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.schedule.ask_time.to_string(), "12:00");
    assert_eq!(config.schedule.reminder_time.to_string(), "15:00");
    assert_eq!(config.schedule.cutoff_time.to_string(), "16:00");
    assert_eq!(config.round.required_count, 2);
    assert_eq!(config.retry.delay_ms, 2000);
    assert!(!config.round.dinner_ideas.is_empty());
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let result = Config::load_from_path(&dir.path().join("missing.toml"));
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
fn test_rejects_invalid_values() {
    let cases = [
        ("[core]\nlog_level = \"loud\"", "log level"),
        ("[round]\nrequired_count = 0", "required_count"),
        ("[round]\nemoji = \" \"", "emoji"),
        ("[round]\ndinner_ideas = [\"\", \"  \"]", "dinner_ideas"),
        ("[retry]\nmax_attempts = 0", "max_attempts"),
        ("[schedule]\nreminder_time = \"17:00\"", "reminder_time"),
        (
            "[core]\ntest_mode = true\n[schedule]\ntest_window_secs = 0",
            "test_window_secs",
        ),
    ];

    let dir = TempDir::new().unwrap();
    for (contents, expected) in cases {
        let path = write_config(&dir, contents);
        match Config::load_from_path(&path) {
            Err(EngineError::Config(message)) => assert!(
                message.contains(expected),
                "'{}' should mention '{}', got: {}",
                contents,
                expected,
                message
            ),
            other => panic!("'{}' should be rejected, got {:?}", contents, other),
        }
    }
}

#[test]
fn test_rejects_non_numeric_channel() {
    let config = Config::from_toml("[discord]\nchannel_id = \"general\"").unwrap();
    match config.validate() {
        Err(EngineError::Config(message)) => assert!(message.contains("channel_id")),
        other => panic!("expected a config error, got {:?}", other),
    }
}

#[test]
fn test_rejects_malformed_time() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[schedule]\nask_time = \"25:00\"");
    assert!(matches!(
        Config::load_from_path(&path),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn test_channel_env_override() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[discord]\nchannel_id = \"4242\"");

    std::env::set_var(CHANNEL_ID_ENV, "777");
    let config = Config::load_from_path(&path);
    std::env::remove_var(CHANNEL_ID_ENV);

    let config = config.unwrap();
    assert_eq!(config.discord.channel_id, "777");
    assert_eq!(config.discord.channel().unwrap().as_str(), "777");
}

#[test]
fn test_round_settings_follow_mode() {
    let mut config = Config::from_toml("[discord]\nchannel_id = \"4242\"").unwrap();

    let daily = RoundSettings::from_config(&config).unwrap();
    assert_eq!(
        daily.window,
        WindowPolicy::DailyCutoff(config.schedule.cutoff_time)
    );
    assert!(!daily.test_mode);

    config.core.test_mode = true;
    let test = RoundSettings::from_config(&config).unwrap();
    assert_eq!(
        test.window,
        WindowPolicy::Fixed(std::time::Duration::from_secs(10))
    );
    assert!(test.test_mode);
}

#[test]
fn test_round_settings_need_channel() {
    let config = Config::from_toml("").unwrap();
    assert!(RoundSettings::from_config(&config).is_err());
}
