//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - start: Run the gateway listener and the daily schedule until Ctrl-C
//! - round: Run one round immediately
//! - remind: Post the reminder once
//! - doctor: Validate configuration, token and connectivity
//! - token set / delete: Manage the bot token in the keychain

use anyhow::{Context, Result};
use sdk::errors::{EngineError, MiddagErrorExt};
use sdk::types::ChatEvent;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::bot::{DiscordClient, GatewayListener};
use crate::config::Config;
use crate::message_bus::{EventType, MessageBus};
use crate::round::{RoundOrchestrator, RoundOutcome, RoundSettings};
use crate::scheduler::{spawn_logged, Scheduler};
use crate::secrets::{SecretManager, SecretString, TOKEN_KEY};

/// How long `middag round` waits for the gateway before opening the window
const GATEWAY_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Everything a running bot needs
struct Bot {
    orchestrator: Arc<RoundOrchestrator>,
    bus: Arc<MessageBus>,
    token: SecretString,
}

impl Bot {
    fn connect(config: &Config) -> Result<Self> {
        let token = SecretManager::default()
            .resolve_token(&config.discord.token_env)
            .with_context(|| "Cannot start without a bot token")?;
        let settings = RoundSettings::from_config(config)?;

        let bus = Arc::new(MessageBus::new());
        let transport = Arc::new(DiscordClient::from_config(&config.discord, token.clone()));
        let orchestrator = Arc::new(RoundOrchestrator::new(
            transport,
            Arc::clone(&bus),
            settings,
        ));

        Ok(Self {
            orchestrator,
            bus,
            token,
        })
    }

    fn spawn_gateway(&self, config: &Config) -> JoinHandle<()> {
        let listener = GatewayListener::new(&config.discord, self.token.clone(), Arc::clone(&self.bus));
        spawn_logged("gateway", listener.run())
    }
}

/// Run the bot until Ctrl-C
pub async fn handle_start(config: &Config) -> Result<()> {
    let bot = Bot::connect(config)?;
    let gateway = bot.spawn_gateway(config);

    let scheduler = if config.core.test_mode {
        tracing::warn!(
            "Test mode: asking every minute with a {}s window",
            config.schedule.test_window_secs
        );
        Scheduler::test_mode()
    } else {
        Scheduler::daily(config.schedule.ask_time, config.schedule.reminder_time)
    };
    let jobs = scheduler.start(Arc::clone(&bot.orchestrator));

    println!(
        "Middag is running in channel {}. Press Ctrl-C to stop.",
        config.discord.channel_id
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    for job in jobs {
        job.abort();
    }
    gateway.abort();

    Ok(())
}

/// Run a single round now
pub async fn handle_round(config: &Config, format: OutputFormat) -> Result<()> {
    let bot = Bot::connect(config)?;

    // Replies only arrive through the gateway, so wait for it first
    let mut ready = bot.bus.subscribe(EventType::Connected).await;
    let gateway = bot.spawn_gateway(config);
    match tokio::time::timeout(GATEWAY_READY_TIMEOUT, ready.recv()).await {
        Ok(Some(ChatEvent::Connected)) => tracing::info!("Gateway connected"),
        _ => tracing::warn!("Gateway not ready, only reactions will be counted"),
    }
    drop(ready);

    let outcome = bot.orchestrator.trigger().await;
    gateway.abort();

    match outcome {
        RoundOutcome::Completed(report) => {
            match format {
                OutputFormat::Text => {
                    println!("✓ Round {} completed", report.round_id);
                    println!("  Participants: {}", report.participants.len());
                    println!("  Chefs:        {}", join_ids(&report.chefs));
                    println!();
                    println!("{}", report.message);
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
            Ok(())
        }
        RoundOutcome::Rejected => Err(EngineError::RoundInProgress.into()),
        RoundOutcome::Abandoned { round_id, reason } => {
            if let OutputFormat::Json = format {
                let output = json!({
                    "status": "abandoned",
                    "round_id": round_id,
                    "reason": reason,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Err(EngineError::Round(format!("{} abandoned: {}", round_id, reason)).into())
        }
    }
}

/// Post the reminder once
pub async fn handle_remind(config: &Config, format: OutputFormat) -> Result<()> {
    let bot = Bot::connect(config)?;
    let posted = bot.orchestrator.send_reminder().await?;

    match format {
        OutputFormat::Text => println!("✓ Reminder posted (message {})", posted.id),
        OutputFormat::Json => {
            let output = json!({
                "status": "posted",
                "message_id": posted.id,
                "channel_id": posted.channel_id,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Validate configuration and check connectivity
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    // Check 1: Configuration validation
    match config.validate() {
        Ok(()) => checks.push(("Configuration", "Valid".to_string())),
        Err(e) => {
            checks.push(("Configuration", "Invalid".to_string()));
            issues.push(e.to_string());
        }
    }

    // Check 2: Channel
    match config.discord.channel() {
        Ok(channel) => checks.push(("Channel", channel.to_string())),
        Err(e) => {
            checks.push(("Channel", "Not set".to_string()));
            issues.push(e.to_string());
        }
    }

    checks.push((
        "Schedule",
        if config.core.test_mode {
            format!("test mode, every minute, {}s window", config.schedule.test_window_secs)
        } else {
            format!(
                "ask {}, remind {}, cutoff {}",
                config.schedule.ask_time, config.schedule.reminder_time, config.schedule.cutoff_time
            )
        },
    ));

    // Check 3: Bot token
    let token = match SecretManager::default().resolve_token(&config.discord.token_env) {
        Ok(token) => {
            checks.push(("Bot token", "Found".to_string()));
            Some(token)
        }
        Err(e) => {
            checks.push(("Bot token", "Missing".to_string()));
            issues.push(format!("{} ({})", e, e.user_hint()));
            None
        }
    };

    // Check 4: Discord API
    if let Some(token) = token {
        let client = DiscordClient::from_config(&config.discord, token);
        match client.current_user().await {
            Ok(user) => checks.push(("Discord API", format!("Logged in as {}", user.display_name))),
            Err(e) => {
                checks.push(("Discord API", "Unreachable".to_string()));
                issues.push(format!("{} ({})", e, e.user_hint()));
            }
        }
    }

    // Output results
    match format {
        OutputFormat::Text => {
            println!("Middag Diagnostics");
            println!("==================");
            println!();

            for (check, status) in &checks {
                println!("  {:<15} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Prompt for the bot token and store it in the keychain
pub fn handle_token_set() -> Result<()> {
    let manager = SecretManager::default();
    let token = manager.prompt_for_secret(TOKEN_KEY)?;
    manager.set_secret(TOKEN_KEY, token.unsecure())?;
    println!("✓ Bot token stored in the keychain");
    Ok(())
}

/// Remove the stored bot token
pub fn handle_token_delete() -> Result<()> {
    SecretManager::default().delete_secret(TOKEN_KEY)?;
    println!("✓ Bot token removed from the keychain");
    Ok(())
}

fn join_ids(ids: &[sdk::types::ParticipantId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
