//! CLI interface for Middag
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running the dinner bot.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Middag dinner coordination bot
///
/// Asks a Discord channel every day who wants dinner, collects replies until
/// the cutoff, and picks today's chef fairly.
#[derive(Parser, Debug)]
#[command(name = "middag")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bot: listen on the gateway and ask on schedule until Ctrl-C
    Start,

    /// Run one round now and exit when it is done
    Round,

    /// Post the reminder once
    Remind,

    /// Validate configuration, token and Discord connectivity
    Doctor,

    /// Manage the bot token in the OS keychain
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

/// Bot token actions
#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Prompt for the token and store it in the keychain
    Set,

    /// Remove the stored token
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["middag", "start"]);
        assert!(matches!(cli.command, Command::Start));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "middag",
            "--json",
            "--log",
            "debug",
            "--config",
            "/tmp/middag.toml",
            "round",
        ]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/middag.toml")));
        assert!(matches!(cli.command, Command::Round));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["middag", "doctor", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Doctor));
    }

    #[test]
    fn test_token_set() {
        let cli = Cli::parse_from(["middag", "token", "set"]);
        if let Command::Token { action } = cli.command {
            assert!(matches!(action, TokenAction::Set));
        } else {
            panic!("Expected Token command");
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["middag", "history"]).is_err());
    }
}
