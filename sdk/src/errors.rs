//! Error types and handling
//!
//! This module provides the error types used throughout the Middag engine.
//! All errors implement the `MiddagErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Recoverability drives the retry helper in the engine: only recoverable
//! errors are retried, everything else fails the current step immediately.
//!
//! # Security
//!
//! Error messages never carry the bot token. Transport errors include the
//! HTTP status and the response body returned by the chat platform, which
//! does not echo credentials.

use thiserror::Error;

/// Trait for Middag error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait MiddagErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are transient (network hiccups, 5xx and 429 responses)
    /// and may be retried. Non-recoverable errors require operator intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Transport**: Chat platform API failures
/// - **Retry**: Bounded retries exhausted
/// - **Round**: Round lifecycle violations
/// - **Secrets**: Token lookup and keychain failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, MiddagErrorExt};
///
/// let error = EngineError::Network("connection reset".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Transport { status: 401, body: "401: Unauthorized".to_string() };
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Transport errors
    #[error("Transport error: HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode platform response: {0}")]
    Decode(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    // Retry errors
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    // Round errors
    #[error("A dinner round is already in progress")]
    RoundInProgress,

    #[error("Round failed: {0}")]
    Round(String),

    // Secret errors
    #[error("Missing secret: {0}")]
    MissingSecret(String),

    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Build a transport error from an HTTP status code and response body
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Self::Transport {
            status,
            body: body.into(),
        }
    }
}

impl MiddagErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::Transport { status, .. } => match status {
                401 | 403 => "The bot token was rejected. Check the token and bot permissions",
                404 => "Channel, message or user not found. Check the configured channel id",
                429 => "The chat platform is throttling requests. Try again shortly",
                _ => "The chat platform returned an error",
            },
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Decode(_) => "Unexpected response from the chat platform",
            Self::Gateway(_) => "Lost connection to the chat gateway. It will reconnect",

            Self::RetriesExhausted { .. } => "The operation kept failing. Check connectivity",

            Self::RoundInProgress => "Wait for the current round to finish",
            Self::Round(_) => "The round was abandoned. The next scheduled round will run",

            Self::MissingSecret(_) => "Set the bot token with 'middag token set' or the TOKEN env var",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) | Self::Gateway(_) | Self::Io(_) => true,

            Self::Config(_)
            | Self::Decode(_)
            | Self::RetriesExhausted { .. }
            | Self::RoundInProgress
            | Self::Round(_)
            | Self::MissingSecret(_)
            | Self::KeyringError(_) => false,
        }
    }
}
