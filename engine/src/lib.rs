//! Middag Engine Library
//!
//! This library provides the core functionality of the Middag dinner bot.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Retry with fixed delay for chat API calls
pub mod retry;

/// Message bus for chat events
pub mod message_bus;

/// Cumulative eat/cook counts
pub mod ledger;

/// Reply and reaction classification
pub mod classifier;

/// Chef selection
pub mod selector;

/// Message rendering
pub mod render;

/// Daily scheduling and collection windows
pub mod scheduler;

/// Round orchestration
pub mod round;

/// Discord transport
pub mod bot;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
