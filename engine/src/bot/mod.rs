//! Chat platform integrations

pub mod discord;

pub use discord::{DiscordClient, GatewayListener};
