//! Chat transport trait
//!
//! The transport is the engine's only window onto the chat platform. The
//! round orchestrator talks to it exclusively through this trait so that the
//! Discord client can be swapped for a scripted transport in tests.

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::types::{ChannelId, MessageId, Participant, ParticipantId, PostedMessage};

/// Request/response operations against the chat platform.
///
/// Every method is fallible. Callers wrap them in the engine's retry helper;
/// implementations should report transient failures as recoverable errors.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Name of the platform, used in logs
    fn name(&self) -> &str;

    /// Post a message to a channel
    async fn send_message(&self, channel: &ChannelId, text: &str)
        -> Result<PostedMessage, EngineError>;

    /// React to a message with an emoji as the bot
    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), EngineError>;

    /// Fetch a message by id
    async fn fetch_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<PostedMessage, EngineError>;

    /// List the users who reacted to a message with the given emoji
    async fn fetch_reaction_users(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<Vec<Participant>, EngineError>;

    /// Look up a user by id
    async fn fetch_user(&self, id: &ParticipantId) -> Result<Participant, EngineError>;
}
