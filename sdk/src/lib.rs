//! Middag SDK
//!
//! Shared library providing the error type, chat identifiers and the chat
//! transport trait used by the engine and by test transports.

/// Error types and handling
pub mod errors;

/// Chat identifiers and events
pub mod types;

/// Chat transport trait
pub mod transport;

// Re-export commonly used types
pub use errors::{EngineError, MiddagErrorExt};
pub use transport::ChatTransport;
pub use types::{ChannelId, ChatEvent, MessageId, Participant, ParticipantId, PostedMessage};
