//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
///
/// Transport failures are not represented here: they end up as a
/// [`MessageStatus`](crate::MessageStatus) on the message handed to the
/// result listener.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directed send requested for a message without a receiver
    #[error("Message {0} has no receiver for a directed send")]
    MissingRecipient(uuid::Uuid),

    /// `start()` called twice
    #[error("Send scheduler already started")]
    AlreadyStarted,

    /// The scheduler task is gone
    #[error("Send scheduler is closed")]
    Closed,
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
