//! Message model carried through the outbox.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Global identifier of a radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(pub u64);

impl Gid {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Gid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Queued or awaiting a transport response.
    #[default]
    Pending,
    /// The transport accepted the message.
    SentSuccessfully,
    /// The transport rejected the message or failed permanently.
    ErrorSending,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SentSuccessfully => "sent_successfully",
            Self::ErrorSending => "error_sending",
        }
    }

    /// Whether this status ends the message's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound message.
///
/// The payload is opaque to the outbox; callers encode it however their
/// application protocol requires. `status` and `hop_count` are written by the
/// scheduler once the transport has given a final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Local identifier, used for log correlation.
    pub id: Uuid,
    /// Receiving radio. `None` for broadcasts.
    pub receiver: Option<Gid>,
    /// Encoded message body.
    pub payload: Vec<u8>,
    /// Delivery status.
    pub status: MessageStatus,
    /// Hops reported by the transport. Broadcasts travel at most one hop.
    pub hop_count: u8,
}

impl Message {
    /// Create a message addressed to every radio in range.
    pub fn broadcast(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            receiver: None,
            payload: payload.into(),
            status: MessageStatus::Pending,
            hop_count: 0,
        }
    }

    /// Create a message addressed to a single radio.
    pub fn directed(receiver: Gid, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            receiver: Some(receiver),
            ..Self::broadcast(payload)
        }
    }
}
