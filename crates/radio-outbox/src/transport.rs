//! Transport seam between the outbox and the radio.
//!
//! The outbox never talks to hardware directly. Anything that can push a
//! payload over the air and report back a single accept/reject answer
//! implements [`Transport`].

use crate::Gid;
use async_trait::async_trait;
use thiserror::Error;

/// Response code reported by the radio for a completed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// The radio accepted the message.
    Positive,
    /// The radio rejected the message.
    Negative,
    /// The radio answered with an error code.
    Error,
}

/// Answer from the radio for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendResponse {
    pub code: ResponseCode,
    /// Hops taken to reach the destination. A direct A -> B transfer is one
    /// hop; broadcasts never exceed one.
    pub hop_count: u8,
}

impl SendResponse {
    pub fn positive(hop_count: u8) -> Self {
        Self {
            code: ResponseCode::Positive,
            hop_count,
        }
    }

    pub fn negative(hop_count: u8) -> Self {
        Self {
            code: ResponseCode::Negative,
            hop_count,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.code == ResponseCode::Positive
    }
}

/// Transport-level failure.
///
/// Only [`TransportError::RateLimitExceeded`] is transient; the outbox treats
/// every other variant as a terminal failure for the message being sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The sender is transmitting faster than the radio allows.
    #[error("Data rate limit exceeded")]
    RateLimitExceeded,

    /// No radio is connected.
    #[error("Radio not connected")]
    NotConnected,

    /// The radio did not answer in time.
    #[error("Radio timed out")]
    Timeout,

    /// Any other device error code.
    #[error("Device error {code}: {message}")]
    Device {
        /// Raw error code reported by the radio.
        code: i32,
        /// Human-readable description.
        message: String,
    },
}

impl TransportError {
    /// Whether a delayed resend of the same message is the right recovery.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitExceeded)
    }
}

/// Result of a single transport call.
pub type TransportResult = Result<SendResponse, TransportError>;

/// A radio able to transmit payloads.
///
/// Implementations are shared behind an `Arc` and called by exactly one
/// scheduler task, never concurrently by the outbox.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a payload to a single radio.
    async fn send_directed(&self, payload: &[u8], destination: Gid, encrypt: bool)
        -> TransportResult;

    /// Send a payload to every radio in range. Broadcasts are unencrypted and
    /// single-hop.
    async fn send_broadcast(&self, payload: &[u8]) -> TransportResult;
}
