//! Outbound queue of pending send requests.

use crate::{Gid, Message, MessageStatus};
use std::collections::VecDeque;
use std::fmt;

/// Listener invoked once a request reaches a terminal outcome.
///
/// Receives the message back with its final status and hop count.
pub type ResultListener = Box<dyn FnOnce(Message) + Send + 'static>;

/// A message waiting to be transmitted, with its send parameters.
pub struct SendRequest {
    pub message: Message,
    /// `None` for broadcasts.
    pub destination: Option<Gid>,
    /// Only meaningful for directed sends.
    pub encrypt: bool,
    /// Transport calls made for this request so far.
    pub attempts: u32,
    /// Rate-limit rejections seen for this request so far.
    pub rate_limited: u32,
    on_result: ResultListener,
}

impl SendRequest {
    /// Create a broadcast request.
    pub fn broadcast(message: Message, on_result: ResultListener) -> Self {
        Self {
            message,
            destination: None,
            encrypt: false,
            attempts: 0,
            rate_limited: 0,
            on_result,
        }
    }

    /// Create a request addressed to `destination`.
    pub fn directed(
        message: Message,
        destination: Gid,
        encrypt: bool,
        on_result: ResultListener,
    ) -> Self {
        Self {
            message,
            destination: Some(destination),
            encrypt,
            attempts: 0,
            rate_limited: 0,
            on_result,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination.is_none()
    }

    /// Record the final outcome and hand the message back to the producer.
    ///
    /// Consumes the request, so the listener cannot fire twice.
    pub fn complete(self, status: MessageStatus, hop_count: Option<u8>) {
        let Self {
            mut message,
            on_result,
            ..
        } = self;
        if let Some(hops) = hop_count {
            message.hop_count = hops;
        }
        message.status = status;
        on_result(message);
    }
}

impl fmt::Debug for SendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendRequest")
            .field("message_id", &self.message.id)
            .field("destination", &self.destination)
            .field("encrypt", &self.encrypt)
            .field("attempts", &self.attempts)
            .field("rate_limited", &self.rate_limited)
            .finish_non_exhaustive()
    }
}

/// FIFO of send requests. Only the head is ever dispatched or removed.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<SendRequest>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request at the tail.
    pub fn enqueue(&mut self, request: SendRequest) {
        self.pending.push_back(request);
    }

    /// The oldest pending request.
    pub fn peek_head(&self) -> Option<&SendRequest> {
        self.pending.front()
    }

    pub(crate) fn head_mut(&mut self) -> Option<&mut SendRequest> {
        self.pending.front_mut()
    }

    /// Remove the head. Callers must only do this once the head has reached a
    /// terminal outcome.
    pub fn remove_head(&mut self) -> Option<SendRequest> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
