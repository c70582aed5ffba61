//! Single-lane outbound message dispatcher for rate-limited radios.
//!
//! This crate provides:
//! - SendScheduler: Actor that sends queued messages one at a time, in order
//! - OutboundQueue: FIFO of pending send requests
//! - Transport: Seam to the radio that actually moves bytes
//! - RetryTimer: Cancellable one-shot timer for rate-limit resends
//! - OutboxConfig: Resend delay and retry cap, from file and environment
//!
//! # Example
//!
//! ```ignore
//! use radio_outbox::{Gid, Message, OutboxConfig, SendScheduler};
//!
//! let scheduler = SendScheduler::new(radio, OutboxConfig::new());
//! scheduler.start()?;
//!
//! scheduler.send_message(Message::directed(Gid(42), payload), true, |message| {
//!     tracing::info!(status = %message.status, hops = message.hop_count, "delivered");
//! })?;
//! ```

mod config;
mod error;
mod message;
mod queue;
mod scheduler;
#[cfg(test)]
mod test_support;
mod timer;
mod transport;

pub use config::{OutboxConfig, DEFAULT_LOG_LEVEL, DEFAULT_RESEND_DELAY_MS};
pub use error::{OutboxError, OutboxResult};
pub use message::{Gid, Message, MessageStatus};
pub use queue::{OutboundQueue, ResultListener, SendRequest};
pub use scheduler::{QueueStatus, SchedulerState, SendScheduler};
pub use timer::RetryTimer;
pub use transport::{ResponseCode, SendResponse, Transport, TransportError, TransportResult};
