//! Simulated radio with a data rate limit.

use async_trait::async_trait;
use radio_outbox::{Gid, SendResponse, Transport, TransportError, TransportResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Behaviour knobs for [`SimulatedRadio`].
#[derive(Debug, Clone)]
pub struct RadioSettings {
    /// Minimum spacing between accepted transmissions.
    pub window: Duration,
    /// Every n-th accepted transmission is answered negatively. 0 disables.
    pub fail_every: u64,
    /// Time on air before the radio answers.
    pub air_time: Duration,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(1000),
            fail_every: 0,
            air_time: Duration::from_millis(50),
        }
    }
}

/// A radio that rejects transmissions arriving faster than one per window.
pub struct SimulatedRadio {
    settings: RadioSettings,
    last_accepted: Mutex<Option<Instant>>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl SimulatedRadio {
    pub fn new(settings: RadioSettings) -> Self {
        Self {
            settings,
            last_accepted: Mutex::new(None),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Transmissions rejected because of the rate limit.
    pub fn rate_limited(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Admit a transmission or reject it for exceeding the rate limit.
    fn admit(&self) -> Result<u64, TransportError> {
        let now = Instant::now();
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(previous) = *last {
            if now.duration_since(previous) < self.settings.window {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(TransportError::RateLimitExceeded);
            }
        }
        *last = Some(now);
        Ok(self.accepted.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn transmit(&self, payload: &[u8], hop_count: u8) -> TransportResult {
        let sequence = self.admit()?;
        debug!(bytes = payload.len(), sequence, "Simulated radio transmitting");

        tokio::time::sleep(self.settings.air_time).await;

        let fail_every = self.settings.fail_every;
        if fail_every > 0 && sequence % fail_every == 0 {
            Ok(SendResponse::negative(hop_count))
        } else {
            Ok(SendResponse::positive(hop_count))
        }
    }
}

#[async_trait]
impl Transport for SimulatedRadio {
    async fn send_directed(&self, payload: &[u8], destination: Gid, _encrypt: bool) -> TransportResult {
        // Mesh routes top out at three hops
        let hops = 1 + (destination.as_u64() % 3) as u8;
        self.transmit(payload, hops).await
    }

    async fn send_broadcast(&self, payload: &[u8]) -> TransportResult {
        self.transmit(payload, 1).await
    }
}
