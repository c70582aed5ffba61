//! One-shot cancellable timer used for delayed resends.

use std::future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

/// A timer that is either disarmed or armed with a single deadline.
///
/// Arming replaces any previous deadline, so at most one expiry is ever
/// pending.
#[derive(Debug, Default)]
pub struct RetryTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer to fire once after `delay`, disarming it first.
    pub fn arm(&mut self, delay: Duration) {
        self.cancel();
        self.sleep = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// Disarm the timer. Returns whether it was armed.
    pub fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Resolve when the armed deadline passes, disarming the timer.
    ///
    /// Never resolves while disarmed. Cancel safe: dropping the future leaves
    /// the timer armed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => future::pending::<()>().await,
        }
    }
}
