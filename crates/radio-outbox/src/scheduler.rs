//! Send scheduler: the single-lane actor that drains the outbound queue.
//!
//! The scheduler task exclusively owns the [`OutboundQueue`], the in-flight
//! transport call and the resend timer. Producers reach it only through the
//! [`SendScheduler`] handle, whose calls are turned into mailbox commands, so
//! enqueues, transport completions and timer expiries are all handled one at
//! a time on the same task.
//!
//! ```text
//!   submit ──▶ mailbox ──▶ ┌──────────┐  dispatch head   ┌───────────┐
//!                          │   Idle   │ ───────────────▶ │Attempting │
//!                          └──────────┘ ◀─────────────── └───────────┘
//!                               ▲        terminal result       │
//!                               │                              │ rate limited
//!                               │      resend delay elapsed    ▼
//!                               └─────────────────────── RetryScheduled
//! ```

use crate::{
    Message, MessageStatus, OutboundQueue, OutboxConfig, OutboxError, OutboxResult,
    ResultListener, RetryTimer, SendRequest, Transport, TransportResult,
};
use futures_util::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where the scheduler is in its send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No transport call outstanding and no resend pending.
    Idle,
    /// The head request has been handed to the transport.
    Attempting,
    /// The head request was rate limited and will be resent when the timer
    /// fires.
    RetryScheduled,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Attempting => "attempting",
            Self::RetryScheduled => "retry_scheduled",
        };
        f.write_str(name)
    }
}

/// Snapshot of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    /// Requests not yet terminated, including the head.
    pub queued: usize,
    pub state: SchedulerState,
    /// Transport calls made so far for the head request.
    pub head_attempts: u32,
    /// Time left until the rate-limited head is resent.
    pub resend_in: Option<Duration>,
}

enum Command {
    Submit(SendRequest),
    Status(oneshot::Sender<QueueStatus>),
}

/// Handle to the send scheduler.
///
/// Cheap to clone. Every clone feeds the same queue. Once all handles are
/// dropped the scheduler finishes what is already queued and exits.
#[derive(Clone)]
pub struct SendScheduler {
    sender: mpsc::UnboundedSender<Command>,
    worker: Arc<Mutex<Option<Worker>>>,
}

impl SendScheduler {
    /// Create a scheduler sending through `transport`.
    ///
    /// Nothing is transmitted until [`start()`](Self::start) is called;
    /// submissions made before that wait in the mailbox.
    pub fn new(transport: Arc<dyn Transport>, config: OutboxConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = Worker {
            transport,
            config,
            receiver,
            mailbox_open: true,
            queue: OutboundQueue::new(),
            state: SchedulerState::Idle,
            in_flight: None,
            retry_timer: RetryTimer::new(),
        };
        Self {
            sender,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Spawn the scheduler task on the current tokio runtime.
    pub fn start(&self) -> OutboxResult<JoinHandle<()>> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(OutboxError::AlreadyStarted)?;
        Ok(tokio::spawn(worker.run()))
    }

    /// Queue `message` for transmission. Returns immediately.
    ///
    /// `on_result` runs exactly once, on the scheduler task, after the
    /// transport gave a final answer for this message. Directed sends go to
    /// `message.receiver`; `encrypt` is ignored for broadcasts.
    pub fn submit<F>(
        &self,
        message: Message,
        is_broadcast: bool,
        encrypt: bool,
        on_result: F,
    ) -> OutboxResult<()>
    where
        F: FnOnce(Message) + Send + 'static,
    {
        let on_result: ResultListener = Box::new(on_result);
        let request = if is_broadcast {
            SendRequest::broadcast(message, on_result)
        } else {
            let destination = message
                .receiver
                .ok_or(OutboxError::MissingRecipient(message.id))?;
            SendRequest::directed(message, destination, encrypt, on_result)
        };

        debug!(
            message_id = %request.message.id,
            broadcast = request.is_broadcast(),
            "Submitting message"
        );

        self.sender
            .send(Command::Submit(request))
            .map_err(|_| OutboxError::Closed)
    }

    /// Queue a directed message for `message.receiver`.
    pub fn send_message<F>(&self, message: Message, encrypt: bool, on_result: F) -> OutboxResult<()>
    where
        F: FnOnce(Message) + Send + 'static,
    {
        self.submit(message, false, encrypt, on_result)
    }

    /// Queue a broadcast message.
    pub fn send_broadcast<F>(&self, message: Message, on_result: F) -> OutboxResult<()>
    where
        F: FnOnce(Message) + Send + 'static,
    {
        self.submit(message, true, false, on_result)
    }

    /// Current queue length and state, as seen by the scheduler task.
    pub async fn status(&self) -> OutboxResult<QueueStatus> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Command::Status(reply))
            .map_err(|_| OutboxError::Closed)?;
        response.await.map_err(|_| OutboxError::Closed)
    }
}

impl fmt::Debug for SendScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendScheduler").finish_non_exhaustive()
    }
}

/// State owned by the scheduler task.
struct Worker {
    transport: Arc<dyn Transport>,
    config: OutboxConfig,
    receiver: mpsc::UnboundedReceiver<Command>,
    mailbox_open: bool,
    queue: OutboundQueue,
    state: SchedulerState,
    /// The single outstanding transport call, if any.
    in_flight: Option<BoxFuture<'static, TransportResult>>,
    retry_timer: RetryTimer,
}

impl Worker {
    async fn run(mut self) {
        info!(
            resend_delay_ms = self.config.resend_delay_ms,
            max_rate_limit_retries = ?self.config.max_rate_limit_retries,
            "Send scheduler started"
        );

        loop {
            if !self.mailbox_open && self.queue.is_empty() {
                break;
            }

            tokio::select! {
                command = self.receiver.recv(), if self.mailbox_open => match command {
                    Some(Command::Submit(request)) => {
                        self.queue.enqueue(request);
                        self.attempt_to_send();
                    }
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    None => {
                        debug!(queued = self.queue.len(), "All handles dropped, draining queue");
                        self.mailbox_open = false;
                    }
                },
                result = next_result(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    self.handle_result(result);
                }
                _ = self.retry_timer.fired(), if self.retry_timer.is_armed() => {
                    debug!("Resend delay elapsed");
                    self.state = SchedulerState::Idle;
                    self.attempt_to_send();
                }
                else => {
                    warn!(queued = self.queue.len(), "Send scheduler stalled, abandoning queue");
                    break;
                }
            }
        }

        info!("Send scheduler stopped");
    }

    fn status(&self) -> QueueStatus {
        QueueStatus {
            queued: self.queue.len(),
            state: self.state,
            head_attempts: self.queue.peek_head().map_or(0, |head| head.attempts),
            resend_in: self
                .retry_timer
                .deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now())),
        }
    }

    /// Dispatch the head if nothing is outstanding.
    ///
    /// A pending resend is not preempted: new submissions wait behind the
    /// rate-limited head until its timer fires.
    fn attempt_to_send(&mut self) {
        if self.state != SchedulerState::Idle {
            return;
        }
        let Some(head) = self.queue.head_mut() else {
            return;
        };

        self.retry_timer.cancel();
        head.attempts += 1;

        let transport = self.transport.clone();
        let payload = head.message.payload.clone();
        let dispatch = match head.destination {
            None => async move { transport.send_broadcast(&payload).await }.boxed(),
            Some(destination) => {
                let encrypt = head.encrypt;
                async move { transport.send_directed(&payload, destination, encrypt).await }
                    .boxed()
            }
        };

        debug!(
            message_id = %head.message.id,
            destination = ?head.destination,
            attempt = head.attempts,
            "Dispatching message"
        );

        self.in_flight = Some(dispatch);
        self.state = SchedulerState::Attempting;
    }

    fn handle_result(&mut self, result: TransportResult) {
        self.state = SchedulerState::Idle;
        match result {
            Ok(response) => {
                let status = if response.is_positive() {
                    MessageStatus::SentSuccessfully
                } else {
                    MessageStatus::ErrorSending
                };
                self.finish_head(status, Some(response.hop_count));
            }
            Err(err) if err.is_rate_limit() => self.schedule_resend(),
            Err(err) => {
                warn!(error = %err, "Transport error, giving up on message");
                self.finish_head(MessageStatus::ErrorSending, None);
            }
        }
    }

    fn schedule_resend(&mut self) {
        let delay = self.config.resend_delay();
        let max_retries = self.config.max_rate_limit_retries;
        let Some(head) = self.queue.head_mut() else {
            return;
        };
        head.rate_limited += 1;

        if max_retries.is_some_and(|max| head.rate_limited > max) {
            warn!(
                message_id = %head.message.id,
                rate_limited = head.rate_limited,
                "Rate limit retries exhausted"
            );
            self.finish_head(MessageStatus::ErrorSending, None);
            return;
        }

        warn!(
            message_id = %head.message.id,
            rate_limited = head.rate_limited,
            delay_ms = delay.as_millis() as u64,
            "Data rate limit was exceeded. Resending message in {:.1} seconds",
            delay.as_secs_f64()
        );

        self.retry_timer.arm(delay);
        self.state = SchedulerState::RetryScheduled;
    }

    /// Terminate the head, notify its listener and move on to the next one.
    fn finish_head(&mut self, status: MessageStatus, hop_count: Option<u8>) {
        if let Some(request) = self.queue.remove_head() {
            info!(
                message_id = %request.message.id,
                status = %status,
                hop_count = ?hop_count,
                attempts = request.attempts,
                queued = self.queue.len(),
                "Message send finished"
            );
            request.complete(status, hop_count);
        }
        self.state = SchedulerState::Idle;
        self.attempt_to_send();
    }
}

async fn next_result(in_flight: &mut Option<BoxFuture<'static, TransportResult>>) -> TransportResult {
    match in_flight {
        Some(dispatch) => dispatch.await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Gid, SendResponse, TransportError};
    use crate::test_support::LogBuffer;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Answers every call from a fixed script, then positively.
    struct ScriptTransport {
        script: Mutex<VecDeque<TransportResult>>,
    }

    impl ScriptTransport {
        fn new(script: Vec<TransportResult>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }

        fn next(&self) -> TransportResult {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SendResponse::positive(1)))
        }
    }

    #[async_trait]
    impl Transport for ScriptTransport {
        async fn send_directed(&self, _: &[u8], _: Gid, _: bool) -> TransportResult {
            self.next()
        }

        async fn send_broadcast(&self, _: &[u8]) -> TransportResult {
            self.next()
        }
    }

    fn listener() -> (
        impl FnOnce(Message) + Send + 'static,
        oneshot::Receiver<Message>,
    ) {
        let (tx, rx) = oneshot::channel();
        (
            move |msg| {
                let _ = tx.send(msg);
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let scheduler = SendScheduler::new(ScriptTransport::new(vec![]), OutboxConfig::default());
        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(OutboxError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_directed_without_receiver_is_rejected() {
        let scheduler = SendScheduler::new(ScriptTransport::new(vec![]), OutboxConfig::default());
        let message = Message::broadcast("no receiver");
        let id = message.id;

        let result = scheduler.send_message(message, true, |_| {});
        assert!(matches!(result, Err(OutboxError::MissingRecipient(got)) if got == id));
    }

    #[tokio::test]
    async fn test_idle_status_when_empty() {
        let scheduler = SendScheduler::new(ScriptTransport::new(vec![]), OutboxConfig::default());
        scheduler.start().unwrap();

        let status = scheduler.status().await.unwrap();
        assert_eq!(status.queued, 0);
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.head_attempts, 0);
        assert!(status.resend_in.is_none());
    }

    #[tokio::test]
    async fn test_submissions_before_start_are_kept() {
        let scheduler = SendScheduler::new(ScriptTransport::new(vec![]), OutboxConfig::default());
        let (on_result, done) = listener();
        scheduler
            .send_broadcast(Message::broadcast("early"), on_result)
            .unwrap();

        scheduler.start().unwrap();

        let msg = done.await.unwrap();
        assert_eq!(msg.status, MessageStatus::SentSuccessfully);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_retry_scheduled() {
        let transport = ScriptTransport::new(vec![Err(TransportError::RateLimitExceeded)]);
        let scheduler = SendScheduler::new(transport, OutboxConfig::default());
        scheduler.start().unwrap();

        let (on_result, done) = listener();
        scheduler
            .send_message(Message::directed(Gid(1), "a"), false, on_result)
            .unwrap();

        // The rejection may land after the first status query
        let status = loop {
            let status = scheduler.status().await.unwrap();
            if status.state != SchedulerState::Attempting {
                break status;
            }
            tokio::task::yield_now().await;
        };
        assert_eq!(status.state, SchedulerState::RetryScheduled);
        assert_eq!(status.queued, 1);
        assert_eq!(status.head_attempts, 1);
        assert_eq!(status.resend_in, Some(Duration::from_millis(5000)));

        tokio::time::sleep(Duration::from_millis(2000)).await;
        let status = scheduler.status().await.unwrap();
        assert_eq!(status.state, SchedulerState::RetryScheduled);
        assert_eq!(status.resend_in, Some(Duration::from_millis(3000)));

        let msg = done.await.unwrap();
        assert_eq!(msg.status, MessageStatus::SentSuccessfully);

        let status = scheduler.status().await.unwrap();
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.queued, 0);
        assert!(status.resend_in.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_warning_reports_fractional_seconds() {
        let logs = LogBuffer::default();
        let _subscriber = tracing::subscriber::set_default(logs.subscriber());

        let transport = ScriptTransport::new(vec![Err(TransportError::RateLimitExceeded)]);
        let config = OutboxConfig {
            resend_delay_ms: 500,
            ..Default::default()
        };
        let scheduler = SendScheduler::new(transport, config);
        scheduler.start().unwrap();

        let (on_result, done) = listener();
        scheduler
            .send_broadcast(Message::broadcast("quick"), on_result)
            .unwrap();
        assert_eq!(done.await.unwrap().status, MessageStatus::SentSuccessfully);

        let output = logs.contents();
        assert!(
            output.contains("Resending message in 0.5 seconds"),
            "unexpected log output: {output}"
        );
        assert!(!output.contains("Resending message in 0 seconds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cap_fails_message() {
        let transport = ScriptTransport::new(vec![
            Err(TransportError::RateLimitExceeded),
            Err(TransportError::RateLimitExceeded),
            Err(TransportError::RateLimitExceeded),
        ]);
        let config = OutboxConfig {
            max_rate_limit_retries: Some(2),
            ..Default::default()
        };
        let scheduler = SendScheduler::new(transport, config);
        scheduler.start().unwrap();

        let start = tokio::time::Instant::now();
        let (on_result, done) = listener();
        scheduler
            .send_broadcast(Message::broadcast("capped"), on_result)
            .unwrap();

        let msg = done.await.unwrap();
        assert_eq!(msg.status, MessageStatus::ErrorSending);
        // Two resends, each after the fixed delay
        assert!(start.elapsed() >= Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_scheduler_exits_after_handles_dropped() {
        let scheduler = SendScheduler::new(ScriptTransport::new(vec![]), OutboxConfig::default());
        let handle = scheduler.start().unwrap();

        let (on_result, done) = listener();
        scheduler
            .send_broadcast(Message::broadcast("last"), on_result)
            .unwrap();
        drop(scheduler);

        handle.await.unwrap();
        assert_eq!(done.await.unwrap().status, MessageStatus::SentSuccessfully);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SchedulerState::Idle.to_string(), "idle");
        assert_eq!(SchedulerState::Attempting.to_string(), "attempting");
        assert_eq!(SchedulerState::RetryScheduled.to_string(), "retry_scheduled");
    }
}
