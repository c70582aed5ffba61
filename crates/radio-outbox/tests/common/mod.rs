#![allow(dead_code)]

use async_trait::async_trait;
use radio_outbox::{
    Gid, Message, OutboxConfig, SchedulerState, SendResponse, SendScheduler, Transport,
    TransportResult,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One recorded transport call.
#[derive(Debug, Clone)]
pub struct Call {
    pub payload: Vec<u8>,
    pub destination: Option<Gid>,
    pub encrypt: bool,
    pub at: Instant,
}

/// Radio that answers from a script and records every call.
///
/// Once the script runs out every call gets a positive, one-hop response.
pub struct FakeRadio {
    script: Mutex<VecDeque<TransportResult>>,
    calls: Mutex<Vec<Call>>,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
    latency: Duration,
}

impl FakeRadio {
    pub fn new(script: Vec<TransportResult>) -> Arc<Self> {
        Self::with_latency(script, Duration::ZERO)
    }

    pub fn with_latency(script: Vec<TransportResult>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
            latency,
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls that were ever outstanding at once.
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }

    async fn answer(&self, payload: &[u8], destination: Option<Gid>, encrypt: bool) -> TransportResult {
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            payload: payload.to_vec(),
            destination,
            encrypt,
            at: Instant::now(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(SendResponse::positive(1)));
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl Transport for FakeRadio {
    async fn send_directed(&self, payload: &[u8], destination: Gid, encrypt: bool) -> TransportResult {
        self.answer(payload, Some(destination), encrypt).await
    }

    async fn send_broadcast(&self, payload: &[u8]) -> TransportResult {
        self.answer(payload, None, false).await
    }
}

/// Collects finished messages in the order their listeners fire.
pub struct Outcomes {
    sender: mpsc::UnboundedSender<Message>,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Outcomes {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    pub fn listener(&self) -> impl FnOnce(Message) + Send + 'static {
        let sender = self.sender.clone();
        move |message| {
            let _ = sender.send(message);
        }
    }

    pub async fn next(&mut self) -> Message {
        self.receiver.recv().await.expect("outcome channel closed")
    }

    /// Listener invocations that have already happened but were not read.
    pub fn try_next(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

pub fn start_scheduler(radio: Arc<FakeRadio>) -> SendScheduler {
    start_scheduler_with(radio, OutboxConfig::default())
}

pub fn start_scheduler_with(radio: Arc<FakeRadio>, config: OutboxConfig) -> SendScheduler {
    let scheduler = SendScheduler::new(radio, config);
    scheduler.start().expect("scheduler already started");
    scheduler
}

/// Poll the scheduler until it reaches `state`.
///
/// Sleeps between polls so a paused clock can still advance.
pub async fn wait_for_state(scheduler: &SendScheduler, state: SchedulerState) {
    loop {
        let status = scheduler.status().await.expect("scheduler closed");
        if status.state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
