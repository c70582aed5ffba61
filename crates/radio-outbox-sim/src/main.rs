//! Radio outbox simulator - pushes a burst of messages through the outbox
//! into a simulated rate-limited radio and reports how they fared.

mod logging;
mod radio;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use radio_outbox::{
    Gid, Message, MessageStatus, OutboxConfig, OutboxResult, SendScheduler, DEFAULT_LOG_LEVEL,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::info;

use crate::logging::init_logging;
use crate::radio::{RadioSettings, SimulatedRadio};

/// Radio outbox simulator command-line interface.
#[derive(Parser)]
#[command(name = "radio-outbox-sim")]
#[command(about = "Send a burst of messages through the radio outbox")]
#[command(version)]
struct Cli {
    /// Number of messages to send
    #[arg(short, long, default_value_t = 5)]
    messages: u64,

    /// Make every n-th message a broadcast (0 = never)
    #[arg(long, default_value_t = 0)]
    broadcast_every: u64,

    /// Encrypt directed messages
    #[arg(long)]
    encrypt: bool,

    /// Minimum spacing the radio enforces between transmissions
    #[arg(long, default_value_t = 1000)]
    window_ms: u64,

    /// Make the radio reject every n-th accepted transmission (0 = never)
    #[arg(long, default_value_t = 0)]
    fail_every: u64,

    /// Override the resend delay after a rate-limit rejection
    #[arg(long)]
    resend_delay_ms: Option<u64>,

    /// Path to a JSON outbox config file
    #[arg(short, long, env = "RADIO_OUTBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RADIO_OUTBOX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging before loading config so override warnings are seen
    init_logging(&startup_log_level(&cli), cli.json_logs);

    let config = load_config(&cli)?;

    let radio = Arc::new(SimulatedRadio::new(RadioSettings {
        window: Duration::from_millis(cli.window_ms),
        fail_every: cli.fail_every,
        ..Default::default()
    }));

    let scheduler = SendScheduler::new(radio.clone(), config);
    let worker = scheduler.start()?;

    info!(
        messages = cli.messages,
        window_ms = cli.window_ms,
        "Starting simulation"
    );

    let started = Instant::now();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    for i in 0..cli.messages {
        let text = format!("message {}", i + 1);
        let is_broadcast = cli.broadcast_every > 0 && (i + 1) % cli.broadcast_every == 0;
        let message = if is_broadcast {
            Message::broadcast(text)
        } else {
            Message::directed(Gid(1_000 + i), text)
        };

        let done_tx = done_tx.clone();
        scheduler.submit(message, is_broadcast, cli.encrypt, move |message| {
            let _ = done_tx.send(message);
        })?;
    }
    drop(done_tx);

    let mut sent = 0;
    let mut failed = 0;
    while let Some(message) = done_rx.recv().await {
        match message.status {
            MessageStatus::SentSuccessfully => sent += 1,
            _ => failed += 1,
        }
        info!(
            message_id = %message.id,
            status = %message.status,
            hop_count = message.hop_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Message finished"
        );
    }

    drop(scheduler);
    worker.await?;

    println!(
        "sent={} failed={} rate_limited={} elapsed={:.1}s",
        sent,
        failed,
        radio.rate_limited(),
        started.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Level for the subscriber: the flag or `RADIO_OUTBOX_LOG_LEVEL`, then the
/// config file, then the default.
fn startup_log_level(cli: &Cli) -> String {
    if let Some(level) = &cli.log_level {
        return level.clone();
    }
    cli.config
        .as_deref()
        .and_then(|path| OutboxConfig::load_from_file(path).ok())
        .map(|config| config.log_level)
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

fn load_config(cli: &Cli) -> OutboxResult<OutboxConfig> {
    let mut config = match &cli.config {
        Some(path) => OutboxConfig::load(path)?,
        None => OutboxConfig::new(),
    };
    if let Some(delay) = cli.resend_delay_ms {
        config.resend_delay_ms = delay;
    }
    config.validate()?;
    Ok(config)
}
