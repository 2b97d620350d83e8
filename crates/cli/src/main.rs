mod cli;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{debug, info};

use hush_core::config::{load_dotenv, Config};
use hush_queue::{DelayedUniqueQueue, EventKind, ShutdownRegistry};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries admitted lines only.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    config.log_summary();

    let mut queue_config = config.queue.clone();
    if let Some(delay_ms) = args.delay_ms {
        queue_config.default_delay_ms = delay_ms;
    }
    if let Some(policy) = args.policy {
        queue_config.duplicate_policy = policy;
    }

    let queue: DelayedUniqueQueue<String> =
        DelayedUniqueQueue::from_config(&queue_config).context("failed to create queue")?;

    let wake = Arc::new(Notify::new());
    let waker = wake.clone();
    queue.add_event_listener(EventKind::Enqueue, move |_: &String| waker.notify_one());

    let signal = ShutdownRegistry::global().run_on_signal();
    tokio::pin!(signal);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    // Re-checks the exit condition when an expiry admitted nothing.
    let mut idle = tokio::time::interval(Duration::from_millis(250));

    info!(
        delay_ms = u64::try_from(queue.enqueue_delay().as_millis()).unwrap_or(u64::MAX),
        "reading stdin"
    );

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        let line = line.trim_end().to_string();
                        if !line.is_empty() {
                            debug!(line = %line, "submitted");
                            queue.submit(line, None);
                        }
                    }
                    None => {
                        stdin_open = false;
                        if args.flush_on_eof {
                            let flushed = queue.force_admit_pending();
                            info!(flushed, "stdin closed, flushed pending lines");
                        } else {
                            info!(pending = queue.pending_size(), "stdin closed, waiting for pending lines");
                        }
                    }
                }
            }
            _ = wake.notified() => {}
            _ = idle.tick(), if !stdin_open => {}
            hooks = &mut signal => {
                let hooks = hooks.context("failed to listen for shutdown signal")?;
                // The queue may not be registered globally; release it regardless.
                queue.close();
                info!(hooks, "shutdown requested, pending lines discarded");
                drain(&queue, args.json)?;
                break;
            }
        }

        drain(&queue, args.json)?;

        if !stdin_open && !queue.has_pending() {
            break;
        }
    }

    info!("hush exited cleanly");
    Ok(())
}

/// Print every admitted line, oldest first.
fn drain(queue: &DelayedUniqueQueue<String>, json: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(entry) = queue.dequeue() {
        writeln!(out, "{}", render(&entry, json, Utc::now()))?;
    }
    out.flush()?;
    Ok(())
}

/// Format one output line. `emitted_at` is when the line is written, which
/// trails its admission by up to one wake-up.
fn render(entry: &str, json: bool, emitted_at: DateTime<Utc>) -> String {
    if json {
        serde_json::json!({
            "entry": entry,
            "emitted_at": emitted_at.to_rfc3339(),
        })
        .to_string()
    } else {
        entry.to_string()
    }
}
