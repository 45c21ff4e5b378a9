// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching push client.
//!
//! The client follows an actor layout: callers hold the [`Client`] and send
//! entries over a bounded channel, while a single worker task owns the
//! current batch and the HTTP pusher. While the worker is busy pushing or
//! retrying, a full channel blocks [`PushClient::handle`], so a stalled Loki
//! turns into backpressure on the caller instead of unbounded memory growth.
//!
//! ```text
//!    handle() ──> channel ──> worker task ──> Batch ──> Pusher ──> Loki
//!                                 │
//!                          ticker (batch age)
//! ```
//!
//! The worker runs on a small runtime owned by the client so callers can stay
//! fully synchronous. A batch is pushed when adding the next line would exceed
//! `batch_size` bytes, when its first entry is older than `batch_wait`, or on
//! [`Client::stop`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::batch::{Batch, Entry};
use crate::constants;
use crate::error::ClientError;
use crate::labels::LabelSet;
use crate::pusher::Pusher;
use crate::retry::RetryStrategy;

/// Anything that accepts log lines for delivery to Loki.
///
/// Acceptance only means the entry was enqueued; delivery, batching and
/// retries are up to the implementation.
pub trait PushClient: Send + Sync {
    /// Enqueues one line with its labels and timestamp. May block while the
    /// queue is full.
    fn handle(
        &self,
        labels: LabelSet,
        timestamp: DateTime<Utc>,
        line: String,
    ) -> Result<(), ClientError>;

    /// Flushes pending entries and releases resources. Calling it again is a no-op.
    fn stop(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Push endpoint, e.g. `http://localhost:3100/loki/api/v1/push`.
    pub url: Url,
    pub tenant_id: Option<String>,
    pub batch_wait: Duration,
    pub batch_size: usize,
    /// Labels attached to every entry. Per-entry labels take precedence.
    pub external_labels: LabelSet,
    pub timeout: Duration,
    pub retry_strategy: RetryStrategy,
    /// Entries buffered ahead of the worker. Clamped to at least one.
    pub queue_capacity: usize,
}

impl ClientConfig {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            tenant_id: None,
            batch_wait: constants::DEFAULT_BATCH_WAIT,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            external_labels: LabelSet::new(),
            timeout: constants::DEFAULT_TIMEOUT,
            retry_strategy: RetryStrategy::ExponentialBackoff {
                max_retries: constants::DEFAULT_MAX_RETRIES,
                min: constants::DEFAULT_MIN_BACKOFF,
                max: constants::DEFAULT_MAX_BACKOFF,
            },
            queue_capacity: constants::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug)]
enum Command {
    Push(Entry),
    Shutdown,
}

struct Worker {
    runtime: Runtime,
    task: JoinHandle<()>,
}

/// HTTP push client backed by a background batching worker.
pub struct Client {
    tx: mpsc::Sender<Command>,
    external_labels: LabelSet,
    worker: Mutex<Option<Worker>>,
}

impl Client {
    /// Builds the HTTP client and starts the batching worker.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("loki-client")
            .enable_all()
            .build()?;

        let pusher = Pusher::new(&config)?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let task = runtime.spawn(run(rx, pusher, config.batch_wait, config.batch_size));

        Ok(Self {
            tx,
            external_labels: config.external_labels,
            worker: Mutex::new(Some(Worker { runtime, task })),
        })
    }
}

impl PushClient for Client {
    fn handle(
        &self,
        labels: LabelSet,
        timestamp: DateTime<Utc>,
        line: String,
    ) -> Result<(), ClientError> {
        let entry = Entry {
            labels: self.external_labels.merge(&labels),
            timestamp,
            line,
        };
        self.tx
            .blocking_send(Command::Push(entry))
            .map_err(|_| ClientError::Stopped)
    }

    /// Drains the pending batch and joins the worker.
    ///
    /// Blocks the calling thread; neither this nor `handle` may be called from
    /// inside an async runtime.
    fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Worker { runtime, task }) = worker else {
            return;
        };

        // The worker may already be gone if it panicked.
        let _ = self.tx.blocking_send(Command::Shutdown);
        if let Err(e) = runtime.block_on(task) {
            error!("Loki client worker did not shut down cleanly: {e}");
        }
        runtime.shutdown_timeout(Duration::from_secs(1));
    }
}

fn max_wait_check_frequency(batch_wait: Duration) -> Duration {
    (batch_wait / 10).max(constants::MIN_WAIT_CHECK_FREQUENCY)
}

async fn run(
    mut rx: mpsc::Receiver<Command>,
    pusher: Pusher,
    batch_wait: Duration,
    batch_size: usize,
) {
    let mut batch = Batch::new();
    let mut ticker = tokio::time::interval(max_wait_check_frequency(batch_wait));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Push(entry)) => {
                    if !batch.is_empty() && batch.size_bytes() + entry.line.len() > batch_size {
                        pusher.push_batch(std::mem::replace(&mut batch, Batch::new())).await;
                    }
                    batch.add(entry);
                }
                Some(Command::Shutdown) | None => {
                    if !batch.is_empty() {
                        pusher.push_batch(batch).await;
                    }
                    debug!("Loki client worker stopped");
                    return;
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() && batch.age() >= batch_wait {
                    pusher.push_batch(std::mem::replace(&mut batch, Batch::new())).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let url = Url::parse("http://localhost:3100/loki/api/v1/push").unwrap();
        let config = ClientConfig::new(url);
        assert_eq!(config.batch_wait, Duration::from_secs(1));
        assert_eq!(config.batch_size, 102_400);
        assert_eq!(config.tenant_id, None);
        assert!(config.external_labels.is_empty());
        assert_eq!(config.retry_strategy.max_retries(), 10);
        assert_eq!(config.queue_capacity, 1024);
    }

    #[test]
    fn test_max_wait_check_frequency() {
        assert_eq!(
            max_wait_check_frequency(Duration::from_secs(1)),
            Duration::from_millis(100)
        );
        assert_eq!(
            max_wait_check_frequency(Duration::from_millis(20)),
            Duration::from_millis(10)
        );
        assert_eq!(
            max_wait_check_frequency(Duration::ZERO),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn test_handle_after_stop_fails() {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:1/loki/api/v1/push").unwrap());
        let client = Client::new(config).unwrap();
        client.stop();
        let result = client.handle(LabelSet::new(), Utc::now(), "late".to_string());
        assert!(matches!(result, Err(ClientError::Stopped)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:1/loki/api/v1/push").unwrap());
        let client = Client::new(config).unwrap();
        client.stop();
        client.stop();
    }
}
