// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP delivery of encoded batches with retry.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use tracing::{debug, error, warn};

use crate::batch::Batch;
use crate::client::ClientConfig;
use crate::constants;
use crate::error::{ClientError, PushError};
use crate::retry::RetryStrategy;

#[derive(Debug, Clone)]
pub(crate) struct Pusher {
    http: reqwest::Client,
    url: Url,
    tenant_id: Option<String>,
    retry_strategy: RetryStrategy,
}

impl Pusher {
    pub(crate) fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .tcp_keepalive(Some(Duration::from_secs(120)))
            .build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            tenant_id: config.tenant_id.clone(),
            retry_strategy: config.retry_strategy.clone(),
        })
    }

    /// Pushes a batch, retrying per the configured strategy.
    ///
    /// Failures are logged; the batch is dropped once retries are exhausted
    /// or the server rejects it permanently.
    pub(crate) async fn push_batch(&self, batch: Batch) {
        let entries = batch.entry_count();
        let body = match batch.encode() {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode batch of {entries} entries: {e}");
                return;
            }
        };

        let mut attempt = 0;
        loop {
            match self.send(body.clone()).await {
                Ok(()) => {
                    debug!(
                        "Pushed {entries} entries in {} streams",
                        batch.stream_count()
                    );
                    return;
                }
                Err(e) if e.is_retryable() && attempt < self.retry_strategy.max_retries() => {
                    let delay = self.retry_strategy.delay(attempt);
                    attempt += 1;
                    warn!(
                        "Error sending batch, will retry: {e} attempt={attempt} delay_ms={}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("Final error sending batch of {entries} entries: {e}");
                    return;
                }
            }
        }
    }

    async fn send(&self, body: Vec<u8>) -> Result<(), PushError> {
        let mut request = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, constants::USER_AGENT)
            .body(body);
        if let Some(tenant_id) = &self.tenant_id {
            request = request.header(constants::TENANT_HEADER, tenant_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(PushError::from_status(status, text))
    }
}
