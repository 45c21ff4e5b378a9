// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors surfaced to callers of the push client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to start client runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("client is stopped")]
    Stopped,
}

/// Outcome of a single failed push request.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("{0}: server rejected push: {1}")]
    Rejected(StatusCode, String),

    #[error("{0}: server failed to accept push: {1}")]
    Unavailable(StatusCode, String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PushError {
    /// Server-side failures, throttling and transport errors are retried;
    /// any other rejection is permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            PushError::Rejected(..) => false,
            PushError::Unavailable(..) | PushError::Transport(_) => true,
        }
    }

    pub(crate) fn from_status(status: StatusCode, body: String) -> Self {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            PushError::Unavailable(status, body)
        } else {
            PushError::Rejected(status, body)
        }
    }
}
