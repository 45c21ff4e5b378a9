// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// How a failed push is retried before the batch is dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Retry up to N times without waiting.
    Immediate(u64),
    /// Retry up to N times, waiting a fixed number of milliseconds between attempts.
    LinearBackoff(u64, u64),
    /// Retry up to `max_retries` times, doubling the wait from `min` and capping it at `max`.
    ExponentialBackoff {
        max_retries: u64,
        min: Duration,
        max: Duration,
    },
}

impl RetryStrategy {
    #[must_use]
    pub fn max_retries(&self) -> u64 {
        match self {
            RetryStrategy::Immediate(retries) | RetryStrategy::LinearBackoff(retries, _) => {
                *retries
            }
            RetryStrategy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }

    /// Wait before retry number `attempt` (zero based).
    #[must_use]
    pub fn delay(&self, attempt: u64) -> Duration {
        match self {
            RetryStrategy::Immediate(_) => Duration::ZERO,
            RetryStrategy::LinearBackoff(_, delay_ms) => Duration::from_millis(*delay_ms),
            RetryStrategy::ExponentialBackoff { min, max, .. } => {
                let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
                let factor = 2u32.saturating_pow(exponent);
                min.saturating_mul(factor).min(*max)
            }
        }
    }
}
