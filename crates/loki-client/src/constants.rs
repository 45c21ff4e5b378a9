// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client defaults.

use std::time::Duration;

/// Maximum age of a batch before it is pushed.
pub const DEFAULT_BATCH_WAIT: Duration = Duration::from_secs(1);

/// Line bytes a batch may accumulate before it is pushed.
pub const DEFAULT_BATCH_SIZE: usize = 100 * 1024;

/// Timeout for a single push request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_RETRIES: u64 = 10;

/// Entries that may wait for the worker before `handle` blocks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Lower bound for how often the worker checks batch age.
pub(crate) const MIN_WAIT_CHECK_FREQUENCY: Duration = Duration::from_millis(10);

/// Header carrying the tenant for multi-tenant Loki deployments.
pub const TENANT_HEADER: &str = "X-Scope-OrgID";

pub(crate) const USER_AGENT: &str = concat!("loki-client/", env!("CARGO_PKG_VERSION"));
