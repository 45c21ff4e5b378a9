// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Push client for the Grafana Loki HTTP API.
//!
//! Entries are handed to a [`Client`] synchronously, grouped into streams by
//! label set, and pushed in batches by a background worker that retries
//! transient failures according to a [`RetryStrategy`].

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]

pub mod batch;
pub mod client;
pub mod constants;
pub mod error;
pub mod labels;
pub(crate) mod pusher;
pub mod retry;

pub use client::{Client, ClientConfig, PushClient};
pub use error::{ClientError, PushError};
pub use labels::{is_valid_label_name, LabelError, LabelSet};
pub use reqwest::Url;
pub use retry::RetryStrategy;
