// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! fluent-bit output plugin for Grafana Loki.
//!
//! fluent-bit hands the plugin chunks of msgpack-encoded `(timestamp, record)`
//! events. Each chunk flows through:
//!
//! ```text
//! chunk ─> Decoder ─> timestamp::normalize ─> dispatcher ─> loki_client::Client ─> Loki
//! ```
//!
//! [`plugin::Plugin`] owns the instance registry and drives the lifecycle;
//! [`ffi`] exposes it to fluent-bit through a C ABI.

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]

pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod ffi;
pub mod logger;
pub mod plugin;
pub mod record;
pub mod registry;
pub mod timestamp;

pub use error::{FlushStatus, PluginError};
pub use plugin::Plugin;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
