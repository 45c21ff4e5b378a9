// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory batch of log entries grouped into streams.
//!
//! Entries sharing an identical label set end up in the same stream. The
//! batch tracks the number of line bytes it holds so the client can cut it
//! once the configured batch size would be exceeded.
//!
//! The encoded form is the JSON body accepted by Loki's push endpoint:
//!
//! ```text
//! {"streams":[{"stream":{"job":"fluent-bit"},"values":[["1700000000000000000","hi"]]}]}
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::labels::LabelSet;

/// One log line waiting to be pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub labels: LabelSet,
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    streams: Vec<PushStream<'a>>,
}

#[derive(Serialize)]
struct PushStream<'a> {
    stream: &'a LabelSet,
    values: Vec<[String; 2]>,
}

#[derive(Debug)]
pub(crate) struct Batch {
    streams: BTreeMap<LabelSet, Vec<(DateTime<Utc>, String)>>,
    bytes: usize,
    entries: usize,
    /// Arrival of the first entry; `None` while the batch is empty.
    started: Option<Instant>,
}

impl Batch {
    pub(crate) fn new() -> Self {
        Self {
            streams: BTreeMap::new(),
            bytes: 0,
            entries: 0,
            started: None,
        }
    }

    pub(crate) fn add(&mut self, entry: Entry) {
        self.started.get_or_insert_with(Instant::now);
        self.bytes += entry.line.len();
        self.entries += 1;
        self.streams
            .entry(entry.labels)
            .or_default()
            .push((entry.timestamp, entry.line));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Total size of all lines in the batch, in bytes.
    pub(crate) fn size_bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.entries
    }

    pub(crate) fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Time since the first entry was added. Zero for an empty batch.
    pub(crate) fn age(&self) -> Duration {
        self.started.map_or(Duration::ZERO, |started| started.elapsed())
    }

    /// Encodes the batch as a Loki JSON push request body.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let request = PushRequest {
            streams: self
                .streams
                .iter()
                .map(|(labels, values)| PushStream {
                    stream: labels,
                    values: values
                        .iter()
                        .map(|(ts, line)| [unix_nanos(ts), line.clone()])
                        .collect(),
                })
                .collect(),
        };
        serde_json::to_vec(&request)
    }
}

/// Renders a timestamp as nanoseconds since the Unix epoch.
///
/// Computed in `i128` so instants outside the `i64` nanosecond range still
/// render instead of collapsing to zero.
fn unix_nanos(ts: &DateTime<Utc>) -> String {
    let nanos =
        i128::from(ts.timestamp()) * 1_000_000_000 + i128::from(ts.timestamp_subsec_nanos());
    nanos.to_string()
}
