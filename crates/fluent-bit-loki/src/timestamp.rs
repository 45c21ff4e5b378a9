// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use rmpv::Value;
use tracing::warn;

/// msgpack extension type fluent-bit uses for `EventTime`.
pub const EVENT_TIME_EXT_TYPE: i8 = 0;

/// Converts a decoded event timestamp to an instant.
///
/// In order of precedence:
/// 1. `EventTime` extension: seconds and nanoseconds, kept exactly.
/// 2. Unsigned integer: whole seconds since the Unix epoch.
/// 3. Anything else: a warning is logged and the current time is used.
#[must_use]
pub fn normalize(value: &Value) -> DateTime<Utc> {
    let normalized = match value {
        Value::Ext(EVENT_TIME_EXT_TYPE, data) => event_time(data),
        Value::Integer(i) => i
            .as_u64()
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    };

    normalized.unwrap_or_else(|| {
        warn!("timestamp isn't known format, using current time: {value}");
        Utc::now()
    })
}

/// Decodes the 8-byte `EventTime` payload: big-endian u32 seconds then u32 nanoseconds.
fn event_time(data: &[u8]) -> Option<DateTime<Utc>> {
    let bytes: &[u8; 8] = data.try_into().ok()?;
    let [s0, s1, s2, s3, n0, n1, n2, n3] = *bytes;
    let secs = u32::from_be_bytes([s0, s1, s2, s3]);
    let nanos = u32::from_be_bytes([n0, n1, n2, n3]);
    DateTime::from_timestamp(i64::from(secs), nanos)
}
