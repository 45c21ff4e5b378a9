// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of fluent-bit chunks.
//!
//! A chunk is a concatenation of msgpack arrays, one per event. Two layouts
//! are accepted:
//!
//! ```text
//! [timestamp, {record}]                 fluent-bit 1.x
//! [[timestamp, {metadata}], {record}]   fluent-bit 2.x, metadata is discarded
//! ```
//!
//! [`Decoder`] yields entries lazily and stops for good after the first
//! fault. Entries yielded before the fault remain valid.

use std::io::{Cursor, ErrorKind};

use rmpv::Value;

use crate::record::{map_to_record, Record};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("chunk ends in the middle of an event")]
    Truncated,

    #[error("invalid msgpack data: {0}")]
    Malformed(#[source] rmpv::decode::Error),

    #[error("unexpected event layout: {0}")]
    UnexpectedLayout(String),
}

impl From<rmpv::decode::Error> for DecodeError {
    fn from(error: rmpv::decode::Error) -> Self {
        match error {
            rmpv::decode::Error::InvalidMarkerRead(ref io)
            | rmpv::decode::Error::InvalidDataRead(ref io)
                if io.kind() == ErrorKind::UnexpectedEof =>
            {
                DecodeError::Truncated
            }
            other => DecodeError::Malformed(other),
        }
    }
}

/// One event: the raw timestamp value and the record.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntry {
    pub timestamp: Value,
    pub record: Record,
}

/// Lazy iterator over the events of one chunk.
pub struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
    faulted: bool,
}

impl<'a> Decoder<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            faulted: false,
        }
    }

    fn is_exhausted(&self) -> bool {
        let len = self.cursor.get_ref().len() as u64;
        self.cursor.position() >= len
    }

    fn next_entry(&mut self) -> Result<DecodedEntry, DecodeError> {
        let value = rmpv::decode::read_value(&mut self.cursor)?;
        into_entry(value)
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<DecodedEntry, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.faulted || self.is_exhausted() {
            return None;
        }
        let entry = self.next_entry();
        if entry.is_err() {
            self.faulted = true;
        }
        Some(entry)
    }
}

fn into_entry(value: Value) -> Result<DecodedEntry, DecodeError> {
    let Value::Array(items) = value else {
        return Err(DecodeError::UnexpectedLayout(format!(
            "expected an array, got {}",
            kind(&value)
        )));
    };
    let [header, body]: [Value; 2] = items.try_into().map_err(|items: Vec<Value>| {
        DecodeError::UnexpectedLayout(format!("expected 2 elements, got {}", items.len()))
    })?;

    let timestamp = match header {
        Value::Array(header) => header.into_iter().next().ok_or_else(|| {
            DecodeError::UnexpectedLayout("empty event header".to_string())
        })?,
        other => other,
    };

    let Value::Map(entries) = body else {
        return Err(DecodeError::UnexpectedLayout(format!(
            "expected a map record, got {}",
            kind(&body)
        )));
    };

    Ok(DecodedEntry {
        timestamp,
        record: map_to_record(entries),
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "extension",
    }
}
