// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Untyped record content as delivered by fluent-bit.
//!
//! A record is a mapping from field name to [`RecordValue`]. Conversion to
//! text is explicit and total:
//!
//! | Value        | Text form                  | JSON form        |
//! |--------------|----------------------------|------------------|
//! | `Null`       | `null`                     | `null`           |
//! | `Bool`       | `true` / `false`           | boolean          |
//! | `Int/UInt`   | decimal                    | number           |
//! | `Float`      | decimal                    | number, or `null` if not finite |
//! | `String`     | verbatim                   | string           |
//! | `Bytes`      | UTF-8, lossy               | string (lossy)   |
//! | `Array/Map`  | compact JSON               | array / object   |

use std::collections::BTreeMap;
use std::fmt;

use rmpv::Value;
use serde_json::Value as JsonValue;

/// A decoded record. Keys are kept sorted so rendering is deterministic.
pub type Record = BTreeMap<String, RecordValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<RecordValue>),
    Map(Record),
}

impl RecordValue {
    #[must_use]
    pub fn as_map(&self) -> Option<&Record> {
        match self {
            RecordValue::Map(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RecordValue::Null => JsonValue::Null,
            RecordValue::Bool(b) => JsonValue::Bool(*b),
            RecordValue::Int(i) => JsonValue::from(*i),
            RecordValue::UInt(u) => JsonValue::from(*u),
            RecordValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            RecordValue::String(s) => JsonValue::String(s.clone()),
            RecordValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
            RecordValue::Array(items) => {
                JsonValue::Array(items.iter().map(RecordValue::to_json).collect())
            }
            RecordValue::Map(map) => record_to_json(map),
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Null => write!(f, "null"),
            RecordValue::Bool(b) => write!(f, "{b}"),
            RecordValue::Int(i) => write!(f, "{i}"),
            RecordValue::UInt(u) => write!(f, "{u}"),
            RecordValue::Float(x) => write!(f, "{x}"),
            RecordValue::String(s) => write!(f, "{s}"),
            RecordValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            RecordValue::Array(_) | RecordValue::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::String(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::String(s)
    }
}

impl From<Value> for RecordValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Nil => RecordValue::Null,
            Value::Boolean(b) => RecordValue::Bool(b),
            Value::Integer(i) => match (i.as_u64(), i.as_i64()) {
                (Some(u), _) => RecordValue::UInt(u),
                (None, Some(s)) => RecordValue::Int(s),
                // rmpv integers are always representable as u64 or i64.
                (None, None) => RecordValue::Null,
            },
            Value::F32(f) => RecordValue::Float(f64::from(f)),
            Value::F64(f) => RecordValue::Float(f),
            Value::String(s) if s.is_str() => RecordValue::String(s.into_str().unwrap_or_default()),
            // Invalid UTF-8 in a str field is kept as raw bytes.
            Value::String(s) => RecordValue::Bytes(s.into_bytes()),
            Value::Binary(b) => RecordValue::Bytes(b),
            Value::Array(items) => {
                RecordValue::Array(items.into_iter().map(RecordValue::from).collect())
            }
            Value::Map(entries) => RecordValue::Map(map_to_record(entries)),
            Value::Ext(_, data) => RecordValue::Bytes(data),
        }
    }
}

/// Converts a msgpack map into a record.
///
/// String and binary keys are read as (lossy) UTF-8; any other key type is
/// skipped together with its value.
#[must_use]
pub fn map_to_record(entries: Vec<(Value, Value)>) -> Record {
    let mut record = Record::new();
    for (key, value) in entries {
        let key = match key {
            Value::String(s) => String::from_utf8_lossy(&s.into_bytes()).into_owned(),
            Value::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
            _ => continue,
        };
        record.insert(key, RecordValue::from(value));
    }
    record
}

#[must_use]
pub fn record_to_json(record: &Record) -> JsonValue {
    JsonValue::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}
