// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns one record into a line for the push client.

use chrono::{DateTime, Utc};
use loki_client::{ClientError, LabelSet, PushClient};
use tracing::{debug, trace};

use crate::config::line_format::LineFormat;
use crate::config::Config;
use crate::record::{record_to_json, Record};

/// Outcome of dispatching a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The client accepted the line.
    Sent,
    /// Nothing was left to send once label and removed keys were stripped.
    Skipped,
}

/// Applies the label and key rules of `config` to `record` and hands the
/// resulting line to `client`.
pub fn dispatch(
    config: &Config,
    client: &dyn PushClient,
    timestamp: DateTime<Utc>,
    mut record: Record,
) -> Result<Dispatch, ClientError> {
    let labels = extract_labels(config, &record);

    for key in config.label_keys.iter().chain(&config.remove_keys) {
        record.remove(key);
    }

    if record.is_empty() {
        debug!("Skipping record with no remaining keys");
        return Ok(Dispatch::Skipped);
    }

    let line = format_line(config, &record);
    trace!("Dispatching line {line:?} with labels {labels}");
    client.handle(labels, timestamp, line)?;
    Ok(Dispatch::Sent)
}

fn extract_labels(config: &Config, record: &Record) -> LabelSet {
    let mut labels = LabelSet::new();
    if let Some(label_map) = &config.label_map {
        label_map.extract(record, &mut labels);
        return labels;
    }
    for key in &config.label_keys {
        let Some(value) = record.get(key) else {
            continue;
        };
        if let Err(e) = labels.insert(key.clone(), value.to_string()) {
            debug!("Skipping label from record: {e}");
        }
    }
    labels
}

fn format_line(config: &Config, record: &Record) -> String {
    if config.drop_single_key && record.len() == 1 {
        if let Some(value) = record.values().next() {
            return value.to_string();
        }
    }
    match config.line_format {
        LineFormat::Json => record_to_json(record).to_string(),
        LineFormat::KeyValue => record
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::label_map::LabelMap;
    use crate::record::RecordValue;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Push client that records every accepted entry.
    #[derive(Default)]
    struct RecordingClient {
        entries: Mutex<Vec<(LabelSet, DateTime<Utc>, String)>>,
        fail: bool,
    }

    impl PushClient for RecordingClient {
        fn handle(
            &self,
            labels: LabelSet,
            timestamp: DateTime<Utc>,
            line: String,
        ) -> Result<(), ClientError> {
            if self.fail {
                return Err(ClientError::Stopped);
            }
            self.entries.lock().unwrap().push((labels, timestamp, line));
            Ok(())
        }

        fn stop(&self) {}
    }

    fn config(pairs: &[(&'static str, &'static str)]) -> Config {
        let mut lookup: HashMap<&str, &str> = pairs.iter().copied().collect();
        lookup.insert("URL", "http://x");
        Config::resolve(&lookup).unwrap()
    }

    fn record(pairs: &[(&str, RecordValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_single_key_is_sent_raw() {
        let client = RecordingClient::default();
        let result = dispatch(
            &config(&[]),
            &client,
            ts(),
            record(&[("msg", RecordValue::from("hi"))]),
        );

        assert_eq!(result.unwrap(), Dispatch::Sent);
        let entries = client.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let (labels, timestamp, line) = &entries[0];
        assert!(labels.is_empty());
        assert_eq!(timestamp.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(line, "hi");
    }

    #[test]
    fn test_single_key_kept_when_drop_disabled() {
        let client = RecordingClient::default();
        dispatch(
            &config(&[("DropSingleKey", "false")]),
            &client,
            ts(),
            record(&[("msg", RecordValue::from("hi"))]),
        )
        .unwrap();
        assert_eq!(client.entries.lock().unwrap()[0].2, r#"{"msg":"hi"}"#);
    }

    #[test]
    fn test_label_keys_are_promoted_and_removed() {
        let client = RecordingClient::default();
        dispatch(
            &config(&[("LabelKeys", "container,missing"), ("RemoveKeys", "secret")]),
            &client,
            ts(),
            record(&[
                ("container", RecordValue::from("api")),
                ("secret", RecordValue::from("hunter2")),
                ("log", RecordValue::from("started")),
                ("level", RecordValue::from("info")),
            ]),
        )
        .unwrap();

        let entries = client.entries.lock().unwrap();
        let (labels, _, line) = &entries[0];
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("container"), Some("api"));
        assert_eq!(line, r#"{"level":"info","log":"started"}"#);
    }

    #[test]
    fn test_key_value_format_is_sorted() {
        let client = RecordingClient::default();
        dispatch(
            &config(&[("LineFormat", "key_value")]),
            &client,
            ts(),
            record(&[
                ("b", RecordValue::UInt(2)),
                ("a", RecordValue::from("one")),
                ("c", RecordValue::Bool(true)),
            ]),
        )
        .unwrap();
        assert_eq!(client.entries.lock().unwrap()[0].2, "a=one b=2 c=true");
    }

    #[test]
    fn test_empty_record_is_skipped() {
        let client = RecordingClient::default();
        let result = dispatch(
            &config(&[("RemoveKeys", "log")]),
            &client,
            ts(),
            record(&[("log", RecordValue::from("gone"))]),
        );
        assert_eq!(result.unwrap(), Dispatch::Skipped);
        assert!(client.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_label_names_are_skipped() {
        let client = RecordingClient::default();
        dispatch(
            &config(&[("LabelKeys", "app.name,app")]),
            &client,
            ts(),
            record(&[
                ("app.name", RecordValue::from("x")),
                ("app", RecordValue::from("y")),
                ("log", RecordValue::from("z")),
            ]),
        )
        .unwrap();

        let entries = client.entries.lock().unwrap();
        let (labels, _, line) = &entries[0];
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("app"), Some("y"));
        assert_eq!(line, "z");
    }

    #[test]
    fn test_label_map_takes_precedence_over_label_keys() {
        let mut config = config(&[("LabelKeys", "stream")]);
        config.label_map = Some(
            serde_json::from_str::<LabelMap>(r#"{"kubernetes": {"pod_name": "pod"}}"#).unwrap(),
        );

        let mut kubernetes = Record::new();
        kubernetes.insert("pod_name".to_string(), RecordValue::from("api-0"));

        let client = RecordingClient::default();
        dispatch(
            &config,
            &client,
            ts(),
            record(&[
                ("kubernetes", RecordValue::Map(kubernetes)),
                ("stream", RecordValue::from("stdout")),
                ("log", RecordValue::from("hello")),
            ]),
        )
        .unwrap();

        let entries = client.entries.lock().unwrap();
        let (labels, _, line) = &entries[0];
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("pod"), Some("api-0"));
        assert_eq!(line, r#"{"kubernetes":{"pod_name":"api-0"},"log":"hello"}"#);
    }

    #[test]
    fn test_client_failure_is_returned() {
        let client = RecordingClient {
            fail: true,
            ..Default::default()
        };
        let result = dispatch(
            &config(&[]),
            &client,
            ts(),
            record(&[("msg", RecordValue::from("hi"))]),
        );
        assert!(matches!(result, Err(ClientError::Stopped)));
    }
}
