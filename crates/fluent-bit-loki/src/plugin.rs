// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Plugin lifecycle.
//!
//! Each instance moves through `Unregistered -> Active -> Stopped`:
//!
//! - [`Plugin::init`] resolves the configuration, builds the push client and
//!   registers the instance. Any failure leaves the registry untouched.
//! - [`Plugin::flush`] decodes a chunk and dispatches its records in order,
//!   stopping at the first decode fault or send failure.
//! - [`Plugin::exit`] stops every registered client exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use loki_client::{Client, ClientConfig, ClientError, PushClient};
use tracing::{debug, error, info, info_span, Span};

use crate::config::{Config, ConfigLookup};
use crate::decoder::Decoder;
use crate::dispatcher::{dispatch, Dispatch};
use crate::error::{FlushStatus, PluginError};
use crate::registry::Registry;
use crate::{logger, timestamp, VERSION};

pub const PLUGIN_NAME: &str = "loki";
pub const PLUGIN_DESCRIPTION: &str = "Ship fluent-bit logs to Grafana Loki";

/// What the plugin advertises to fluent-bit at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub name: &'static str,
    pub description: &'static str,
}

/// Builds the push client of a new instance.
pub trait ClientFactory: Send + Sync {
    fn create(&self, config: &ClientConfig) -> Result<Box<dyn PushClient>, ClientError>;
}

/// Creates real [`Client`]s talking to Loki over HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct LokiClientFactory;

impl ClientFactory for LokiClientFactory {
    fn create(&self, config: &ClientConfig) -> Result<Box<dyn PushClient>, ClientError> {
        Ok(Box::new(Client::new(config.clone())?))
    }
}

/// Running state of one instance.
pub struct PipelineState {
    config: Arc<Config>,
    span: Span,
    client: Box<dyn PushClient>,
    stopped: AtomicBool,
}

impl PipelineState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _entered = self.span.enter();
        info!("Stopping client");
        self.client.stop();
    }
}

/// Counts from one successful flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub sent: usize,
    pub skipped: usize,
}

pub struct Plugin {
    registry: Registry<PipelineState>,
    factory: Box<dyn ClientFactory>,
}

impl Default for Plugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin {
    #[must_use]
    pub fn new() -> Self {
        Self::with_client_factory(LokiClientFactory)
    }

    #[must_use]
    pub fn with_client_factory(factory: impl ClientFactory + 'static) -> Self {
        Self {
            registry: Registry::new(),
            factory: Box::new(factory),
        }
    }

    #[must_use]
    pub fn register() -> Registration {
        Registration {
            name: PLUGIN_NAME,
            description: PLUGIN_DESCRIPTION,
        }
    }

    pub fn init(&self, id: &str, lookup: &impl ConfigLookup) -> Result<(), PluginError> {
        let config = Config::resolve(lookup).map_err(|e| {
            error!("Failed to configure instance '{id}': {e}");
            PluginError::Config(e)
        })?;

        if self.registry.contains(id) {
            let e = PluginError::DuplicateInstance(id.to_string());
            error!("{e}");
            return Err(e);
        }

        logger::init(config.log_level);
        let span = info_span!("loki", id = %id);
        let _entered = span.enter();

        info!("Starting fluent-bit-loki, version {VERSION}");
        config.log_parameters(id);

        let client = self.factory.create(&config.client).map_err(|e| {
            error!("Failed to create client: {e}");
            PluginError::ClientInit(e)
        })?;

        let state = PipelineState {
            config: Arc::new(config),
            span: span.clone(),
            client,
            stopped: AtomicBool::new(false),
        };
        if let Err(e) = self.registry.register(id, state) {
            error!("{e}");
            return Err(e.into());
        }
        Ok(())
    }

    /// Decodes `data` and dispatches every record it holds, in order.
    pub fn flush(&self, id: &str, data: &[u8]) -> Result<FlushSummary, PluginError> {
        let state = self.registry.lookup(id).ok_or_else(|| {
            let e = PluginError::NotInitialized(id.to_string());
            error!("{e}");
            e
        })?;
        let _entered = state.span.enter();

        if state.is_stopped() {
            let e = PluginError::Stopped(id.to_string());
            error!("{e}");
            return Err(e);
        }

        let mut summary = FlushSummary::default();
        for entry in Decoder::new(data) {
            let entry = entry.map_err(|e| {
                error!(
                    "Failed to decode chunk after {} records: {e}",
                    summary.sent + summary.skipped
                );
                PluginError::Decode(e)
            })?;

            let timestamp = timestamp::normalize(&entry.timestamp);
            match dispatch(&state.config, state.client.as_ref(), timestamp, entry.record) {
                Ok(Dispatch::Sent) => summary.sent += 1,
                Ok(Dispatch::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!("Failed to send record: {e}");
                    return Err(PluginError::Send(e));
                }
            }
        }

        debug!(
            sent = summary.sent,
            skipped = summary.skipped,
            "Flushed chunk"
        );
        Ok(summary)
    }

    /// Runs [`Plugin::flush`] and maps the outcome to fluent-bit's status code.
    #[must_use]
    pub fn flush_status(&self, id: &str, data: &[u8]) -> FlushStatus {
        match self.flush(id, data) {
            Ok(_) => FlushStatus::Ok,
            Err(e) => {
                let policy = self
                    .registry
                    .lookup(id)
                    .map(|state| state.config.send_error_policy)
                    .unwrap_or_default();
                e.flush_status(policy)
            }
        }
    }

    /// Stops every registered client. Safe to call more than once.
    pub fn exit(&self) {
        self.registry.for_each(|_, state| state.stop());
    }

    #[must_use]
    pub fn instance(&self, id: &str) -> Option<Arc<PipelineState>> {
        self.registry.lookup(id)
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::decoder::DecodeError;
    use chrono::{DateTime, Utc};
    use loki_client::LabelSet;
    use rmpv::Value;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tracing_subscriber::filter::LevelFilter;

    type Pushed = Arc<Mutex<Vec<(LabelSet, DateTime<Utc>, String)>>>;

    #[derive(Default, Clone)]
    struct MockFactory {
        pushed: Pushed,
        stops: Arc<AtomicUsize>,
        created: Arc<AtomicUsize>,
        fail_send: bool,
        fail_create: bool,
    }

    struct MockClient {
        pushed: Pushed,
        stops: Arc<AtomicUsize>,
        fail_send: bool,
    }

    impl PushClient for MockClient {
        fn handle(
            &self,
            labels: LabelSet,
            timestamp: DateTime<Utc>,
            line: String,
        ) -> Result<(), ClientError> {
            if self.fail_send {
                return Err(ClientError::Stopped);
            }
            self.pushed.lock().unwrap().push((labels, timestamp, line));
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ClientFactory for MockFactory {
        fn create(&self, _config: &ClientConfig) -> Result<Box<dyn PushClient>, ClientError> {
            if self.fail_create {
                return Err(ClientError::Runtime(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "no threads",
                )));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockClient {
                pushed: Arc::clone(&self.pushed),
                stops: Arc::clone(&self.stops),
                fail_send: self.fail_send,
            }))
        }
    }

    fn properties(pairs: &[(&'static str, &'static str)]) -> HashMap<&'static str, &'static str> {
        let mut properties: HashMap<_, _> = pairs.iter().copied().collect();
        properties.entry("URL").or_insert("http://x");
        properties
    }

    fn chunk(events: &[(u64, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (ts, msg) in events {
            let event = Value::Array(vec![
                Value::from(*ts),
                Value::Map(vec![(Value::from("msg"), Value::from(*msg))]),
            ]);
            rmpv::encode::write_value(&mut buf, &event).unwrap();
        }
        buf
    }

    #[test]
    fn test_register_advertises_plugin() {
        let registration = Plugin::register();
        assert_eq!(registration.name, "loki");
        assert_eq!(registration.description, PLUGIN_DESCRIPTION);
    }

    #[test]
    fn test_init_without_url_leaves_registry_empty() {
        let factory = MockFactory::default();
        let plugin = Plugin::with_client_factory(factory.clone());

        let result = plugin.init("main", &HashMap::<&str, &str>::new());
        assert!(matches!(
            result,
            Err(PluginError::Config(ConfigError::Missing(_)))
        ));
        assert_eq!(plugin.instance_count(), 0);
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_init_keeps_first_instance() {
        let factory = MockFactory::default();
        let plugin = Plugin::with_client_factory(factory.clone());

        plugin
            .init("main", &properties(&[("LabelKeys", "first")]))
            .unwrap();
        let result = plugin.init("main", &properties(&[("LabelKeys", "second")]));

        assert!(matches!(result, Err(PluginError::DuplicateInstance(id)) if id == "main"));
        assert_eq!(plugin.instance_count(), 1);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        let state = plugin.instance("main").unwrap();
        assert_eq!(state.config().label_keys, vec!["first"]);
    }

    #[test]
    fn test_duplicate_init_does_not_raise_log_level() {
        let plugin = Plugin::with_client_factory(MockFactory::default());
        plugin
            .init("quiet", &properties(&[("LogLevel", "error")]))
            .unwrap();

        let result = plugin.init("quiet", &properties(&[("LogLevel", "trace")]));

        assert!(matches!(result, Err(PluginError::DuplicateInstance(_))));
        assert_ne!(logger::current_level(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_client_failure_aborts_init() {
        let plugin = Plugin::with_client_factory(MockFactory {
            fail_create: true,
            ..Default::default()
        });
        assert!(matches!(
            plugin.init("main", &properties(&[])),
            Err(PluginError::ClientInit(_))
        ));
        assert_eq!(plugin.instance_count(), 0);
    }

    #[test]
    fn test_flush_unknown_instance() {
        let plugin = Plugin::with_client_factory(MockFactory::default());
        assert!(matches!(
            plugin.flush("nope", &chunk(&[(1, "a")])),
            Err(PluginError::NotInitialized(_))
        ));
        assert_eq!(
            plugin.flush_status("nope", &chunk(&[(1, "a")])),
            FlushStatus::Error
        );
    }

    #[test]
    fn test_flush_dispatches_in_order() {
        let factory = MockFactory::default();
        let plugin = Plugin::with_client_factory(factory.clone());
        plugin.init("main", &properties(&[])).unwrap();

        let summary = plugin
            .flush("main", &chunk(&[(1_700_000_000, "hi"), (1_700_000_001, "there")]))
            .unwrap();
        assert_eq!(summary, FlushSummary { sent: 2, skipped: 0 });

        let pushed = factory.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 2);
        assert_eq!(pushed[0].1.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(pushed[0].2, "hi");
        assert_eq!(pushed[1].2, "there");
    }

    #[test]
    fn test_decode_fault_stops_after_valid_entries() {
        let factory = MockFactory::default();
        let plugin = Plugin::with_client_factory(factory.clone());
        plugin.init("main", &properties(&[])).unwrap();

        let mut data = chunk(&[(1, "a"), (2, "b"), (3, "c")]);
        data.truncate(data.len() - 1);

        let result = plugin.flush("main", &data);
        assert!(matches!(
            result,
            Err(PluginError::Decode(DecodeError::Truncated))
        ));
        assert_eq!(factory.pushed.lock().unwrap().len(), 2);
        assert_eq!(plugin.flush_status("main", &data), FlushStatus::Error);
    }

    #[test]
    fn test_send_error_status_follows_policy() {
        let plugin = Plugin::with_client_factory(MockFactory {
            fail_send: true,
            ..Default::default()
        });
        plugin.init("drop", &properties(&[])).unwrap();
        plugin
            .init("retry", &properties(&[("RetryOnSendError", "true")]))
            .unwrap();

        let data = chunk(&[(1, "a")]);
        assert_eq!(plugin.flush_status("drop", &data), FlushStatus::Error);
        assert_eq!(plugin.flush_status("retry", &data), FlushStatus::Retry);
    }

    #[test]
    fn test_empty_chunk_is_ok() {
        let plugin = Plugin::with_client_factory(MockFactory::default());
        plugin.init("main", &properties(&[])).unwrap();
        assert_eq!(plugin.flush_status("main", &[]), FlushStatus::Ok);
    }

    #[test]
    fn test_exit_stops_each_client_once() {
        let factory = MockFactory::default();
        let plugin = Plugin::with_client_factory(factory.clone());
        for id in ["a", "b", "c"] {
            plugin.init(id, &properties(&[])).unwrap();
        }

        plugin.exit();
        plugin.exit();

        assert_eq!(factory.stops.load(Ordering::SeqCst), 3);
        assert!(plugin.instance("a").unwrap().is_stopped());
        assert!(matches!(
            plugin.flush("a", &chunk(&[(1, "late")])),
            Err(PluginError::Stopped(_))
        ));
    }

    #[test]
    fn test_exit_without_instances() {
        let factory = MockFactory::default();
        let plugin = Plugin::with_client_factory(factory.clone());
        plugin.exit();
        assert_eq!(factory.stops.load(Ordering::SeqCst), 0);
    }
}
