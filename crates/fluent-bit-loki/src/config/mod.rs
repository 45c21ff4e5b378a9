// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Plugin configuration.
//!
//! fluent-bit hands each output instance a set of string properties. The
//! [`Config::resolve`] function turns a lookup over those properties into a
//! validated, immutable [`Config`]. Property names are case-insensitive and an
//! empty value means "not set".
//!
//! # Keys
//!
//! | Key                | Default                 |
//! |--------------------|-------------------------|
//! | `URL`              | required                |
//! | `TenantID`         | none                    |
//! | `BatchWait`        | `1s`                    |
//! | `BatchSize`        | `102400`                |
//! | `Labels`           | `{job="fluent-bit"}`    |
//! | `LabelKeys`        | none                    |
//! | `RemoveKeys`       | none                    |
//! | `LineFormat`       | `json`                  |
//! | `DropSingleKey`    | `true`                  |
//! | `LabelMapPath`     | none                    |
//! | `LogLevel`         | `info`                  |
//! | `Timeout`          | `10s`                   |
//! | `MinBackoff`       | `500ms`                 |
//! | `MaxBackoff`       | `5m`                    |
//! | `MaxRetries`       | `10`                    |
//! | `RetryOnSendError` | `false`                 |

pub(crate) mod duration;
pub mod label_map;
pub mod line_format;
pub mod log_level;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use loki_client::{constants as client_defaults, ClientConfig, LabelSet, RetryStrategy, Url};
use tracing::info;

use self::duration::parse_duration;
use self::label_map::LabelMap;
use self::line_format::LineFormat;
use self::log_level::LogLevel;

pub const KEY_ID: &str = "id";
pub const KEY_URL: &str = "URL";
pub const KEY_TENANT_ID: &str = "TenantID";
pub const KEY_BATCH_WAIT: &str = "BatchWait";
pub const KEY_BATCH_SIZE: &str = "BatchSize";
pub const KEY_LABELS: &str = "Labels";
pub const KEY_LABEL_KEYS: &str = "LabelKeys";
pub const KEY_REMOVE_KEYS: &str = "RemoveKeys";
pub const KEY_LINE_FORMAT: &str = "LineFormat";
pub const KEY_DROP_SINGLE_KEY: &str = "DropSingleKey";
pub const KEY_LABEL_MAP_PATH: &str = "LabelMapPath";
pub const KEY_LOG_LEVEL: &str = "LogLevel";
pub const KEY_TIMEOUT: &str = "Timeout";
pub const KEY_MIN_BACKOFF: &str = "MinBackoff";
pub const KEY_MAX_BACKOFF: &str = "MaxBackoff";
pub const KEY_MAX_RETRIES: &str = "MaxRetries";
pub const KEY_RETRY_ON_SEND_ERROR: &str = "RetryOnSendError";

pub const DEFAULT_LABELS: &str = r#"{job="fluent-bit"}"#;

/// Errors produced while resolving the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required key '{0}'")]
    Missing(&'static str),

    #[error("invalid value '{value}' for key '{key}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read label map file '{path}': {source}")]
    LabelMapRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse label map file '{path}': {source}")]
    LabelMapParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Key/value lookup provided by the host.
///
/// Returns an empty string when the key is not set.
pub trait ConfigLookup {
    fn get(&self, key: &str) -> String;
}

impl<F> ConfigLookup for F
where
    F: Fn(&str) -> String,
{
    fn get(&self, key: &str) -> String {
        self(key)
    }
}

/// Case-insensitive lookup, matching how fluent-bit treats property names.
impl ConfigLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> String {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }
}

impl ConfigLookup for HashMap<&str, &str> {
    fn get(&self, key: &str) -> String {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| (*v).to_string())
            .unwrap_or_default()
    }
}

/// What a failed send reports to fluent-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SendErrorPolicy {
    /// Drop the chunk: fluent-bit will not retry it.
    #[default]
    Unrecoverable,
    /// Ask fluent-bit to retry the chunk later.
    Retryable,
}

/// Resolved configuration of one plugin instance. Never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub client: ClientConfig,
    pub label_keys: Vec<String>,
    pub remove_keys: Vec<String>,
    pub line_format: LineFormat,
    pub drop_single_key: bool,
    pub label_map_path: Option<PathBuf>,
    pub label_map: Option<LabelMap>,
    pub log_level: LogLevel,
    pub send_error_policy: SendErrorPolicy,
}

impl Config {
    /// Builds a validated configuration from the host's properties.
    ///
    /// The only I/O performed is reading the label map file, if one is set.
    pub fn resolve(lookup: &impl ConfigLookup) -> Result<Self, ConfigError> {
        let url_value = lookup.get(KEY_URL);
        let url_value = url_value.trim();
        if url_value.is_empty() {
            return Err(ConfigError::Missing(KEY_URL));
        }
        let url = Url::parse(url_value).map_err(|e| ConfigError::invalid(KEY_URL, url_value, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                KEY_URL,
                url_value,
                "scheme must be http or https",
            ));
        }

        let mut client = ClientConfig::new(url);

        let tenant_id = lookup.get(KEY_TENANT_ID);
        if !tenant_id.trim().is_empty() {
            client.tenant_id = Some(tenant_id.trim().to_string());
        }

        if let Some(batch_wait) = optional_duration(lookup, KEY_BATCH_WAIT)? {
            if batch_wait.is_zero() {
                return Err(ConfigError::invalid(
                    KEY_BATCH_WAIT,
                    &lookup.get(KEY_BATCH_WAIT),
                    "must be greater than zero",
                ));
            }
            client.batch_wait = batch_wait;
        }

        if let Some(batch_size) = optional_number::<usize>(lookup, KEY_BATCH_SIZE)? {
            if batch_size == 0 {
                return Err(ConfigError::invalid(
                    KEY_BATCH_SIZE,
                    "0",
                    "must be greater than zero",
                ));
            }
            client.batch_size = batch_size;
        }

        let labels = non_empty(lookup, KEY_LABELS).unwrap_or_else(|| DEFAULT_LABELS.to_string());
        client.external_labels = labels
            .parse::<LabelSet>()
            .map_err(|e| ConfigError::invalid(KEY_LABELS, &labels, e))?;

        if let Some(timeout) = optional_duration(lookup, KEY_TIMEOUT)? {
            client.timeout = timeout;
        }

        let min_backoff = optional_duration(lookup, KEY_MIN_BACKOFF)?
            .unwrap_or(client_defaults::DEFAULT_MIN_BACKOFF);
        let max_backoff = optional_duration(lookup, KEY_MAX_BACKOFF)?
            .unwrap_or(client_defaults::DEFAULT_MAX_BACKOFF);
        if min_backoff > max_backoff {
            return Err(ConfigError::invalid(
                KEY_MIN_BACKOFF,
                &lookup.get(KEY_MIN_BACKOFF),
                format!("must not exceed {KEY_MAX_BACKOFF}"),
            ));
        }
        let max_retries = optional_number::<u64>(lookup, KEY_MAX_RETRIES)?
            .unwrap_or(client_defaults::DEFAULT_MAX_RETRIES);
        client.retry_strategy = RetryStrategy::ExponentialBackoff {
            max_retries,
            min: min_backoff,
            max: max_backoff,
        };

        let log_level = match non_empty(lookup, KEY_LOG_LEVEL) {
            Some(value) => value
                .parse::<LogLevel>()
                .map_err(|e| ConfigError::invalid(KEY_LOG_LEVEL, &value, e))?,
            None => LogLevel::default(),
        };

        let line_format = match non_empty(lookup, KEY_LINE_FORMAT) {
            Some(value) => value
                .parse::<LineFormat>()
                .map_err(|e| ConfigError::invalid(KEY_LINE_FORMAT, &value, e))?,
            None => LineFormat::default(),
        };

        let drop_single_key = optional_bool(lookup, KEY_DROP_SINGLE_KEY)?.unwrap_or(true);

        let send_error_policy = if optional_bool(lookup, KEY_RETRY_ON_SEND_ERROR)?.unwrap_or(false)
        {
            SendErrorPolicy::Retryable
        } else {
            SendErrorPolicy::Unrecoverable
        };

        let label_map_path = non_empty(lookup, KEY_LABEL_MAP_PATH).map(PathBuf::from);
        let label_map = label_map_path
            .as_deref()
            .map(LabelMap::from_file)
            .transpose()?;

        Ok(Config {
            client,
            label_keys: split_list(&lookup.get(KEY_LABEL_KEYS)),
            remove_keys: split_list(&lookup.get(KEY_REMOVE_KEYS)),
            line_format,
            drop_single_key,
            label_map_path,
            label_map,
            log_level,
            send_error_policy,
        })
    }

    /// Logs every resolved parameter at info level.
    pub fn log_parameters(&self, id: &str) {
        info!("provided parameter URL={}", self.client.url);
        info!("provided parameter ID={id}");
        info!(
            "provided parameter TenantID={}",
            self.client.tenant_id.as_deref().unwrap_or("")
        );
        info!("provided parameter BatchWait={:?}", self.client.batch_wait);
        info!("provided parameter BatchSize={}", self.client.batch_size);
        info!("provided parameter Labels={}", self.client.external_labels);
        info!("provided parameter LogLevel={}", self.log_level.as_ref());
        info!("provided parameter RemoveKeys={:?}", self.remove_keys);
        info!("provided parameter LabelKeys={:?}", self.label_keys);
        info!("provided parameter LineFormat={}", self.line_format);
        info!("provided parameter DropSingleKey={}", self.drop_single_key);
        info!("provided parameter LabelMapPath={:?}", self.label_map_path);
        info!("provided parameter Timeout={:?}", self.client.timeout);
        info!(
            "provided parameter RetryStrategy={:?}",
            self.client.retry_strategy
        );
        info!(
            "provided parameter SendErrorPolicy={:?}",
            self.send_error_policy
        );
    }
}

fn non_empty(lookup: &impl ConfigLookup, key: &str) -> Option<String> {
    let value = lookup.get(key);
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn optional_duration(
    lookup: &impl ConfigLookup,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    non_empty(lookup, key)
        .map(|value| parse_duration(&value).map_err(|e| ConfigError::invalid(key, &value, e)))
        .transpose()
}

fn optional_number<T>(
    lookup: &impl ConfigLookup,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    non_empty(lookup, key)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|e| ConfigError::invalid(key, &value, e))
        })
        .transpose()
}

/// Parse a boolean property.
///
/// Accepts common truthy/falsy strings (case insensitive) including numeric forms.
fn optional_bool(
    lookup: &impl ConfigLookup,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    let Some(value) = non_empty(lookup, key) else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "n" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::invalid(key, &value, "expected a boolean")),
    }
}

/// Splits a comma-separated list, trimming entries and skipping empty ones.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
