// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use loki_client::ClientError;

use crate::config::{ConfigError, SendErrorPolicy};
use crate::decoder::DecodeError;
use crate::registry::RegistryError;

/// Status codes understood by fluent-bit's output plugin interface.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlushStatus {
    /// Unrecoverable; the chunk is dropped.
    Error = 0,
    Ok = 1,
    /// Transient; fluent-bit resubmits the chunk later.
    Retry = 2,
}

impl FlushStatus {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("plugin already initialized before, please set unique plugin ID: {0}")]
    DuplicateInstance(String),

    #[error("plugin instance '{0}' is not initialized")]
    NotInitialized(String),

    #[error("plugin instance '{0}' is stopped")]
    Stopped(String),

    #[error("failed to decode record: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to send record: {0}")]
    Send(#[source] ClientError),

    #[error("failed to create client: {0}")]
    ClientInit(#[source] ClientError),
}

impl From<RegistryError> for PluginError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::AlreadyRegistered(id) => PluginError::DuplicateInstance(id),
        }
    }
}

impl PluginError {
    /// Maps an error to the status reported to fluent-bit.
    ///
    /// Only send failures consult the policy; everything else is unrecoverable.
    #[must_use]
    pub fn flush_status(&self, policy: SendErrorPolicy) -> FlushStatus {
        match self {
            PluginError::Send(_) => match policy {
                SendErrorPolicy::Retryable => FlushStatus::Retry,
                SendErrorPolicy::Unrecoverable => FlushStatus::Error,
            },
            PluginError::Config(_)
            | PluginError::DuplicateInstance(_)
            | PluginError::NotInitialized(_)
            | PluginError::Stopped(_)
            | PluginError::Decode(_)
            | PluginError::ClientInit(_) => FlushStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_fluent_bit() {
        assert_eq!(FlushStatus::Error.code(), 0);
        assert_eq!(FlushStatus::Ok.code(), 1);
        assert_eq!(FlushStatus::Retry.code(), 2);
    }

    #[test]
    fn test_send_error_follows_policy() {
        let error = PluginError::Send(ClientError::Stopped);
        assert_eq!(
            error.flush_status(SendErrorPolicy::Unrecoverable),
            FlushStatus::Error
        );
        assert_eq!(
            error.flush_status(SendErrorPolicy::Retryable),
            FlushStatus::Retry
        );
    }

    #[test]
    fn test_other_errors_are_unrecoverable() {
        let errors = [
            PluginError::Config(ConfigError::Missing("URL")),
            PluginError::DuplicateInstance("a".to_string()),
            PluginError::NotInitialized("a".to_string()),
            PluginError::Stopped("a".to_string()),
            PluginError::Decode(DecodeError::Truncated),
        ];
        for error in errors {
            assert_eq!(
                error.flush_status(SendErrorPolicy::Retryable),
                FlushStatus::Error,
                "{error}"
            );
        }
    }

    #[test]
    fn test_duplicate_message() {
        let error = PluginError::from(RegistryError::AlreadyRegistered("main".to_string()));
        assert_eq!(
            error.to_string(),
            "plugin already initialized before, please set unique plugin ID: main"
        );
    }
}
