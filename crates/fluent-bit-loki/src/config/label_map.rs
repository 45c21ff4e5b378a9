//! Label map files.
//!
//! A label map mirrors the shape of the records and names, at each leaf, the
//! label a record value is promoted to:
//!
//! ```json
//! {
//!   "kubernetes": {
//!     "namespace_name": "namespace",
//!     "labels": { "component": "component" }
//!   },
//!   "stream": "stream"
//! }
//! ```
//!
//! With this map a record `{"stream": "stderr", "kubernetes": {"namespace_name": "prod"}}`
//! yields the labels `{namespace="prod", stream="stderr"}`.

use std::collections::BTreeMap;
use std::path::Path;

use loki_client::LabelSet;
use serde::Deserialize;
use tracing::debug;

use crate::config::ConfigError;
use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LabelMapping {
    /// Promote the record value to a label with this name.
    Label(String),
    /// Descend into a nested record.
    Nested(LabelMap),
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct LabelMap(BTreeMap<String, LabelMapping>);

impl LabelMap {
    /// Reads and parses a label map file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read(path).map_err(|source| ConfigError::LabelMapRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&content).map_err(|source| ConfigError::LabelMapParse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Walks `record` alongside the map and adds every mapped value to `labels`.
    ///
    /// Missing fields are ignored, as are values whose mapped label name is
    /// not a valid label name.
    pub fn extract(&self, record: &Record, labels: &mut LabelSet) {
        for (key, mapping) in &self.0 {
            let Some(value) = record.get(key) else {
                continue;
            };
            match mapping {
                LabelMapping::Nested(next) => {
                    if let Some(nested) = value.as_map() {
                        next.extract(nested, labels);
                    }
                }
                LabelMapping::Label(name) => {
                    if let Err(e) = labels.insert(name.clone(), value.to_string()) {
                        debug!("Skipping label from label map: {e}");
                    }
                }
            }
        }
    }
}
