// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Loki stream label sets.
//!
//! A label set is an ordered mapping from label name to label value. Ordering
//! matters because the rendered form of a label set is used as the stream key
//! when entries are grouped into a push request.
//!
//! # Text format
//!
//! Label sets use the Prometheus selector notation:
//!
//! ```text
//! {job="fluent-bit", env="prod"}
//! ```
//!
//! When parsing, the surrounding braces and the quotes around values are
//! optional, so `job=fluent-bit,env=prod` is accepted as well.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Errors produced while building or parsing a [`LabelSet`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("invalid label name '{0}': must match [a-zA-Z_][a-zA-Z0-9_]*")]
    InvalidName(String),

    #[error("malformed label set '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

/// Returns whether `name` is a valid Loki/Prometheus label name.
///
/// A valid name starts with an ASCII letter or underscore and contains only
/// ASCII alphanumerics and underscores.
#[must_use]
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// An ordered set of stream labels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a label, replacing any previous value for the same name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), LabelError> {
        let name = name.into();
        if !is_valid_label_name(&name) {
            return Err(LabelError::InvalidName(name));
        }
        self.0.insert(name, value.into());
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a new set holding the labels of `self` overlaid with `other`.
    ///
    /// On a name collision the value from `other` wins.
    #[must_use]
    pub fn merge(&self, other: &LabelSet) -> LabelSet {
        let mut merged = self.0.clone();
        for (name, value) in &other.0 {
            merged.insert(name.clone(), value.clone());
        }
        LabelSet(merged)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}=\"")?;
            for ch in value.chars() {
                match ch {
                    '"' => write!(f, "\\\"")?,
                    '\\' => write!(f, "\\\\")?,
                    '\n' => write!(f, "\\n")?,
                    _ => write!(f, "{ch}")?,
                }
            }
            write!(f, "\"")?;
        }
        write!(f, "}}")
    }
}

impl FromStr for LabelSet {
    type Err = LabelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| LabelError::Malformed {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let mut body = input.trim();
        if let Some(stripped) = body.strip_prefix('{') {
            body = stripped
                .strip_suffix('}')
                .ok_or_else(|| malformed("missing closing '}'"))?;
        }

        let mut labels = LabelSet::new();
        let mut chars = body.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut name = String::new();
            while let Some(ch) = chars.next_if(|&c| c != '=' && c != ',') {
                name.push(ch);
            }
            if chars.next() != Some('=') {
                return Err(malformed(&format!("expected '=' after '{}'", name.trim())));
            }
            let name = name.trim().to_string();

            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            let mut value = String::new();
            if chars.next_if_eq(&'"').is_some() {
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some(escaped) => value.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => value.push(ch),
                    }
                }
                if !closed {
                    return Err(malformed(&format!("unterminated value for '{name}'")));
                }
                while chars.next_if(|c| c.is_whitespace()).is_some() {}
            } else {
                while let Some(ch) = chars.next_if(|&c| c != ',') {
                    value.push(ch);
                }
                value = value.trim().to_string();
            }

            labels.insert(name, value)?;

            match chars.next() {
                None => break,
                Some(',') => {}
                Some(other) => {
                    return Err(malformed(&format!("unexpected character '{other}'")));
                }
            }
        }

        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_label_names() {
        assert!(is_valid_label_name("job"));
        assert!(is_valid_label_name("_private"));
        assert!(is_valid_label_name("k8s_namespace"));
        assert!(!is_valid_label_name(""));
        assert!(!is_valid_label_name("1job"));
        assert!(!is_valid_label_name("app.kubernetes.io"));
        assert!(!is_valid_label_name("my-app"));
    }

    #[test]
    fn test_parse_prometheus_notation() {
        let labels: LabelSet = r#"{job="fluent-bit", env="prod"}"#.parse().unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("job"), Some("fluent-bit"));
        assert_eq!(labels.get("env"), Some("prod"));
    }

    #[test]
    fn test_parse_without_quotes_or_braces() {
        let labels: LabelSet = "job=fluent-bit, env = prod".parse().unwrap();
        assert_eq!(labels.get("job"), Some("fluent-bit"));
        assert_eq!(labels.get("env"), Some("prod"));
    }

    #[test]
    fn test_parse_quoted_value_with_comma_and_escape() {
        let labels: LabelSet = r#"{msg="a, \"b\""}"#.parse().unwrap();
        assert_eq!(labels.get("msg"), Some(r#"a, "b""#));
    }

    #[test]
    fn test_parse_empty() {
        assert!("{}".parse::<LabelSet>().unwrap().is_empty());
        assert!("".parse::<LabelSet>().unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_invalid_input() {
        assert!(matches!(
            "{job}".parse::<LabelSet>(),
            Err(LabelError::Malformed { .. })
        ));
        assert!(matches!(
            r#"{job="fluent-bit""#.parse::<LabelSet>(),
            Err(LabelError::Malformed { .. })
        ));
        assert!(matches!(
            r#"{job="unterminated}"#.parse::<LabelSet>(),
            Err(LabelError::Malformed { .. })
        ));
        assert_eq!(
            r#"{1bad="x"}"#.parse::<LabelSet>(),
            Err(LabelError::InvalidName("1bad".to_string()))
        );
    }

    #[test]
    fn test_display_is_sorted_and_escaped() {
        let mut labels = LabelSet::new();
        labels.insert("zone", "a\"b").unwrap();
        labels.insert("app", "api").unwrap();
        assert_eq!(labels.to_string(), r#"{app="api", zone="a\"b"}"#);

        let reparsed: LabelSet = labels.to_string().parse().unwrap();
        assert_eq!(reparsed, labels);
    }

    #[test]
    fn test_merge_prefers_other() {
        let base: LabelSet = r#"{job="fluent-bit", env="prod"}"#.parse().unwrap();
        let overlay: LabelSet = r#"{job="api"}"#.parse().unwrap();
        let merged = base.merge(&overlay);
        assert_eq!(merged.get("job"), Some("api"));
        assert_eq!(merged.get("env"), Some("prod"));
    }
}
