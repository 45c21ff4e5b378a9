use std::fmt;
use std::str::FromStr;

/// How the remaining record fields are rendered into the pushed line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LineFormat {
    /// A JSON object with keys in sorted order.
    #[default]
    Json,
    /// `key=value` pairs sorted by key and separated by a single space.
    KeyValue,
}

impl fmt::Display for LineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineFormat::Json => write!(f, "json"),
            LineFormat::KeyValue => write!(f, "key_value"),
        }
    }
}

impl FromStr for LineFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LineFormat::Json),
            "key_value" | "kv" => Ok(LineFormat::KeyValue),
            _ => Err(format!(
                "invalid line format '{s}', valid formats are: json, key_value"
            )),
        }
    }
}
