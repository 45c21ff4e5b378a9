//! Parsing of duration-valued plugin keys.
//!
//! Accepts a bare integer (whole seconds, the historical `BatchWait` format)
//! or a humantime expression such as `500ms`, `1m 30s` or `2h`.

use std::time::Duration;

pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(input).map_err(|e| format!("{e} in duration '{input}'"))
}
