// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics output.
//!
//! Lines go to stderr next to fluent-bit's own log and look like:
//!
//! ```text
//! [flb-loki] | INFO | loki{id=main}: provided parameter BatchSize=102400
//! [flb-loki] | WARN | loki{id=main}: timestamp isn't known format, using current time: "now"
//! ```
//!
//! A single global subscriber serves every plugin instance. Its level only
//! ever rises: the most verbose `LogLevel` any instance asks for wins.

use std::fmt;
use std::sync::OnceLock;

use tracing::debug;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{reload, Registry};

use crate::config::log_level::LogLevel;

pub const PREFIX: &str = "[flb-loki]";

static LEVEL: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

/// Formats events as `[flb-loki] | LEVEL | span{fields}: message fields`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "{PREFIX} | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Installs the global subscriber on first use and raises its level to
/// `level` if that is more verbose than the current one.
pub fn init(level: LogLevel) {
    let requested = level.as_level_filter();
    let handle = LEVEL.get_or_init(|| {
        let (filter, handle) = reload::Layer::new(requested);
        let subscriber = Registry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .event_format(Formatter)
                .with_ansi(false)
                .with_writer(std::io::stderr),
        );
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            // The host process already installed one; our events go there.
            debug!("Global subscriber already set: {e}");
        }
        handle
    });

    let raised = handle.modify(|current| {
        if requested > *current {
            *current = requested;
        }
    });
    if let Err(e) = raised {
        debug!("Failed to update log level: {e}");
    }
}

/// Level of the global subscriber, or `None` before [`init`] has run.
#[cfg(test)]
pub(crate) fn current_level() -> Option<LevelFilter> {
    LEVEL.get()?.with_current(|level| *level).ok()
}
