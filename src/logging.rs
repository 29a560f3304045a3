//! Diagnostic logging setup.
//!
//! Library code only emits `tracing` events; binaries call [`init`] once to
//! print them to stderr. The durable record of mutations is the audit log,
//! not this output.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable overriding the configured filter.
pub const LOG_ENV_VAR: &str = "TASKFLOW_LOG";

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Filter directive to use: `TASKFLOW_LOG` if set and non-empty, otherwise
/// `configured`.
#[must_use]
pub fn effective_filter(configured: &str) -> String {
    match std::env::var(LOG_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => configured.to_string(),
    }
}

/// Install the stderr subscriber. Later calls are no-ops.
///
/// An unparsable filter falls back to `warn` rather than failing.
pub fn init(configured: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let directive = effective_filter(configured);
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_ansi(std::io::stderr().is_terminal())
            .with_filter(filter);

        // Another subscriber may already be installed (tests, embedding apps)
        let _ = tracing_subscriber::registry().with(layer).try_init();
    });
}
