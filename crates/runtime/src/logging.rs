//! Structured logging
//!
//! The core crate emits `tracing` events; this module installs the subscriber
//! that prints them and provides [`LogListener`], which turns traced
//! invocations into events.
//!
//! Events from traced invocations use the `fem::trace` target, so they can be
//! filtered on their own: `FEM_LOG=fem::trace=info`.

use crate::config::{EngineConfig, TraceMode};
use fem_core::{Invocation, TraceListener};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOGGING_INIT: Once = Once::new();

/// Install the global `tracing` subscriber
///
/// Writes to stderr, filtered by `config.log_filter` (falls back to `warn`
/// when the directive does not parse). Safe to call multiple times; only the
/// first call has an effect, and a subscriber installed by the host wins.
pub fn init_logging(config: &EngineConfig) {
    LOGGING_INIT.call_once(|| {
        let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|err| {
            eprintln!(
                "fem: ignoring invalid log filter '{}': {}",
                config.log_filter, err
            );
            EnvFilter::new("warn")
        });
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        if installed.is_ok() {
            tracing::debug!(filter = %config.log_filter, "logging initialized");
        }
    });
}

/// Trace listener that reports invocations as `tracing` events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogListener {
    mode: TraceMode,
}

impl LogListener {
    pub fn new(mode: TraceMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> TraceMode {
        self.mode
    }
}

impl TraceListener for LogListener {
    fn on_execute(&self, call: &mut Invocation) {
        if self.mode == TraceMode::Calls {
            tracing::trace!(
                target: "fem::trace",
                function = ?call.function,
                params = call.frame.size(),
                "invoke"
            );
        }
    }

    fn on_return(&self, call: &mut Invocation) {
        if self.mode == TraceMode::Calls {
            tracing::info!(
                target: "fem::trace",
                function = ?call.function,
                result = ?call.result,
                "returned"
            );
        }
    }

    fn on_throw(&self, call: &mut Invocation) {
        let Some(error) = &call.error else {
            return;
        };
        if self.mode.is_enabled() {
            tracing::warn!(
                target: "fem::trace",
                function = ?call.function,
                error = %error,
                "failed"
            );
        }
    }
}
