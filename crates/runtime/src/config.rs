//! Engine configuration
//!
//! ## Configuration (Environment Variables)
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FEM_LOG` | `warn` | `tracing` filter directive (e.g. `fem_core=debug`) |
//! | `FEM_TRACE` | `off` | Invocation tracing: `off`, `calls` or `errors` |
//! | `FEM_STRING_ENCODING` | `auto` | Leaf width for host text: `auto`, `narrow`, `medium` or `wide` |
//! | `FEM_FORCE_RESULTS` | `true` | Force-resolve results of `Engine::evaluate` recursively |
//!
//! ## Example
//!
//! ```bash
//! # Log every traced call, with core lifecycle events
//! FEM_TRACE=calls FEM_LOG=fem_core=debug ./my-host
//! ```
//!
//! Unparseable values fall back to the default.

use fem_core::StringEncoding;

/// Which traced invocations are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceMode {
    /// No tracer is installed (default)
    #[default]
    Off,
    /// Every traced invocation is logged
    Calls,
    /// Only invocations that end in an error are logged
    Errors,
}

impl TraceMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "off" | "none" => Some(TraceMode::Off),
            "calls" | "all" => Some(TraceMode::Calls),
            "errors" => Some(TraceMode::Errors),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != TraceMode::Off
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Filter directive handed to the log subscriber
    pub log_filter: String,
    pub trace: TraceMode,
    /// Leaf width for strings created from host text
    pub string_encoding: StringEncoding,
    /// Whether evaluation results are force-resolved before returning
    pub force_results: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_filter: "warn".to_string(),
            trace: TraceMode::Off,
            string_encoding: StringEncoding::Auto,
            force_results: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let log_filter = std::env::var("FEM_LOG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.log_filter);

        let trace = std::env::var("FEM_TRACE")
            .ok()
            .and_then(|s| TraceMode::parse(&s))
            .unwrap_or(defaults.trace);

        let string_encoding = std::env::var("FEM_STRING_ENCODING")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.string_encoding);

        let force_results = std::env::var("FEM_FORCE_RESULTS")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(defaults.force_results);

        Self {
            log_filter,
            trace,
            string_encoding,
            force_results,
        }
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn with_trace(mut self, trace: TraceMode) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_string_encoding(mut self, encoding: StringEncoding) -> Self {
        self.string_encoding = encoding;
        self
    }

    pub fn with_force_results(mut self, force: bool) -> Self {
        self.force_results = force;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 4] = [
        "FEM_LOG",
        "FEM_TRACE",
        "FEM_STRING_ENCODING",
        "FEM_FORCE_RESULTS",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: env tests are serialized with #[serial]
            unsafe { std::env::remove_var(var) };
        }
    }

    fn set_env(var: &str, value: &str) {
        // SAFETY: env tests are serialized with #[serial]
        unsafe { std::env::set_var(var, value) };
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = EngineConfig::from_env();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.log_filter, "warn");
        assert!(!config.trace.is_enabled());
        assert!(config.force_results);
    }

    #[test]
    #[serial]
    fn test_reads_env() {
        clear_env();
        set_env("FEM_LOG", "fem_core=debug");
        set_env("FEM_TRACE", "Errors");
        set_env("FEM_STRING_ENCODING", "wide");
        set_env("FEM_FORCE_RESULTS", "no");
        let config = EngineConfig::from_env();
        clear_env();

        assert_eq!(config.log_filter, "fem_core=debug");
        assert_eq!(config.trace, TraceMode::Errors);
        assert_eq!(config.string_encoding, StringEncoding::Wide);
        assert!(!config.force_results);
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        set_env("FEM_TRACE", "loud");
        set_env("FEM_STRING_ENCODING", "ebcdic");
        set_env("FEM_FORCE_RESULTS", "maybe");
        let config = EngineConfig::from_env();
        clear_env();

        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::default()
            .with_log_filter("info")
            .with_trace(TraceMode::Calls)
            .with_string_encoding(StringEncoding::Narrow)
            .with_force_results(false);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.trace, TraceMode::Calls);
        assert_eq!(config.string_encoding, StringEncoding::Narrow);
        assert!(!config.force_results);
    }
}
