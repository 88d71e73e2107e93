//! Diagnostic logging on stderr.
//!
//! Stdout carries the framed protocol, so every log line goes to stderr
//! (browsers show it in their extension console). Levels are configured per
//! target, and `RUST_LOG` overrides the config.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "warn"  # quiet by default
//!
//! [logging.modules]
//! "filewatcher::watcher" = "debug"
//! ```
//!
//! # Environment Variable
//!
//! ```bash
//! RUST_LOG=debug filewatcher
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();

    let mut filter_str = config.default.clone();
    for (module, level) in modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Choose the level filter: a valid `RUST_LOG` wins, then the configured
/// directives, then the configured default level alone, then `warn`.
///
/// Rejected directives are reported on stderr since no subscriber exists yet.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => return filter,
            Err(e) => eprintln!("filewatcher: ignoring RUST_LOG: {e}"),
        }
    }

    let directives = filter_directives(config);
    EnvFilter::try_new(&directives)
        .or_else(|e| {
            eprintln!("filewatcher: ignoring logging.modules ({directives}): {e}");
            EnvFilter::try_new(&config.default)
        })
        .unwrap_or_else(|e| {
            eprintln!("filewatcher: ignoring logging.default ({}): {e}", config.default);
            EnvFilter::new("warn")
        })
}

/// Install the stderr subscriber.
///
/// Only the first call takes effect; later calls are ignored.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            // Stdout is the protocol stream
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(build_filter(config));

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Log a host event tagged with its component.
///
/// # Examples
/// ```ignore
/// log_event!("registry", "started", "rule '{}'", rule_id);
/// log_event!("session", "input closed");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level variant of [`log_event!`].
///
/// # Examples
/// ```ignore
/// debug_event!("frame", "skipped spurious prefix", "{len}");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Trace-level variant, for per-change noise such as filtered paths.
#[macro_export]
macro_rules! trace_event {
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::trace!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// A recoverable failure: the request is dropped and the session goes on.
///
/// # Examples
/// ```ignore
/// failure_event!(warn, "session", "ignored message without msgId", "{payload}");
/// failure_event!(error, "session", "cannot start rule", "'{rule_id}': {e}");
/// ```
#[macro_export]
macro_rules! failure_event {
    (warn, $component:expr, $event:expr, $($arg:tt)*) => {
        tracing::warn!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
    (error, $component:expr, $event:expr, $($arg:tt)*) => {
        tracing::error!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        assert_eq!(filter_directives(&config), "warn");

        config.default = "info".to_string();
        config
            .modules
            .insert("filewatcher::watcher".to_string(), "trace".to_string());
        config
            .modules
            .insert("filewatcher::protocol".to_string(), "debug".to_string());

        assert_eq!(
            filter_directives(&config),
            "info,filewatcher::protocol=debug,filewatcher::watcher=trace"
        );
    }

    #[test]
    fn test_bad_directives_fall_back() {
        let mut config = LoggingConfig::default();
        config.default = "debug".to_string();
        config
            .modules
            .insert("filewatcher::watcher".to_string(), "loud".to_string());

        // Module overrides are dropped, the default level survives
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            let filter = build_filter(&config).to_string();
            assert!(filter.contains("debug"), "{filter}");
            assert!(!filter.contains("loud"), "{filter}");
        }
    }
}
