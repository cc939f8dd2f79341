//! Telemetry and Observability
//!
//! Handles setting up `tracing-subscriber` for structured logging.
//! Supports config-driven log levels, environment variable overrides,
//! and format switching between pretty (debug) and JSON (release).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a log level: dependencies stay at `warn` unless the
/// level is quieter, Middag's own crates follow `log_level`.
pub fn filter_directive(log_level: &str) -> String {
    let dependencies = match log_level {
        "error" => "error",
        _ => "warn",
    };
    format!(
        "{},middag_engine={},middag={},sdk={}",
        dependencies, log_level, log_level, log_level
    )
}

/// Initialize the tracing subscriber with the given log level.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter.
///
/// In debug builds: pretty-printed terminal output.
/// In release builds: JSON structured output with the current span, so every
/// line logged during a round carries its `round_id`.
///
/// Calling this more than once is harmless; only the first call installs a
/// subscriber.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(
            filter_directive("debug"),
            "warn,middag_engine=debug,middag=debug,sdk=debug"
        );
        assert!(filter_directive("error").starts_with("error,"));
    }
}
