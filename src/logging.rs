//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingSection};

/// Filter directive for the configured level. `RUST_LOG` wins when set.
pub fn env_filter(level: &str, verbose: bool) -> EnvFilter {
    let default = if verbose {
        "debug,tower_http=debug".to_string()
    } else {
        format!("{level},tower_http=info")
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber on stderr. Later calls are ignored.
pub fn init_tracing(logging: &LoggingSection, verbose: bool) {
    let filter = env_filter(&logging.level, verbose);
    let result = match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
