//! Tracing subscriber bootstrap.
//!
//! Services embedding the core call [`init_tracing`] once at startup. `RUST_LOG` takes
//! precedence over the configured filter.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::TelemetryConfig;

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directives could not be parsed.
    #[error("invalid log filter '{directives}': {reason}")]
    InvalidFilter {
        /// The rejected directives.
        directives: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Builds the filter: `RUST_LOG` when set, the configured directives otherwise.
///
/// # Errors
///
/// Returns an error if the configured directives are malformed.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.filter).map_err(|e| TelemetryError::InvalidFilter {
        directives: config.filter.clone(),
        reason: e.to_string(),
    })
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the filter is malformed or a subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    let json_layer = config.json.then(|| fmt::layer().json());
    let text_layer = (!config.json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_config() {
        temp_env::with_var_unset("RUST_LOG", || {
            let config = TelemetryConfig {
                filter: "ledgerline=debug,moka=warn".to_string(),
                json: false,
            };
            let filter = build_filter(&config).unwrap();
            assert!(filter.to_string().contains("ledgerline=debug"));
        });
    }

    #[test]
    fn test_build_filter_rejects_garbage() {
        temp_env::with_var_unset("RUST_LOG", || {
            let config = TelemetryConfig {
                filter: "ledgerline=verbose".to_string(),
                json: false,
            };
            assert!(matches!(
                build_filter(&config),
                Err(TelemetryError::InvalidFilter { .. })
            ));
        });
    }

    #[test]
    fn test_second_install_fails() {
        let config = TelemetryConfig::default();
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::Install(_))
        ));
    }
}
