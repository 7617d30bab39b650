//! Tracing subscriber setup
//!
//! Installs a global `tracing` subscriber writing formatted events to stdout,
//! filtered by the configured level (any `EnvFilter` directive is accepted,
//! e.g. `info,tc_infra=debug`).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tc_shared::config::{LogFormat, LoggingConfig};

use crate::InfrastructureError;

/// Install the global tracing subscriber
///
/// # Errors
/// * `InfrastructureError::Config` - the level is not a valid filter directive
/// * `InfrastructureError::General` - a global subscriber is already installed
pub fn init_tracing(config: &LoggingConfig) -> Result<(), InfrastructureError> {
    let filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(config.source_location)
                    .with_line_number(config.source_location),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(config.source_location)
                    .with_line_number(config.source_location),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_file(config.source_location)
                    .with_line_number(config.source_location),
            )
            .try_init(),
    };

    result.map_err(|e| InfrastructureError::General(format!("Failed to install tracing: {}", e)))
}

/// Parse a level or filter directive
pub(crate) fn build_filter(level: &str) -> Result<EnvFilter, InfrastructureError> {
    EnvFilter::try_new(level)
        .map_err(|e| InfrastructureError::Config(format!("Invalid log filter '{}': {}", level, e)))
}
