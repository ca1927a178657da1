//! Configuration validation.
//!
//! Returns all validation errors, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("observability.log_level: unknown level '{0}'")]
    UnknownLogLevel(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let addresses = [
        ("listener.bind_address", &config.listener.bind_address),
        ("upstream.address", &config.upstream.address),
    ];
    for (field, value) in addresses {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.clone(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let durations = [
        ("listener.request_timeout_secs", config.listener.request_timeout_secs),
        ("upstream.connect_timeout_secs", config.upstream.connect_timeout_secs),
        ("admission.janitor_grace_secs", config.admission.janitor_grace_secs),
    ];
    for (field, secs) in durations {
        if secs == 0 {
            errors.push(ValidationError::ZeroDuration { field });
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
