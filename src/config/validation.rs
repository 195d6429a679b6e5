//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate engine-wide settings and the saved portfolio entries
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Subsystem-specific settings are checked by that subsystem's setup, so a
//!   bad section degrades one subsystem instead of refusing the whole file

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::Config;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.name.trim().is_empty() {
        errors.push(ValidationError::new("name", "must not be empty"));
    }

    if config.logging.level.trim().is_empty() {
        errors.push(ValidationError::new("logging.level", "must not be empty"));
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("invalid socket address {:?}", config.metrics.address),
        ));
    }

    for (i, entry) in config.portfolio.addresses.iter().enumerate() {
        if entry.address.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("portfolio.addresses[{i}].address"),
                "must not be empty",
            ));
        }
        if entry.coin.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("portfolio.addresses[{i}].coin"),
                "must not be empty",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PortfolioAddress;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = Config::default();
        config.metrics.enabled = true;
        config.metrics.address = "not-an-address".into();
        config.portfolio.addresses.push(PortfolioAddress {
            address: String::new(),
            coin: "ETH".into(),
            balance: 0.0,
            description: String::new(),
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["metrics.address", "portfolio.addresses[0].address"]
        );
    }

    #[test]
    fn test_subsystem_settings_are_left_to_setup() {
        let mut config = Config::default();
        config.remote_control.enabled = true;
        config.remote_control.bind_address = "garbage".into();
        config.communications.buffer_size = 0;
        config.order_manager.sweep_interval_secs = 0;
        config.portfolio.summary_interval_secs = 0;
        assert!(validate_config(&config).is_ok());
    }
}
