//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity, slots, workers)
//! - Check that listener and metrics addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// Smallest buffer capacity that still holds a maximal POP3 command line.
pub const MIN_BUFFER_CAPACITY: usize = 512;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, address) in [
        ("listener.client_address", &config.listener.client_address),
        ("listener.admin_address", &config.listener.admin_address),
    ] {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(field, format!("invalid socket address {:?}", address)));
        }
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.upstream.host.trim().is_empty() {
        errors.push(ValidationError::new("upstream.host", "must not be empty"));
    }
    if config.upstream.port == 0 {
        errors.push(ValidationError::new("upstream.port", "must not be 0"));
    }

    if config.buffers.capacity < MIN_BUFFER_CAPACITY {
        errors.push(ValidationError::new(
            "buffers.capacity",
            format!("must be at least {} bytes", MIN_BUFFER_CAPACITY),
        ));
    }

    if config.admin.password.is_empty() {
        errors.push(ValidationError::new("admin.password", "must not be empty"));
    }

    if config.capture.max_slots == 0 {
        errors.push(ValidationError::new("capture.max_slots", "must be greater than 0"));
    }
    if config.capture.directory.trim().is_empty() {
        errors.push(ValidationError::new("capture.directory", "must not be empty"));
    }

    if config.pipeline.workers == 0 {
        errors.push(ValidationError::new("pipeline.workers", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    for (i, user) in config.users.iter().enumerate() {
        if user.name.trim().is_empty() || user.name.contains(char::is_whitespace) {
            errors.push(ValidationError::new(format!("users[{}].name", i), "must be a single token"));
        }
        if user.host.trim().is_empty() {
            errors.push(ValidationError::new(format!("users[{}].host", i), "must not be empty"));
        }
        if user.port == 0 {
            errors.push(ValidationError::new(format!("users[{}].port", i), "must not be 0"));
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
    use crate::config::schema::UserRoute;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.client_address = "not-an-address".into();
        config.buffers.capacity = 16;
        config.pipeline.workers = 0;
        config.users.push(UserRoute {
            name: "two words".into(),
            host: "mail.example.com".into(),
            port: 110,
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["listener.client_address", "buffers.capacity", "pipeline.workers", "users[0].name"]
        );
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
