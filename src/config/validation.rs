//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//! - Refuse an enabled admin API guarded by the placeholder key
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, StoreKind, PLACEHOLDER_API_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a socket address", value)));
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);

    match url::Url::parse(&config.upstream.base_url) {
        Ok(url) if url.scheme() == "http" && url.has_host() => {}
        Ok(url) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("unsupported scheme '{}' (expected http)", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("upstream.base_url", e.to_string())),
    }
    if config.upstream.request_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.request_timeout_secs", "must be greater than 0"));
    }

    if config.transform.timeout_ms == 0 {
        errors.push(ValidationError::new("transform.timeout_ms", "must be greater than 0"));
    }
    if config.transform.cache_capacity == 0 {
        errors.push(ValidationError::new("transform.cache_capacity", "must be greater than 0"));
    }

    if config.resolver.config_key.trim().is_empty() {
        errors.push(ValidationError::new("resolver.config_key", "must not be empty"));
    }

    if config.store.kind == StoreKind::File && config.store.path.is_none() {
        errors.push(ValidationError::new("store.path", "required when store.kind = \"file\""));
    }
    if config.store.watch && config.store.kind != StoreKind::File {
        errors.push(ValidationError::new("store.watch", "only supported for file stores"));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }
    if config.limits.max_response_bytes == 0 {
        errors.push(ValidationError::new("limits.max_response_bytes", "must be greater than 0"));
    }
    // The upstream deadline must fire first so the client sees the upstream 504.
    if config.timeouts.request_secs <= config.upstream.request_timeout_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!(
                "must exceed upstream.request_timeout_secs ({})",
                config.upstream.request_timeout_secs
            ),
        ));
    }

    if config.observability.metrics_enabled {
        check_address("observability.metrics_address", &config.observability.metrics_address, &mut errors);
    }

    if config.admin.enabled {
        check_address("admin.bind_address", &config.admin.bind_address, &mut errors);
        if config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::new("admin.api_key", "must be set when the admin API is enabled"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
