//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Values supplied on the command line or through environment variables.
///
/// Each set field replaces the corresponding file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub upstream_url: Option<String>,
    pub log_level: Option<String>,
    pub transform_timeout_ms: Option<u64>,
    pub config_cache_ttl_secs: Option<u64>,
    pub admin_api_key: Option<String>,
    pub bind_address: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(url) = &self.upstream_url {
            config.upstream.base_url = url.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(ms) = self.transform_timeout_ms {
            config.transform.timeout_ms = ms;
        }
        if let Some(ttl) = self.config_cache_ttl_secs {
            config.resolver.cache_ttl_secs = ttl;
        }
        if let Some(key) = &self.admin_api_key {
            config.admin.api_key = key.clone();
        }
        if let Some(addr) = &self.bind_address {
            config.listener.bind_address = addr.clone();
        }
    }
}

/// Parse a TOML file without validating it.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load the file (or defaults when `path` is `None`), apply overrides, then validate.
pub fn load_with_overrides(path: Option<&Path>, overrides: &Overrides) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => GatewayConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_file() {
        let file = write_toml(
            r#"
            [upstream]
            base_url = "http://localhost:4000"

            [transform]
            timeout_ms = 75
            "#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.upstream.base_url, "http://localhost:4000");
        assert_eq!(config.transform.timeout_ms, 75);
    }

    #[test]
    fn test_parse_error() {
        let file = write_toml("[upstream\nbase_url = ");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file = write_toml(
            r#"
            [upstream]
            base_url = "http://localhost:4000"
            [resolver]
            cache_ttl_secs = 10
            "#,
        );
        let overrides = Overrides {
            upstream_url: Some("http://override:5000".into()),
            transform_timeout_ms: Some(120),
            config_cache_ttl_secs: Some(5),
            ..Default::default()
        };
        let config = load_with_overrides(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.upstream.base_url, "http://override:5000");
        assert_eq!(config.transform.timeout_ms, 120);
        assert_eq!(config.resolver.cache_ttl_secs, 5);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let overrides = Overrides {
            transform_timeout_ms: Some(0),
            ..Default::default()
        };
        let err = load_with_overrides(None, &overrides).unwrap_err();
        assert!(err.to_string().contains("transform.timeout_ms"));
    }
}
