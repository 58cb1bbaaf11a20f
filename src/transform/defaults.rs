//! Built-in transformation document used when the store cannot supply one.

use std::collections::BTreeMap;

use super::types::{TransformationConfig, TransformationExpression, VersionTransformation};

pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_CLIENT_VERSION: &str = "v1";
pub const DEFAULT_UPSTREAM_VERSION: &str = "v2";

/// `v1` clients speak `user_id`/`full_name`; `v2` is the upstream dialect.
pub fn default_config() -> TransformationConfig {
    let mut transformations = BTreeMap::new();
    transformations.insert(
        DEFAULT_CLIENT_VERSION.to_string(),
        VersionTransformation {
            request: TransformationExpression::new(r#"{"id": user_id, "name": full_name}"#)
                .with_description("v1 request fields to upstream names"),
            response: TransformationExpression::new(r#"{"user_id": id, "full_name": name}"#)
                .with_description("upstream fields back to v1 names"),
            target_version: Some(DEFAULT_UPSTREAM_VERSION.to_string()),
        },
    );
    transformations.insert(DEFAULT_UPSTREAM_VERSION.to_string(), VersionTransformation::identity());

    TransformationConfig {
        schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        default_version: DEFAULT_CLIENT_VERSION.to_string(),
        upstream_version: DEFAULT_UPSTREAM_VERSION.to_string(),
        transformations,
        routing: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = default_config();
        config.validate().unwrap();
        assert_eq!(config.versions(), vec!["v1", "v2"]);
        assert!(config.transformation("v2").unwrap().response.is_identity());
        assert!(!config.transformation("v1").unwrap().request.is_identity());
    }
}
