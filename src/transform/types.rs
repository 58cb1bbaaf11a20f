//! Transformation data model.
//!
//! Documents arrive as JSON from the configuration store. They are parsed
//! into permissive raw shapes first and then validated into
//! `TransformationConfig`; an invalid document is rejected as a whole.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Source text of the no-op expression.
pub const IDENTITY_EXPRESSION: &str = "$";

/// Prefix marking an expression source stored under another key.
pub const REFERENCE_PREFIX: &str = "ref:";

const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

/// One leg's transformation source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationExpression {
    /// Expression text, `$` for identity or `ref:<key>` for indirection.
    #[serde(alias = "expression")]
    pub source: String,

    /// How long the compiled form may stay cached.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TransformationExpression {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECS,
            description: None,
        }
    }

    pub fn identity() -> Self {
        Self::new(IDENTITY_EXPRESSION)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_identity(&self) -> bool {
        self.source.trim() == IDENTITY_EXPRESSION
    }

    /// Store key this source points at, if it is a `ref:` indirection.
    pub fn reference_key(&self) -> Option<&str> {
        self.source
            .strip_prefix(REFERENCE_PREFIX)
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

/// Bidirectional mapping for one client version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionTransformation {
    pub request: TransformationExpression,
    pub response: TransformationExpression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
}

impl VersionTransformation {
    pub fn identity() -> Self {
        Self {
            request: TransformationExpression::identity(),
            response: TransformationExpression::identity(),
            target_version: None,
        }
    }

    pub fn leg(&self, direction: Direction) -> &TransformationExpression {
        match direction {
            Direction::Request => &self.request,
            Direction::Response => &self.response,
        }
    }

    pub fn leg_mut(&mut self, direction: Direction) -> &mut TransformationExpression {
        match direction {
            Direction::Request => &mut self.request,
            Direction::Response => &mut self.response,
        }
    }
}

/// The active version→transformation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationConfig {
    pub schema_version: String,
    pub default_version: String,
    pub upstream_version: String,
    pub transformations: BTreeMap<String, VersionTransformation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    schema_version: Option<String>,
    default_version: Option<String>,
    upstream_version: Option<String>,
    transformations: Option<BTreeMap<String, RawVersion>>,
    routing: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVersion {
    request: Option<TransformationExpression>,
    response: Option<TransformationExpression>,
    target_version: Option<String>,
}

/// A single problem found while validating a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField(&'static str),
    NoTransformations,
    EmptyVersionKey,
    MissingLeg { version: String, direction: Direction },
    EmptySource { version: String, direction: Direction },
    UnknownDefaultVersion(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField(field) => write!(f, "missing or empty '{}'", field),
            ValidationIssue::NoTransformations => write!(f, "'transformations' is missing or empty"),
            ValidationIssue::EmptyVersionKey => write!(f, "transformation keys must be non-empty"),
            ValidationIssue::MissingLeg { version, direction } => {
                write!(f, "version '{}' has no {} transformation", version, direction)
            }
            ValidationIssue::EmptySource { version, direction } => {
                write!(f, "version '{}' has an empty {} expression", version, direction)
            }
            ValidationIssue::UnknownDefaultVersion(version) => {
                write!(f, "defaultVersion '{}' has no transformation entry", version)
            }
        }
    }
}

/// Why a stored document was rejected.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Malformed configuration document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid configuration document: {}", join_issues(.0))]
    Invalid(Vec<ValidationIssue>),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_leg(
    version: &str,
    direction: Direction,
    leg: Option<TransformationExpression>,
    issues: &mut Vec<ValidationIssue>,
) -> Option<TransformationExpression> {
    match leg {
        None => {
            issues.push(ValidationIssue::MissingLeg {
                version: version.to_string(),
                direction,
            });
            None
        }
        Some(expr) if expr.source.trim().is_empty() => {
            issues.push(ValidationIssue::EmptySource {
                version: version.to_string(),
                direction,
            });
            None
        }
        Some(expr) => Some(expr),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl TransformationConfig {
    /// Parse and validate a serialized document.
    pub fn from_json(text: &str) -> Result<Self, ConfigValidationError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigValidationError> {
        let mut issues = Vec::new();

        let schema_version = non_empty(raw.schema_version);
        if schema_version.is_none() {
            issues.push(ValidationIssue::MissingField("schemaVersion"));
        }
        let default_version = non_empty(raw.default_version);
        if default_version.is_none() {
            issues.push(ValidationIssue::MissingField("defaultVersion"));
        }
        let upstream_version = non_empty(raw.upstream_version);
        if upstream_version.is_none() {
            issues.push(ValidationIssue::MissingField("upstreamVersion"));
        }

        let raw_transformations = raw.transformations.unwrap_or_default();
        if raw_transformations.is_empty() {
            issues.push(ValidationIssue::NoTransformations);
        } else if let Some(default) = default_version.as_ref().filter(|v| !raw_transformations.contains_key(*v)) {
            issues.push(ValidationIssue::UnknownDefaultVersion(default.clone()));
        }

        let mut transformations = BTreeMap::new();
        for (version, entry) in raw_transformations {
            if version.trim().is_empty() {
                issues.push(ValidationIssue::EmptyVersionKey);
                continue;
            }
            let request = check_leg(&version, Direction::Request, entry.request, &mut issues);
            let response = check_leg(&version, Direction::Response, entry.response, &mut issues);
            if let (Some(request), Some(response)) = (request, response) {
                transformations.insert(
                    version,
                    VersionTransformation {
                        request,
                        response,
                        target_version: entry.target_version,
                    },
                );
            }
        }

        match (schema_version, default_version, upstream_version) {
            (Some(schema_version), Some(default_version), Some(upstream_version)) if issues.is_empty() => Ok(Self {
                schema_version,
                default_version,
                upstream_version,
                transformations,
                routing: raw.routing,
            }),
            _ => Err(ConfigValidationError::Invalid(issues)),
        }
    }

    /// Re-check the invariants of an already-built document.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let value = serde_json::to_value(self)?;
        let raw: RawConfig = serde_json::from_value(value)?;
        Self::from_raw(raw).map(|_| ())
    }

    pub fn transformation(&self, version: &str) -> Option<&VersionTransformation> {
        self.transformations.get(version)
    }

    pub fn versions(&self) -> Vec<String> {
        self.transformations.keys().cloned().collect()
    }

    pub fn is_supported(&self, version: &str) -> bool {
        self.transformations.contains_key(version)
    }

    /// Versions accepted on `route`; a routing entry overrides the full list.
    pub fn supported_versions_for(&self, route: &str) -> Vec<String> {
        self.routing
            .as_ref()
            .and_then(|routing| routing.get(route))
            .cloned()
            .unwrap_or_else(|| self.versions())
    }
}

/// Which leg of a round trip is being transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation parameters for the transformation engine.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub from_version: String,
    pub to_version: String,
    pub direction: Direction,
    /// Overrides the engine's default evaluation timeout.
    pub timeout: Option<Duration>,
}

impl TransformContext {
    pub fn new(from_version: impl Into<String>, to_version: impl Into<String>, direction: Direction) -> Self {
        Self {
            from_version: from_version.into(),
            to_version: to_version.into(),
            direction,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformMetrics {
    pub duration_ms: f64,
    pub from_version: String,
    pub to_version: String,
    pub direction: Direction,
}

/// Result of one transformation. On failure `data` is the untouched input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationOutcome {
    pub success: bool,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TransformMetrics>,
}

impl TransformationOutcome {
    pub fn succeeded(data: Value, metrics: TransformMetrics) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metrics: Some(metrics),
        }
    }

    pub fn failed(original: Value, error: impl Into<String>, metrics: TransformMetrics) -> Self {
        Self {
            success: false,
            data: original,
            error: Some(error.into()),
            metrics: Some(metrics),
        }
    }
}
