//! Engine configuration
//!
//! All configuration is read once at startup from `ABTEST_*` environment
//! variables and passed down explicitly. Nothing below the binary reads the
//! environment.

use crate::model::SubjectType;
use std::time::Duration;
use thiserror::Error;

/// Default debounce window for experiment updates
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Default port for the HTTP surface
pub const DEFAULT_PORT: u16 = 8080;

/// Default branch when ABTEST_BRANCH is unset
pub const DEFAULT_BRANCH: &str = "development";

/// Default timeout for outbound HTTP calls
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Edition/feature gates for subject types and metrics
///
/// Passed to the LifecycleController at construction instead of being read
/// from ambient state.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub offers_enabled: bool,
    pub entities_enabled: bool,
    /// Metric ids that may be observed; None allows every metric
    pub allowed_metrics: Option<Vec<String>>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            offers_enabled: true,
            entities_enabled: true,
            allowed_metrics: None,
        }
    }
}

impl FeatureConfig {
    pub fn allows_subject(&self, subject_type: SubjectType) -> bool {
        match subject_type {
            SubjectType::Entity => self.entities_enabled,
            SubjectType::Offer => self.offers_enabled,
        }
    }

    pub fn allows_metric(&self, metric_id: &str) -> bool {
        match &self.allowed_metrics {
            None => true,
            Some(allowed) => allowed.iter().any(|m| m == metric_id),
        }
    }

    /// Subject type for freshly seeded ChangeSets
    ///
    /// Entity unless this edition disables entities.
    pub fn default_subject_type(&self) -> SubjectType {
        if !self.entities_enabled && self.offers_enabled {
            SubjectType::Offer
        } else {
            SubjectType::Entity
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Base URL of the persistence service
    pub backend_url: String,
    pub game_id: String,
    pub branch: String,
    pub port: u16,
    pub debounce: Duration,
    pub request_timeout: Duration,
    pub features: FeatureConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// - ABTEST_BACKEND_URL (required)
    /// - ABTEST_GAME_ID (required)
    /// - ABTEST_BRANCH (default: development)
    /// - ABTEST_PORT (default: 8080)
    /// - ABTEST_DEBOUNCE_MS (default: 1000)
    /// - ABTEST_REQUEST_TIMEOUT_SECS (default: 10)
    /// - ABTEST_OFFERS_ENABLED / ABTEST_ENTITIES_ENABLED (default: true)
    /// - ABTEST_ALLOWED_METRICS: comma-separated allow-list (default: all)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| -> Result<String, ConfigError> {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(var))
        };

        let backend_url = required("ABTEST_BACKEND_URL")?;
        let game_id = required("ABTEST_GAME_ID")?;
        let branch = lookup("ABTEST_BRANCH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        let port = parse_number(&lookup, "ABTEST_PORT", DEFAULT_PORT)?;
        let debounce_ms = parse_number(&lookup, "ABTEST_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        let timeout_secs = parse_number(
            &lookup,
            "ABTEST_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        let allowed_metrics = lookup("ABTEST_ALLOWED_METRICS").and_then(|raw| {
            let metrics: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            if metrics.is_empty() {
                None
            } else {
                Some(metrics)
            }
        });

        Ok(EngineConfig {
            backend_url,
            game_id,
            branch,
            port,
            debounce: Duration::from_millis(debounce_ms),
            request_timeout: Duration::from_secs(timeout_secs),
            features: FeatureConfig {
                offers_enabled: parse_flag(&lookup, "ABTEST_OFFERS_ENABLED", true),
                entities_enabled: parse_flag(&lookup, "ABTEST_ENTITIES_ENABLED", true),
                allowed_metrics,
            },
        })
    }
}

/// Read a boolean flag: "true"/"1" enable, "false"/"0" disable, anything else keeps the default
fn parse_flag<F>(lookup: &F, var: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).as_deref().map(str::trim) {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn parse_number<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value: raw.clone(),
        }),
    }
}
