//! Configuration for the triage pipeline.
//!
//! Loaded from a YAML file with every section optional, falling back to
//! defaults. Remote endpoints can additionally be overridden from the
//! environment so deployments can point at real services without editing
//! the file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default maximum readings retained per case for trend analysis
pub const DEFAULT_TREND_WINDOW: usize = 20;

/// Default evaluation worker count
pub const DEFAULT_POOL_WORKERS: usize = 4;

/// Default per-worker queue depth
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub engine: EngineConfig,
    pub routing: RoutingConfig,
    pub pool: PoolConfig,
    pub prediction: DependencyConfig,
    pub explanation: DependencyConfig,
}

impl TriageConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides for remote endpoints
    pub fn apply_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("TRIAGE_PREDICTION_ENDPOINT") {
            if !endpoint.is_empty() {
                self.prediction.endpoint = Some(endpoint);
            }
        }
        if let Ok(endpoint) = std::env::var("TRIAGE_EXPLANATION_ENDPOINT") {
            if !endpoint.is_empty() {
                self.explanation.endpoint = Some(endpoint);
            }
        }
        self
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.engine.trend_window < 2 {
            return Err(Error::config("engine.trend_window must be at least 2"));
        }
        if self.pool.workers == 0 {
            return Err(Error::config("pool.workers must be greater than 0"));
        }
        if self.pool.queue_depth == 0 {
            return Err(Error::config("pool.queue_depth must be greater than 0"));
        }
        self.prediction.validate("prediction")?;
        self.explanation.validate("explanation")?;
        if self.routing.higher_tier_detour_min < 0 {
            return Err(Error::config(
                "routing.higher_tier_detour_min must not be negative",
            ));
        }
        Ok(())
    }
}

/// Correlation-engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum readings retained per case (FIFO eviction beyond this)
    pub trend_window: usize,

    /// GCS rate of change (points/min) below which deterioration adjusts
    /// probabilities
    pub gcs_deterioration_rate: f64,
    /// Stroke probability increment on significant GCS deterioration
    pub gcs_stroke_increment: f64,
    /// LVO probability increment on significant GCS deterioration
    pub gcs_lvo_increment: f64,

    /// SpO2 rate of change (%/min) below which deterioration adjusts
    /// probabilities
    pub spo2_deterioration_rate: f64,
    /// Stroke probability increment on significant SpO2 deterioration
    pub spo2_stroke_increment: f64,

    /// Feature vector version stamped into every evaluation
    pub features_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trend_window: DEFAULT_TREND_WINDOW,
            gcs_deterioration_rate: -0.1,
            gcs_stroke_increment: 0.05,
            gcs_lvo_increment: 0.03,
            spo2_deterioration_rate: -0.5,
            spo2_stroke_increment: 0.03,
            features_version: "v1".to_string(),
        }
    }
}

/// Routing inputs. Travel and distance estimates are configuration constants
/// standing in for a live routing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub travel_min_to_lower_tier: i64,
    pub travel_min_to_higher_tier: i64,
    pub distance_km_to_lower_tier: f64,
    pub distance_km_to_higher_tier: f64,
    /// Extra travel accepted to reach a higher-tier facility when LVO is
    /// suspected
    pub higher_tier_detour_min: i64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            travel_min_to_lower_tier: 8,
            travel_min_to_higher_tier: 15,
            distance_km_to_lower_tier: 5.0,
            distance_km_to_higher_tier: 12.0,
            higher_tier_detour_min: 15,
        }
    }
}

/// Evaluation worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_POOL_WORKERS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// One protected external dependency: breaker settings plus optional remote
/// endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Remote endpoint URL; `None` selects the built-in deterministic
    /// implementation
    pub endpoint: Option<String>,
    /// Model name stamped into emitted predictions
    pub model_name: String,
    /// Model version stamped into emitted predictions
    pub model_version: String,

    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the breaker closes
    pub success_threshold: u32,
    /// Seconds the breaker stays open before admitting a probe
    pub recovery_timeout_secs: u64,
    /// Per-request timeout for remote calls, distinct from the breaker's
    /// recovery timeout
    pub request_timeout_secs: u64,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model_name: "triage-risk-model".to_string(),
            model_version: "v1.0".to_string(),
            failure_threshold: 3,
            success_threshold: 2,
            recovery_timeout_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl DependencyConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(Error::config(format!(
                "{section}.failure_threshold must be greater than 0"
            )));
        }
        if self.success_threshold == 0 {
            return Err(Error::config(format!(
                "{section}.success_threshold must be greater than 0"
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config(format!(
                "{section}.request_timeout_secs must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Breaker recovery timeout as a duration
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TriageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.trend_window, 20);
        assert_eq!(config.prediction.failure_threshold, 3);
        assert_eq!(config.routing.higher_tier_detour_min, 15);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
engine:
  trend_window: 10
prediction:
  failure_threshold: 5
"#;
        let config: TriageConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine.trend_window, 10);
        assert_eq!(config.prediction.failure_threshold, 5);
        // untouched sections keep defaults
        assert_eq!(config.pool.workers, DEFAULT_POOL_WORKERS);
        assert_eq!(config.explanation.success_threshold, 2);
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = TriageConfig::default();
        config.pool.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_trend_window_rejected() {
        let mut config = TriageConfig::default();
        config.engine.trend_window = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn dependency_durations() {
        let dep = DependencyConfig::default();
        assert_eq!(dep.recovery_timeout(), Duration::from_secs(30));
        assert_eq!(dep.request_timeout(), Duration::from_secs(10));
    }
}
