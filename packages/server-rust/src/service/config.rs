//! Server configuration: per-service decorator pipelines and their policies.
//!
//! Loaded from TOML at startup and validated before anything is built.
//! Every numeric threshold and every excluded operation name is checked
//! here, so a bad config aborts startup instead of surfacing per request.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::domain::{CommentsOp, DetailsOp};
use super::operation::{parse_operations, ConfigError, OperationId};
use crate::network::NetworkConfig;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Top-level configuration for the bookinfo server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    /// Decorators around the comments service (`Post`, `Get`).
    pub comments: PipelineConfig,
    /// Decorators around the details service (`Detail`). A `[details]`
    /// table replaces the production defaults as a whole.
    pub details: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            comments: PipelineConfig::default(),
            details: PipelineConfig::details(),
        }
    }
}

impl ServerConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed TOML and any error from
    /// [`validate`](Self::validate).
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check thresholds and resolve every exclusion list against the
    /// operations of its service.
    ///
    /// # Errors
    ///
    /// Returns the first invalid threshold or unknown operation name found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        self.comments.validate::<CommentsOp>()?;
        self.details.validate::<DetailsOp>()
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Which decorators wrap one service's endpoints, and with what settings.
///
/// Applied innermost first: metrics, logging, tracing, timeout, rate limit,
/// circuit breaker. The breaker is therefore outermost and sees rate-limit
/// rejections as errors of the unit it guards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-call timeout. `None` leaves the caller's deadline as the only bound.
    pub call_timeout_ms: Option<u64>,
    pub metrics: ToggleConfig,
    pub logging: ToggleConfig,
    pub tracing: ToggleConfig,
    pub rate_limit: Option<Decorated<RateLimitConfig>>,
    pub circuit_breaker: Option<Decorated<CircuitBreakerConfig>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: Some(10_000),
            metrics: ToggleConfig::default(),
            logging: ToggleConfig::default(),
            tracing: ToggleConfig::default(),
            rate_limit: None,
            circuit_breaker: None,
        }
    }
}

impl PipelineConfig {
    /// Production defaults for the details service: 1000 tokens/s with a
    /// burst of 10000, and a breaker named after the HTTP route.
    #[must_use]
    pub fn details() -> Self {
        Self {
            rate_limit: Some(Decorated::new(RateLimitConfig {
                capacity: 10_000.0,
                refill_per_sec: 1_000.0,
            })),
            circuit_breaker: Some(Decorated::new(CircuitBreakerConfig {
                name: "/v1/detail".to_string(),
                interval_ms: 1_000,
                half_open_max_requests: 50_000,
                ..CircuitBreakerConfig::default()
            })),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Validate thresholds and exclusion names for the service `Op`.
    ///
    /// # Errors
    ///
    /// Returns the first invalid threshold or unknown operation name.
    pub fn validate<Op: OperationId>(&self) -> Result<(), ConfigError> {
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidThreshold {
                field: "call_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        parse_operations::<Op, _>(&self.metrics.exclude)?;
        parse_operations::<Op, _>(&self.logging.exclude)?;
        parse_operations::<Op, _>(&self.tracing.exclude)?;
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.settings.validate()?;
            parse_operations::<Op, _>(&rate_limit.exclude)?;
        }
        if let Some(breaker) = &self.circuit_breaker {
            breaker.settings.validate()?;
            parse_operations::<Op, _>(&breaker.exclude)?;
        }
        Ok(())
    }
}

/// On/off switch plus exclusion list for a decorator without settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub enabled: bool,
    pub exclude: Vec<String>,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude: Vec::new(),
        }
    }
}

/// Decorator settings plus how they are applied across a service.
#[derive(Debug, Clone, Deserialize)]
pub struct Decorated<T> {
    #[serde(flatten)]
    pub settings: T,
    /// One independent state object per operation instead of one shared by
    /// every wrapped operation.
    #[serde(default)]
    pub per_operation: bool,
    /// Operation names left undecorated.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl<T> Decorated<T> {
    #[must_use]
    pub fn new(settings: T) -> Self {
        Self {
            settings,
            per_operation: false,
            exclude: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Token-bucket parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket size: the largest burst admitted after idling.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_per_sec: f64,
}

impl RateLimitConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` unless `capacity >= 1` and
    /// `refill_per_sec > 0`, both finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.capacity.is_finite() || self.capacity < 1.0 {
            return Err(ConfigError::InvalidThreshold {
                field: "rate_limit.capacity",
                reason: format!("must be a finite number >= 1, got {}", self.capacity),
            });
        }
        if !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                field: "rate_limit.refill_per_sec",
                reason: format!("must be a finite number > 0, got {}", self.refill_per_sec),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Circuit breaking
// ---------------------------------------------------------------------------

/// When a closed breaker opens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripPolicy {
    /// Open after `threshold` failures in a row.
    ConsecutiveFailures { threshold: u32 },
    /// Open once at least `min_requests` calls were seen in the current
    /// window and the failed share reaches `ratio`.
    FailureRatio { ratio: f64, min_requests: u32 },
}

impl Default for TripPolicy {
    fn default() -> Self {
        Self::ConsecutiveFailures { threshold: 6 }
    }
}

impl TripPolicy {
    fn validate(self) -> Result<(), ConfigError> {
        match self {
            Self::ConsecutiveFailures { threshold: 0 } => Err(ConfigError::InvalidThreshold {
                field: "circuit_breaker.trip.threshold",
                reason: "must be at least 1".to_string(),
            }),
            Self::FailureRatio { ratio, .. } if !(ratio > 0.0 && ratio <= 1.0) => {
                Err(ConfigError::InvalidThreshold {
                    field: "circuit_breaker.trip.ratio",
                    reason: format!("must be in (0, 1], got {ratio}"),
                })
            }
            Self::FailureRatio { min_requests: 0, .. } => Err(ConfigError::InvalidThreshold {
                field: "circuit_breaker.trip.min_requests",
                reason: "must be at least 1".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Circuit breaker parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Identifier used in errors and logs.
    pub name: String,
    #[serde(default)]
    pub trip: TripPolicy,
    /// Period after which a closed breaker forgets its counts. 0 = never.
    #[serde(default)]
    pub interval_ms: u64,
    /// How long an open breaker rejects calls before admitting trials.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Trial calls admitted while half-open; this many consecutive
    /// successes close the breaker.
    #[serde(default = "default_half_open_max_requests")]
    pub half_open_max_requests: u32,
    /// Whether `RateLimited` errors from the wrapped unit count as failures.
    /// Must be stated explicitly in config files.
    pub count_rate_limited: bool,
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_half_open_max_requests() -> u32 {
    1
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            trip: TripPolicy::default(),
            interval_ms: 0,
            cooldown_ms: default_cooldown_ms(),
            half_open_max_requests: default_half_open_max_requests(),
            count_rate_limited: true,
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` for an empty name, a zero
    /// cool-down, zero half-open trials, or an invalid trip policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidThreshold {
                field: "circuit_breaker.name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cooldown_ms == 0 {
            return Err(ConfigError::InvalidThreshold {
                field: "circuit_breaker.cooldown_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.half_open_max_requests == 0 {
            return Err(ConfigError::InvalidThreshold {
                field: "circuit_breaker.half_open_max_requests",
                reason: "must be at least 1".to_string(),
            });
        }
        self.trip.validate()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
