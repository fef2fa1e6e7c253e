//! Token-bucket admission control.
//!
//! Each admitted call consumes one token; tokens refill continuously at a
//! fixed rate up to the bucket capacity. Calls arriving at an empty bucket
//! fail with `OperationError::RateLimited` without reaching the wrapped unit.

use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::warn;

use crate::service::config::RateLimitConfig;
use crate::service::decorator::LabeledLayer;
use crate::service::operation::{BoxFuture, Call, ConfigError, OperationError};

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, capacity: f64, refill_per_sec: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// A token bucket refilled lazily at admission time. Starts full.
#[derive(Debug)]
pub struct RateLimiter {
    label: String,
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` for a capacity below one or a
    /// non-positive refill rate.
    pub fn new(label: impl Into<String>, config: &RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(label.into(), config))
    }

    fn from_validated(label: String, config: &RateLimitConfig) -> Self {
        Self {
            label,
            capacity: config.capacity,
            refill_per_sec: config.refill_per_sec,
            bucket: Mutex::new(Bucket {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token if at least one is available.
    pub fn try_admit(&self) -> bool {
        let mut bucket = self.bucket.lock();
        bucket.refill(self.capacity, self.refill_per_sec);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently in the bucket, fractional part included.
    #[must_use]
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.refill(self.capacity, self.refill_per_sec);
        bucket.tokens
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

// ---------------------------------------------------------------------------
// RateLimitLayer
// ---------------------------------------------------------------------------

/// Tower layer sharing one bucket across every unit it wraps.
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` if `config` is invalid.
    pub fn new(label: impl Into<String>, config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            limiter: Arc::new(RateLimiter::new(label, config)?),
        })
    }

    /// A labeled layer that gives every wrapped operation its own bucket,
    /// labeled `"{prefix}/{operation}"`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` if `config` is invalid.
    pub fn per_operation(
        prefix: impl Into<String>,
        config: &RateLimitConfig,
    ) -> Result<PerOperationRateLimit, ConfigError> {
        config.validate()?;
        Ok(PerOperationRateLimit {
            prefix: prefix.into(),
            config: config.clone(),
        })
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Labeled factory creating one [`RateLimiter`] per operation.
#[derive(Debug, Clone)]
pub struct PerOperationRateLimit {
    prefix: String,
    config: RateLimitConfig,
}

impl<S> LabeledLayer<S> for PerOperationRateLimit {
    type Service = RateLimitService<S>;

    fn layer(&self, operation: &'static str, inner: S) -> Self::Service {
        let label = format!("{}/{operation}", self.prefix);
        RateLimitService {
            inner,
            limiter: Arc::new(RateLimiter::from_validated(label, &self.config)),
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitService
// ---------------------------------------------------------------------------

/// Service wrapper that admits calls only while its bucket has tokens.
#[derive(Debug, Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, Req> Service<Call<Req>> for RateLimitService<S>
where
    S: Service<Call<Req>, Error = OperationError>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = OperationError;
    type Future = BoxFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: Call<Req>) -> Self::Future {
        // A caller that already gave up must not spend a token.
        if call.ctx.is_cancelled() {
            return Box::pin(async { Err(OperationError::Cancelled) });
        }
        if !self.limiter.try_admit() {
            warn!(
                limiter = %self.limiter.label,
                trace_id = %call.ctx.trace_id,
                "rate limit exceeded"
            );
            return Box::pin(async { Err(OperationError::RateLimited) });
        }
        Box::pin(self.inner.call(call))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
