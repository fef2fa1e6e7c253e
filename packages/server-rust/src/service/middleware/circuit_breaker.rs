//! Circuit breaker middleware.
//!
//! # States
//! - Closed: calls pass through; outcomes are counted per generation.
//! - Open: calls fail fast with `CircuitOpen` until the cool-down elapses.
//! - Half-Open: a limited number of trial calls decide between Closed and Open.
//!
//! # Transitions
//! ```text
//! Closed   -> Open:     trip policy fires on the current counts
//! Open     -> HalfOpen: cool-down elapsed (checked lazily on the next call)
//! HalfOpen -> Closed:   half_open_max_requests consecutive trial successes
//! HalfOpen -> Open:     any trial failure
//! ```
//!
//! Every transition starts a new generation with cleared counts. Outcomes
//! reported for an older generation are discarded. While closed, counts are
//! also cleared every `interval` (0 keeps them until the next transition).

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::service::config::{CircuitBreakerConfig, TripPolicy};
use crate::service::decorator::LabeledLayer;
use crate::service::operation::{BoxFuture, Call, ConfigError, OperationError};

// ---------------------------------------------------------------------------
// State and counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// Outcome counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// How a finished call is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Neither success nor failure; frees the admission slot.
    Ignored,
}

impl TripPolicy {
    fn should_trip(self, counts: &Counts) -> bool {
        match self {
            Self::ConsecutiveFailures { threshold } => counts.consecutive_failures >= threshold,
            Self::FailureRatio {
                ratio,
                min_requests,
            } => {
                counts.requests >= min_requests
                    && f64::from(counts.total_failures) / f64::from(counts.requests) >= ratio
            }
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub generation: u64,
    pub counts: Counts,
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    /// End of the current closed interval or open cool-down.
    expiry: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    trip: TripPolicy,
    interval: Duration,
    cooldown: Duration,
    half_open_max_requests: u32,
    count_rate_limited: bool,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` if `config` is invalid.
    pub fn new(config: &CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config.name.clone(), config))
    }

    fn from_validated(name: String, config: &CircuitBreakerConfig) -> Self {
        let breaker = Self {
            name,
            trip: config.trip,
            interval: config.interval(),
            cooldown: config.cooldown(),
            half_open_max_requests: config.half_open_max_requests,
            count_rate_limited: config.count_rate_limited,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: None,
            }),
        };
        breaker.new_generation(&mut breaker.inner.lock(), Instant::now());
        breaker
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying any due time-based transition.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        inner.state
    }

    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            generation: inner.generation,
            counts: inner.counts,
        }
    }

    /// Ask to run one call.
    ///
    /// The returned permit must be completed with the call's result; dropping
    /// it unfinished records a failure.
    ///
    /// # Errors
    ///
    /// `CircuitOpen` while open, `TooManyRequests` once every half-open trial
    /// slot is taken.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, OperationError> {
        let generation = self.before_request()?;
        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            generation,
            armed: true,
        })
    }

    fn before_request(&self) -> Result<u64, OperationError> {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());

        match inner.state {
            BreakerState::Open => {
                return Err(OperationError::CircuitOpen {
                    breaker: self.name.clone(),
                })
            }
            BreakerState::HalfOpen if inner.counts.requests >= self.half_open_max_requests => {
                return Err(OperationError::TooManyRequests {
                    breaker: self.name.clone(),
                })
            }
            _ => {}
        }
        inner.counts.on_request();
        Ok(inner.generation)
    }

    fn after_request(&self, generation: u64, outcome: Outcome) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        self.current_state(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        match (outcome, inner.state) {
            (Outcome::Ignored, _) => {
                inner.counts.requests = inner.counts.requests.saturating_sub(1);
            }
            (Outcome::Success, BreakerState::Closed) => inner.counts.on_success(),
            (Outcome::Success, BreakerState::HalfOpen) => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes >= self.half_open_max_requests {
                    self.set_state(&mut inner, BreakerState::Closed, now);
                }
            }
            (Outcome::Failure, BreakerState::Closed) => {
                inner.counts.on_failure();
                if self.trip.should_trip(&inner.counts) {
                    self.set_state(&mut inner, BreakerState::Open, now);
                }
            }
            (Outcome::Failure, BreakerState::HalfOpen) => {
                self.set_state(&mut inner, BreakerState::Open, now);
            }
            // Unreachable with a matching generation: nothing is admitted while open.
            (_, BreakerState::Open) => {}
        }
    }

    fn classify<T>(&self, result: &Result<T, OperationError>) -> Outcome {
        match result {
            Ok(_) => Outcome::Success,
            Err(OperationError::RateLimited) if !self.count_rate_limited => Outcome::Ignored,
            Err(_) => Outcome::Failure,
        }
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            BreakerState::Closed if expired => self.new_generation(inner, now),
            BreakerState::Open if expired => self.set_state(inner, BreakerState::HalfOpen, now),
            _ => {}
        }
    }

    fn set_state(&self, inner: &mut Inner, state: BreakerState, now: Instant) {
        if inner.state == state {
            return;
        }
        let from = inner.state;
        inner.state = state;
        self.new_generation(inner, now);
        warn!(breaker = %self.name, %from, to = %state, "circuit breaker state changed");
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            BreakerState::Closed if self.interval.is_zero() => None,
            BreakerState::Closed => Some(now + self.interval),
            BreakerState::Open => Some(now + self.cooldown),
            BreakerState::HalfOpen => None,
        };
    }
}

// ---------------------------------------------------------------------------
// BreakerPermit
// ---------------------------------------------------------------------------

/// Admission ticket for one call through a [`CircuitBreaker`].
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    armed: bool,
}

impl BreakerPermit {
    /// Report the call's result to the breaker.
    pub fn record<T>(mut self, result: &Result<T, OperationError>) {
        let outcome = self.breaker.classify(result);
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: Outcome) {
        if std::mem::take(&mut self.armed) {
            self.breaker.after_request(self.generation, outcome);
        }
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if self.armed {
            debug!(breaker = %self.breaker.name, "call abandoned before completion");
        }
        self.finish(Outcome::Failure);
    }
}

// ---------------------------------------------------------------------------
// CircuitBreakerLayer
// ---------------------------------------------------------------------------

/// Tower layer sharing one breaker across every unit it wraps.
#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` if `config` is invalid.
    pub fn new(config: &CircuitBreakerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            breaker: Arc::new(CircuitBreaker::new(config)?),
        })
    }

    /// A labeled layer that gives every wrapped operation its own breaker,
    /// named `"{name}/{operation}"`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` if `config` is invalid.
    pub fn per_operation(
        config: &CircuitBreakerConfig,
    ) -> Result<PerOperationCircuitBreaker, ConfigError> {
        config.validate()?;
        Ok(PerOperationCircuitBreaker {
            config: config.clone(),
        })
    }

    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

/// Labeled factory creating one [`CircuitBreaker`] per operation.
#[derive(Debug, Clone)]
pub struct PerOperationCircuitBreaker {
    config: CircuitBreakerConfig,
}

impl<S> LabeledLayer<S> for PerOperationCircuitBreaker {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, operation: &'static str, inner: S) -> Self::Service {
        let name = format!("{}/{operation}", self.config.name);
        CircuitBreakerService {
            inner,
            breaker: Arc::new(CircuitBreaker::from_validated(name, &self.config)),
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreakerService
// ---------------------------------------------------------------------------

/// Service wrapper that fails fast while its breaker is open.
#[derive(Debug, Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S, Req> Service<Call<Req>> for CircuitBreakerService<S>
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
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let fut = self.inner.call(call);
        Box::pin(async move {
            let result = fut.await;
            permit.record(&result);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
