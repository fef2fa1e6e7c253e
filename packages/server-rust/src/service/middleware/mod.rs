//! Tower middleware layers for the endpoint pipeline.
//!
//! - [`metrics`]: Call counts and latency via the `metrics` facade
//! - [`logging`]: One observation per call, sent to a pluggable sink
//! - [`trace`]: One `rpc` span per call
//! - [`timeout`]: Per-call deadline enforcement
//! - [`rate_limit`]: Token-bucket admission control
//! - [`circuit_breaker`]: Closed/open/half-open failure protection
//! - [`pipeline`]: Applies the configured layers to an endpoint set

pub mod circuit_breaker;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod timeout;
pub mod trace;

pub use circuit_breaker::{BreakerSnapshot, BreakerState, CircuitBreaker, CircuitBreakerLayer};
pub use logging::{ChannelSink, LoggingLayer, Observation, ObservationSink, TracingSink};
pub use metrics::MetricsLayer;
pub use pipeline::wrap_endpoints;
pub use rate_limit::{RateLimitLayer, RateLimiter};
pub use timeout::TimeoutLayer;
pub use trace::TracingLayer;
