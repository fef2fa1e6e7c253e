//! Pipeline composition: applies the configured decorators to an endpoint set.

use std::fmt;
use std::sync::Arc;

use super::circuit_breaker::CircuitBreakerLayer;
use super::logging::{LoggingLayer, ObservationSink};
use super::metrics::MetricsLayer;
use super::rate_limit::RateLimitLayer;
use super::timeout::TimeoutLayer;
use super::trace::TracingLayer;
use crate::service::config::PipelineConfig;
use crate::service::endpoint::EndpointSet;
use crate::service::operation::{parse_operations, ConfigError, OperationId};

/// Decorate every endpoint of `set` as `config` describes.
///
/// Layers are applied innermost first, so the resulting order (outermost to
/// innermost) is:
/// 1. circuit breaker: fail fast while the unit below is unhealthy
/// 2. rate limit: rejections here count toward the breaker when configured
/// 3. tracing: opens the `rpc` span
/// 4. logging: reports one observation per call
/// 5. metrics: records count and latency per outcome
/// 6. timeout: closest to the unit, so a timed-out or cancelled call is
///    still observed by the three layers above
///
/// # Errors
///
/// Returns a `ConfigError` for an invalid threshold or an excluded operation
/// that `Op` does not define. Nothing is partially applied per decorator, but
/// decorators applied before the failing one stay applied.
pub fn wrap_endpoints<Op, Req, Resp>(
    set: &mut EndpointSet<Op, Req, Resp>,
    config: &PipelineConfig,
    sink: Arc<dyn ObservationSink>,
) -> Result<(), ConfigError>
where
    Op: OperationId,
    Req: fmt::Debug + Send + 'static,
    Resp: Send + 'static,
{
    let service = set.service_name();

    if let Some(timeout) = config.call_timeout() {
        set.wrap_all_except(TimeoutLayer::new(timeout), &[])?;
    }
    if config.metrics.enabled {
        let excluded = parse_operations::<Op, _>(&config.metrics.exclude)?;
        set.wrap_all_labeled_except(MetricsLayer::new(service), &excluded)?;
    }
    if config.logging.enabled {
        let excluded = parse_operations::<Op, _>(&config.logging.exclude)?;
        set.wrap_all_labeled_except(LoggingLayer::new(sink), &excluded)?;
    }
    if config.tracing.enabled {
        let excluded = parse_operations::<Op, _>(&config.tracing.exclude)?;
        set.wrap_all_labeled_except(TracingLayer, &excluded)?;
    }
    if let Some(rate_limit) = &config.rate_limit {
        let excluded = parse_operations::<Op, _>(&rate_limit.exclude)?;
        if rate_limit.per_operation {
            let layer = RateLimitLayer::per_operation(service, &rate_limit.settings)?;
            set.wrap_all_labeled_except(layer, &excluded)?;
        } else {
            let layer = RateLimitLayer::new(service, &rate_limit.settings)?;
            set.wrap_all_except(layer, &excluded)?;
        }
    }
    if let Some(breaker) = &config.circuit_breaker {
        let excluded = parse_operations::<Op, _>(&breaker.exclude)?;
        if breaker.per_operation {
            let layer = CircuitBreakerLayer::per_operation(&breaker.settings)?;
            set.wrap_all_labeled_except(layer, &excluded)?;
        } else {
            let layer = CircuitBreakerLayer::new(&breaker.settings)?;
            set.wrap_all_except(layer, &excluded)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
