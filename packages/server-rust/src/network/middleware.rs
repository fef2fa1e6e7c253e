//! HTTP middleware stack for the bookinfo server.
//!
//! Transport-level layers only; per-operation decorators (rate limiting,
//! circuit breaking, call logging) live in `service::middleware`. The first
//! layer listed is the outermost.

use std::time::Duration;

use axum::http::header::HeaderName;
use axum::http::StatusCode;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

/// Header carrying the request id; RPC handlers use it as the call's trace id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Slack between the call deadline and the HTTP timeout, so a slow call
/// reports its own `Timeout` (504) before the transport gives up (408).
pub const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            TraceLayer<
                tower_http::classify::SharedClassifier<
                    tower_http::classify::ServerErrorsAsFailures,
                >,
            >,
            tower::layer::util::Stack<
                SetRequestIdLayer<MakeRequestUuid>,
                tower::layer::util::Identity,
            >,
        >,
    >,
>;

/// Builds the HTTP-level middleware stack.
///
/// **Outermost to innermost:**
/// 1. `SetRequestId` -- assigns a UUID v4 `x-request-id` unless the client sent one
/// 2. `Tracing` -- request/response spans
/// 3. `Timeout` -- 408 once `request_timeout_ms` plus [`HTTP_TIMEOUT_MARGIN`] passes
/// 4. `PropagateRequestId` -- copies `x-request-id` onto the response
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout() + HTTP_TIMEOUT_MARGIN,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}
