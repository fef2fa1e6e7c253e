//! Metrics middleware.
//!
//! Counts calls by outcome and records their latency through the `metrics`
//! facade. Whatever recorder the process installs receives the values; with
//! none installed the macros are no-ops.

use std::task::{Context, Poll};

use metrics::{counter, histogram};
use tokio::time::Instant;
use tower::Service;

use crate::service::decorator::LabeledLayer;
use crate::service::operation::{BoxFuture, Call, OperationError};

pub const REQUESTS_TOTAL: &str = "bookinfo_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "bookinfo_request_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Labeled layer recording per-operation call counts and latencies.
#[derive(Debug, Clone, Copy)]
pub struct MetricsLayer {
    service: &'static str,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }
}

impl<S> LabeledLayer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, operation: &'static str, inner: S) -> Self::Service {
        MetricsService {
            inner,
            service: self.service,
            operation,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    service: &'static str,
    operation: &'static str,
}

impl<S, Req> Service<Call<Req>> for MetricsService<S>
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
        let service = self.service;
        let operation = self.operation;
        let fut = self.inner.call(call);

        Box::pin(async move {
            let start = Instant::now();
            let result = fut.await;
            let outcome = match &result {
                Ok(_) => "ok",
                Err(err) => err.label(),
            };

            counter!(
                REQUESTS_TOTAL,
                "service" => service,
                "operation" => operation,
                "outcome" => outcome,
            )
            .increment(1);
            histogram!(
                REQUEST_DURATION_SECONDS,
                "service" => service,
                "operation" => operation,
            )
            .record(start.elapsed().as_secs_f64());

            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use bookinfo_core::CallContext;
    use tower::ServiceExt;

    use super::*;
    use crate::service::decorator::{unit_fn, IntoEndpoint};

    #[tokio::test]
    async fn passes_through_response() {
        let svc = MetricsLayer::new("details")
            .layer(
                "Detail",
                unit_fn(|call: Call<String>| async move { Ok(call.request.len()) }),
            )
            .into_endpoint();
        let resp = svc
            .oneshot(Call::new(CallContext::new(), "abc".to_string()))
            .await
            .unwrap();
        assert_eq!(resp, 3);
    }

    #[tokio::test]
    async fn passes_through_error() {
        let svc = MetricsLayer::new("comments")
            .layer(
                "Post",
                unit_fn(|_call: Call<()>| async {
                    Err::<(), _>(OperationError::InvalidArgument("empty content".into()))
                }),
            )
            .into_endpoint();
        let err = svc.oneshot(Call::new(CallContext::new(), ())).await.unwrap_err();
        assert!(matches!(err, OperationError::InvalidArgument(_)));
    }
}
