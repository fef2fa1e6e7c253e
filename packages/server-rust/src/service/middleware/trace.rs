//! Span-per-call tracing middleware.
//!
//! Runs the wrapped unit inside an `rpc` span carrying the operation name and
//! trace id, so every event emitted further in is attributed to the call.
//! Duration and outcome are recorded on the span when the call finishes.

use std::task::{Context, Poll};

use tokio::time::Instant;
use tower::Service;
use tracing::{info_span, Instrument};

use crate::service::decorator::LabeledLayer;
use crate::service::operation::{BoxFuture, Call, OperationError};

// ---------------------------------------------------------------------------
// TracingLayer
// ---------------------------------------------------------------------------

/// Labeled layer opening one `rpc` span per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLayer;

impl<S> LabeledLayer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, operation: &'static str, inner: S) -> Self::Service {
        TracingService { inner, operation }
    }
}

// ---------------------------------------------------------------------------
// TracingService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TracingService<S> {
    inner: S,
    operation: &'static str,
}

impl<S, Req> Service<Call<Req>> for TracingService<S>
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
        let span = info_span!(
            "rpc",
            operation = self.operation,
            trace_id = %call.ctx.trace_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        // Entered so that the inner `call` itself runs inside the span too.
        let fut = span.in_scope(|| self.inner.call(call));

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(err) => err.label(),
                };
                let current = tracing::Span::current();
                current.record("duration_ms", duration_ms);
                current.record("outcome", outcome);

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bookinfo_core::CallContext;
    use tower::ServiceExt;

    use super::*;
    use crate::service::decorator::{unit_fn, Endpoint, IntoEndpoint};

    #[tokio::test]
    async fn passes_result_through() {
        let svc = TracingLayer
            .layer(
                "Get",
                unit_fn(|call: Call<u32>| async move { Ok(call.request * 2) }),
            )
            .into_endpoint();
        let resp = svc.oneshot(Call::new(CallContext::new(), 21)).await.unwrap();
        assert_eq!(resp, 42);
    }

    #[tokio::test]
    async fn inner_unit_runs_inside_rpc_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());

        let seen: Arc<Mutex<Option<&'static str>>> = Arc::new(Mutex::new(None));
        let record = Arc::clone(&seen);
        let unit: Endpoint<(), ()> = unit_fn(move |_call: Call<()>| {
            let record = Arc::clone(&record);
            async move {
                let name = tracing::Span::current().metadata().map(|meta| meta.name());
                *record.lock().unwrap() = name;
                Ok(())
            }
        });

        let svc = TracingLayer.layer("Post", unit).into_endpoint();
        svc.oneshot(Call::new(CallContext::new(), ())).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some("rpc"));
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let svc = TracingLayer
            .layer(
                "Detail",
                unit_fn(|_call: Call<()>| async { Err::<(), _>(OperationError::RateLimited) }),
            )
            .into_endpoint();
        let err = svc.oneshot(Call::new(CallContext::new(), ())).await.unwrap_err();
        assert!(matches!(err, OperationError::RateLimited));
    }
}
