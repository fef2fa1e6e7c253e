//! Call logging middleware.
//!
//! Times each call and reports an [`Observation`] to an injected
//! [`ObservationSink`] once the call finishes. The call's result is never
//! altered, and a misbehaving sink cannot fail the call.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tower::Service;
use tracing::{debug, info, warn};

use crate::service::decorator::LabeledLayer;
use crate::service::operation::{BoxFuture, Call, OperationError};

/// Longest request summary kept in an observation, in characters.
const MAX_SUMMARY_CHARS: usize = 256;

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Error half of an [`Observation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedError {
    /// Stable kind, see `OperationError::label`.
    pub kind: &'static str,
    pub message: String,
    /// A decorator rejected the call without invoking the unit.
    pub fail_fast: bool,
}

/// What the logging decorator knows about one finished call.
#[derive(Debug, Clone)]
pub struct Observation {
    pub operation: &'static str,
    pub trace_id: String,
    /// Debug rendering of the request, truncated.
    pub request: String,
    pub duration: Duration,
    /// `None` for a successful call.
    pub error: Option<ObservedError>,
}

/// Receiver of observations. Must not block.
pub trait ObservationSink: fmt::Debug + Send + Sync + 'static {
    fn observe(&self, observation: &Observation);
}

/// Emits each observation as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservationSink for TracingSink {
    fn observe(&self, observation: &Observation) {
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = observation.duration.as_millis() as u64;
        match &observation.error {
            None => info!(
                operation = observation.operation,
                trace_id = %observation.trace_id,
                request = %observation.request,
                duration_ms,
                "call succeeded"
            ),
            Some(error) if error.fail_fast => info!(
                operation = observation.operation,
                trace_id = %observation.trace_id,
                duration_ms,
                error_kind = error.kind,
                "call rejected"
            ),
            Some(error) => warn!(
                operation = observation.operation,
                trace_id = %observation.trace_id,
                request = %observation.request,
                duration_ms,
                error_kind = error.kind,
                error = %error.message,
                "call failed"
            ),
        }
    }
}

/// Forwards observations into a bounded channel, dropping them when full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Observation>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Observation>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ObservationSink for ChannelSink {
    fn observe(&self, observation: &Observation) {
        if let Err(err) = self.tx.try_send(observation.clone()) {
            debug!(operation = observation.operation, %err, "observation dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Labeled layer reporting every call of the wrapped operation to a sink.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    sink: Arc<dyn ObservationSink>,
}

impl LoggingLayer {
    #[must_use]
    pub fn new(sink: Arc<dyn ObservationSink>) -> Self {
        Self { sink }
    }
}

impl<S> LabeledLayer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, operation: &'static str, inner: S) -> Self::Service {
        LoggingService {
            inner,
            operation,
            sink: Arc::clone(&self.sink),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
    operation: &'static str,
    sink: Arc<dyn ObservationSink>,
}

impl<S, Req> Service<Call<Req>> for LoggingService<S>
where
    S: Service<Call<Req>, Error = OperationError>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: fmt::Debug,
{
    type Response = S::Response;
    type Error = OperationError;
    type Future = BoxFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: Call<Req>) -> Self::Future {
        let operation = self.operation;
        let sink = Arc::clone(&self.sink);
        let trace_id = call.ctx.trace_id.clone();
        let request = summarize(&call.request);
        let fut = self.inner.call(call);

        Box::pin(async move {
            let start = Instant::now();
            let result = fut.await;
            let observation = Observation {
                operation,
                trace_id,
                request,
                duration: start.elapsed(),
                error: result.as_ref().err().map(|err| ObservedError {
                    kind: err.label(),
                    message: err.to_string(),
                    fail_fast: err.is_fail_fast(),
                }),
            };
            if catch_unwind(AssertUnwindSafe(|| sink.observe(&observation))).is_err() {
                warn!(operation, "observation sink panicked");
            }
            result
        })
    }
}

fn summarize(request: &impl fmt::Debug) -> String {
    let rendered = format!("{request:?}");
    match rendered.char_indices().nth(MAX_SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}...", &rendered[..cut]),
        None => rendered,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
