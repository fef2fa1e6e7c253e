use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::OperationError;

/// Per-call context carrying tracing identity, deadline, and cancellation.
/// Threaded through every decorator down to the business logic.
///
/// Clones share the same cancellation token: cancelling any clone cancels
/// the call everywhere it is observed.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Distributed trace identifier for observability.
    pub trace_id: String,
    /// Point in time after which the caller no longer wants the result.
    pub deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    /// Creates a context with a freshly generated trace id and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_trace_id(uuid::Uuid::new_v4().to_string())
    }

    /// Creates a context carrying the given trace id.
    #[must_use]
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the deadline to `now + timeout`, keeping an earlier existing deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tighten_deadline(Instant::now() + timeout);
        self
    }

    /// Lowers the deadline to `deadline` if it is earlier than the current one.
    pub fn tighten_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
    }

    /// Time left before the deadline. `None` when no deadline is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancels the call. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the call is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Runs `fut` until it completes, the call is cancelled, or the deadline
    /// passes, whichever happens first.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::Cancelled` or `OperationError::Timeout` when the
    /// call is abandoned; otherwise whatever `fut` returns.
    pub async fn scope<T, F>(&self, fut: F) -> Result<T, OperationError>
    where
        F: Future<Output = Result<T, OperationError>>,
    {
        if self.is_cancelled() {
            return Err(OperationError::Cancelled);
        }
        match self.deadline {
            Some(deadline) => {
                let timeout_ms = duration_ms(deadline.saturating_duration_since(Instant::now()));
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(OperationError::Cancelled),
                    () = tokio::time::sleep_until(deadline) => Err(OperationError::Timeout { timeout_ms }),
                    result = fut => result,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(OperationError::Cancelled),
                    result = fut => result,
                }
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let ctx = CallContext::with_trace_id("t-1");
        let clone = ctx.clone();
        assert!(!clone.is_cancelled());
        ctx.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.trace_id, "t-1");
    }

    #[test]
    fn new_generates_distinct_trace_ids() {
        let a = CallContext::new();
        let b = CallContext::new();
        assert_ne!(a.trace_id, b.trace_id);
        assert!(a.deadline.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_keeps_earlier_deadline() {
        let ctx = CallContext::new()
            .with_timeout(Duration::from_millis(100))
            .with_timeout(Duration::from_secs(10));
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn scope_returns_inner_result() {
        let ctx = CallContext::new();
        let out = ctx.scope(async { Ok::<_, OperationError>(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn scope_rejects_already_cancelled_call() {
        let ctx = CallContext::new();
        ctx.cancel();
        let err = ctx
            .scope(async { Ok::<_, OperationError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn scope_times_out_at_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        let err = ctx
            .scope(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, OperationError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Timeout { timeout_ms: 50 }));
    }

    #[tokio::test]
    async fn scope_observes_cancel_mid_flight() {
        let ctx = CallContext::new();
        let trigger = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = ctx
            .scope(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, OperationError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Cancelled));
    }
}
