/// Errors returned by a call through the endpoint pipeline.
///
/// Fail-fast variants (`RateLimited`, `CircuitOpen`, `TooManyRequests`) are
/// produced by decorators that short-circuit. Upstream variants
/// (`InvalidArgument`, `NotFound`, `Internal`) come from business logic and
/// travel through every decorator untouched.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("rate limit exceeded, try again later")]
    RateLimited,
    #[error("circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: String },
    #[error("circuit breaker '{breaker}' is half-open and has no trial slots left")]
    TooManyRequests { breaker: String },
    #[error("call cancelled by caller")]
    Cancelled,
    #[error("call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },
    #[error("request does not match operation {operation}")]
    WrongRequest { operation: &'static str },
    #[error("unexpected response type from operation {operation}")]
    UnexpectedResponse { operation: &'static str },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Stable snake_case kind, used as a log field and metric label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::TooManyRequests { .. } => "too_many_requests",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::WrongRequest { .. } => "wrong_request",
            Self::UnexpectedResponse { .. } => "unexpected_response",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }

    /// True for errors a decorator produced without invoking the wrapped unit.
    #[must_use]
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::CircuitOpen { .. } | Self::TooManyRequests { .. }
        )
    }
}
