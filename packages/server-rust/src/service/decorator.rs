//! Callable units and the decorators that wrap them.
//!
//! A callable unit ([`Endpoint`]) is a type-erased `tower::Service<Call<Req>>`.
//! A decorator is any `tower::Layer` whose output is again a callable unit; a
//! labeled decorator ([`LabeledLayer`]) additionally receives the name of the
//! operation it is wrapping.

use std::future::Future;

use tower::util::BoxCloneSyncService;
use tower::Service;

use super::operation::{Call, OperationError};

/// Uniform callable unit: request plus context in, response or error out.
///
/// Cloning is cheap and clones share whatever state the wrapped decorators
/// hold (rate-limit buckets, breaker counters).
pub type Endpoint<Req, Resp> = BoxCloneSyncService<Call<Req>, Resp, OperationError>;

// ---------------------------------------------------------------------------
// IntoEndpoint
// ---------------------------------------------------------------------------

/// Services that can be erased into an [`Endpoint`].
pub trait IntoEndpoint<Req, Resp> {
    fn into_endpoint(self) -> Endpoint<Req, Resp>;
}

impl<S, Req, Resp> IntoEndpoint<Req, Resp> for S
where
    S: Service<Call<Req>, Response = Resp, Error = OperationError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    fn into_endpoint(self) -> Endpoint<Req, Resp> {
        BoxCloneSyncService::new(self)
    }
}

/// Build an innermost callable unit from an async function.
///
/// The returned future is raced against the call's cancellation token and
/// deadline, so business logic that never checks its context still stops
/// when the caller gives up.
pub fn unit_fn<Req, Resp, F, Fut>(f: F) -> Endpoint<Req, Resp>
where
    F: Fn(Call<Req>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, OperationError>> + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    tower::service_fn(move |call: Call<Req>| {
        let ctx = call.ctx.clone();
        let fut = f(call);
        async move { ctx.scope(fut).await }
    })
    .into_endpoint()
}

// ---------------------------------------------------------------------------
// LabeledLayer
// ---------------------------------------------------------------------------

/// A decorator that is told which operation it is wrapping.
///
/// Lets one generic decorator (metrics, per-operation rate limits) tag its
/// behavior by operation without being duplicated per operation.
pub trait LabeledLayer<S> {
    type Service;

    fn layer(&self, operation: &'static str, inner: S) -> Self::Service;
}

/// Labeled decorator built from a closure. See [`labeled_fn`].
#[derive(Debug, Clone, Copy)]
pub struct LabeledFn<F> {
    f: F,
}

/// Wrap a closure `Fn(&'static str, S) -> Out` as a [`LabeledLayer`].
pub fn labeled_fn<F>(f: F) -> LabeledFn<F> {
    LabeledFn { f }
}

impl<F, S, Out> LabeledLayer<S> for LabeledFn<F>
where
    F: Fn(&'static str, S) -> Out,
{
    type Service = Out;

    fn layer(&self, operation: &'static str, inner: S) -> Self::Service {
        (self.f)(operation, inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
