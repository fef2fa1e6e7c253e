//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use bookinfo_core::{BookComments, BookDetails};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    get_comments_handler, get_detail_handler, health_handler, liveness_handler,
    post_comment_handler, readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates shared state (services, shutdown controller)
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled, then drains
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    comments: Arc<dyn BookComments>,
    details: Arc<dyn BookDetails>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a network module serving the given (decorated) services,
    /// without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        comments: Arc<dyn BookComments>,
        details: Arc<dyn BookDetails>,
    ) -> Self {
        Self {
            config,
            listener: None,
            comments,
            details,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `POST /v1/comments` -- post a comment (`PostReq` JSON body)
    /// - `GET /v1/comments/{book_id}` -- comments of one book
    /// - `GET /v1/detail/{id}` -- book details
    /// - `GET /health` -- health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    pub fn build_router(&self) -> Router {
        let state = AppState {
            comments: Arc::clone(&self.comments),
            details: Arc::clone(&self.details),
            shutdown: Arc::clone(&self.shutdown),
            call_timeout: self.config.request_timeout(),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/v1/comments", post(post_comment_handler))
            .route("/v1/comments/{book_id}", get(get_comments_handler))
            .route("/v1/detail/{id}", get(get_detail_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the bound port, which differs from the configured one when
    /// port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then drains in-flight
    /// requests for up to `drain_timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);

        controller.set_ready();
        info!("serving HTTP connections");

        let draining = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                draining.begin_drain();
            })
            .await?;

        if controller.wait_for_drain(self.config.drain_timeout()).await {
            info!("all in-flight requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bookinfo_core::messages::PostReq;
    use tower::ServiceExt;

    use super::*;
    use crate::service::config::{Decorated, PipelineConfig, RateLimitConfig, ServerConfig};
    use crate::service::domain::{InMemoryComments, InMemoryDetails};
    use crate::service::middleware::{ChannelSink, Observation};
    use crate::service::Services;

    fn plain_module() -> NetworkModule {
        let config = NetworkConfig {
            port: 0,
            ..NetworkConfig::default()
        };
        NetworkModule::new(
            config,
            Arc::new(InMemoryComments::new()),
            Arc::new(InMemoryDetails::sample()),
        )
    }

    /// A module over fully decorated services, plus the observations they emit.
    fn decorated_module(
        config: ServerConfig,
    ) -> (NetworkModule, tokio::sync::mpsc::Receiver<Observation>) {
        let (sink, rx) = ChannelSink::new(64);
        let services = Services::in_memory(&config, Arc::new(sink)).unwrap();
        let module = NetworkModule::new(config.network, services.comments, services.details);
        (module, rx)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = plain_module();
        assert!(module.listener.is_none());
        assert!(Arc::ptr_eq(&module.shutdown_controller(), &module.shutdown_controller()));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = plain_module();
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = plain_module();
        let err = module.serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let mut module = plain_module();
        module.start().await.unwrap();
        let controller = module.shutdown_controller();

        module.serve(async {}).await.unwrap();
        assert_eq!(controller.health_state(), crate::network::HealthState::Stopped);
    }

    #[tokio::test]
    async fn post_then_list_comments_over_http() {
        let router = plain_module().build_router();
        let req = PostReq {
            book_id: 3,
            author: "ada".into(),
            content: "a classic".into(),
        };
        let post = Request::builder()
            .method("POST")
            .uri("/v1/comments")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&req).unwrap()))
            .unwrap();

        let response = router.clone().oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["comment"]["author"], "ada");

        let response = router.oneshot(get("/v1/comments/3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["comments"].as_array().unwrap().len(), 1);
        assert_eq!(body["comments"][0]["bookId"], 3);
    }

    #[tokio::test]
    async fn unknown_book_is_404_with_error_kind() {
        let router = plain_module().build_router();
        let response = router.oneshot(get("/v1/detail/999")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn request_id_is_propagated_and_used_as_trace_id() {
        let (module, mut rx) = decorated_module(ServerConfig::default());
        let router = module.build_router();

        let request = Request::builder()
            .uri("/v1/detail/1")
            .header("x-request-id", "trace-abc")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "trace-abc");

        let observation = rx.recv().await.unwrap();
        assert_eq!(observation.operation, "Detail");
        assert_eq!(observation.trace_id, "trace-abc");
    }

    #[tokio::test]
    async fn rate_limited_detail_is_429() {
        let mut config = ServerConfig::default();
        config.details = PipelineConfig {
            rate_limit: Some(Decorated::new(RateLimitConfig {
                capacity: 1.0,
                refill_per_sec: 0.001,
            })),
            ..PipelineConfig::default()
        };
        let (module, _rx) = decorated_module(config);
        let router = module.build_router();

        let response = router.clone().oneshot(get("/v1/detail/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = router.oneshot(get("/v1/detail/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["error"], "rate_limited");
    }

    /// Catalogue that never answers within any reasonable deadline.
    struct StalledDetails;

    #[async_trait::async_trait]
    impl BookDetails for StalledDetails {
        async fn detail(
            &self,
            _ctx: &bookinfo_core::CallContext,
            _req: bookinfo_core::messages::DetailReq,
        ) -> Result<bookinfo_core::messages::DetailResp, bookinfo_core::OperationError> {
            tokio::time::sleep(std::time::Duration::from_secs(3_600)).await;
            Err(bookinfo_core::OperationError::NotFound("never".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_hits_call_deadline_before_http_timeout() {
        let config = NetworkConfig {
            port: 0,
            request_timeout_ms: 100,
            ..NetworkConfig::default()
        };
        let module = NetworkModule::new(
            config,
            Arc::new(InMemoryComments::new()),
            Arc::new(StalledDetails),
        );

        let response = module.build_router().oneshot(get("/v1/detail/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(response).await["error"], "timeout");
    }

    #[tokio::test]
    async fn health_routes_respond() {
        let router = plain_module().build_router();
        let response = router.clone().oneshot(get("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Not serving yet, so not ready.
        let response = router.clone().oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = router.oneshot(get("/health")).await.unwrap();
        assert_eq!(body_json(response).await["state"], "starting");
    }
}
