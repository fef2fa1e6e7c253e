//! Wires the in-memory business services through their configured decorator
//! pipelines and hands back typed, decorated clients.

use std::sync::Arc;

use bookinfo_core::{BookComments, BookDetails};
use tracing::info;

use super::config::ServerConfig;
use super::domain::{
    make_comments_endpoints, make_details_endpoints, CommentsClient, DetailsClient,
    InMemoryComments, InMemoryDetails,
};
use super::middleware::{wrap_endpoints, ObservationSink};
use super::operation::ConfigError;

/// The decorated services the HTTP layer calls into.
#[derive(Clone)]
pub struct Services {
    pub comments: Arc<dyn BookComments>,
    pub details: Arc<dyn BookDetails>,
}

impl Services {
    /// Decorates the given business implementations with the pipelines in
    /// `config`. Every observation goes to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` raised while validating thresholds or
    /// resolving exclusion lists.
    pub fn build(
        config: &ServerConfig,
        comments: Arc<dyn BookComments>,
        details: Arc<dyn BookDetails>,
        sink: Arc<dyn ObservationSink>,
    ) -> Result<Self, ConfigError> {
        let mut comment_endpoints = make_comments_endpoints(comments)?;
        wrap_endpoints(&mut comment_endpoints, &config.comments, Arc::clone(&sink))?;

        let mut detail_endpoints = make_details_endpoints(details)?;
        wrap_endpoints(&mut detail_endpoints, &config.details, sink)?;

        info!(
            comments = comment_endpoints.len(),
            details = detail_endpoints.len(),
            "endpoint pipelines assembled"
        );

        Ok(Self {
            comments: Arc::new(CommentsClient::new(Arc::new(comment_endpoints))),
            details: Arc::new(DetailsClient::new(Arc::new(detail_endpoints))),
        })
    }

    /// [`build`](Self::build) over an empty comment store and the sample
    /// book catalogue.
    ///
    /// # Errors
    ///
    /// As [`build`](Self::build).
    pub fn in_memory(
        config: &ServerConfig,
        sink: Arc<dyn ObservationSink>,
    ) -> Result<Self, ConfigError> {
        Self::build(
            config,
            Arc::new(InMemoryComments::new()),
            Arc::new(InMemoryDetails::sample()),
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use bookinfo_core::messages::{DetailReq, GetReq, PostReq};
    use bookinfo_core::{CallContext, OperationError};

    use super::*;
    use crate::service::config::{
        CircuitBreakerConfig, Decorated, PipelineConfig, ToggleConfig, TripPolicy,
    };
    use crate::service::middleware::{ChannelSink, TracingSink};

    #[tokio::test]
    async fn default_config_serves_both_services() {
        let services = Services::in_memory(&ServerConfig::default(), Arc::new(TracingSink)).unwrap();
        let ctx = CallContext::new();

        services
            .comments
            .post(
                &ctx,
                PostReq {
                    book_id: 1,
                    author: "ada".into(),
                    content: "first".into(),
                },
            )
            .await
            .unwrap();
        let listed = services.comments.get(&ctx, GetReq { book_id: 1 }).await.unwrap();
        assert_eq!(listed.comments.len(), 1);

        let detail = services.details.detail(&ctx, DetailReq { id: 1 }).await.unwrap();
        assert_eq!(detail.detail.id, 1);
    }

    #[tokio::test]
    async fn logging_exclusion_applies_per_service() {
        let mut config = ServerConfig::default();
        config.comments.logging = ToggleConfig {
            enabled: true,
            exclude: vec!["Get".into()],
        };
        let (sink, mut rx) = ChannelSink::new(16);
        let services = Services::in_memory(&config, Arc::new(sink)).unwrap();
        let ctx = CallContext::with_trace_id("t-1");

        services.comments.get(&ctx, GetReq { book_id: 7 }).await.unwrap();
        services.details.detail(&ctx, DetailReq { id: 2 }).await.unwrap();

        let only = rx.recv().await.unwrap();
        assert_eq!(only.operation, "Detail");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_exclusion_fails_assembly() {
        let mut config = ServerConfig::default();
        config.details.metrics.exclude = vec!["Post".into()];
        let err = Services::in_memory(&config, Arc::new(TracingSink)).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownExclusion { .. }));
    }

    #[tokio::test]
    async fn comments_breaker_opens_on_repeated_failures() {
        let mut config = ServerConfig::default();
        config.comments = PipelineConfig {
            circuit_breaker: Some(Decorated::new(CircuitBreakerConfig {
                name: "comments".into(),
                trip: TripPolicy::ConsecutiveFailures { threshold: 2 },
                ..CircuitBreakerConfig::default()
            })),
            ..PipelineConfig::default()
        };
        let services = Services::in_memory(&config, Arc::new(TracingSink)).unwrap();
        let ctx = CallContext::new();
        let bad = || PostReq {
            book_id: 1,
            author: String::new(),
            content: "x".into(),
        };

        for _ in 0..2 {
            let err = services.comments.post(&ctx, bad()).await.unwrap_err();
            assert!(matches!(err, OperationError::InvalidArgument(_)));
        }
        let err = services.comments.get(&ctx, GetReq { book_id: 1 }).await.unwrap_err();
        assert!(matches!(err, OperationError::CircuitOpen { .. }));
    }
}
