//! Book comments service: operations, in-memory store, endpoints, and client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bookinfo_core::messages::{
    CommentsRequest, CommentsResponse, GetReq, GetResp, PostReq, PostResp,
};
use bookinfo_core::{BookComments, CallContext, Comment, OperationError};
use dashmap::DashMap;
use tracing::debug;

use crate::service::decorator::unit_fn;
use crate::service::endpoint::EndpointSet;
use crate::service::operation::{operations, Call, ConfigError};

/// Name of the comments service in logs, metrics, and rate-limit labels.
pub const SERVICE_NAME: &str = "comments";

/// Longest accepted comment body, in characters.
pub const MAX_CONTENT_CHARS: usize = 4096;

operations! {
    /// Operations of the comments service.
    pub enum CommentsOp {
        Post => "Post",
        Get => "Get",
    }
}

pub type CommentsEndpoints = EndpointSet<CommentsOp, CommentsRequest, CommentsResponse>;

// ---------------------------------------------------------------------------
// InMemoryComments
// ---------------------------------------------------------------------------

/// Comments kept per book in a [`DashMap`], oldest first.
#[derive(Debug)]
pub struct InMemoryComments {
    by_book: DashMap<u64, Vec<Comment>>,
    next_id: AtomicU64,
}

impl InMemoryComments {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_book: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Total number of stored comments across all books.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_book.iter().map(|entry| entry.value().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryComments {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_post(req: &PostReq) -> Result<(), OperationError> {
    if req.author.trim().is_empty() {
        return Err(OperationError::InvalidArgument("author must not be empty".into()));
    }
    if req.content.trim().is_empty() {
        return Err(OperationError::InvalidArgument("content must not be empty".into()));
    }
    let chars = req.content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(OperationError::InvalidArgument(format!(
            "content is {chars} characters, limit is {MAX_CONTENT_CHARS}"
        )));
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[async_trait]
impl BookComments for InMemoryComments {
    async fn post(&self, ctx: &CallContext, req: PostReq) -> Result<PostResp, OperationError> {
        validate_post(&req)?;
        let comment = Comment {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            book_id: req.book_id,
            author: req.author,
            content: req.content,
            created_at_ms: now_millis(),
        };
        debug!(trace_id = %ctx.trace_id, book_id = comment.book_id, id = comment.id, "comment stored");
        self.by_book
            .entry(comment.book_id)
            .or_default()
            .push(comment.clone());
        Ok(PostResp { comment })
    }

    async fn get(&self, _ctx: &CallContext, req: GetReq) -> Result<GetResp, OperationError> {
        let comments = self
            .by_book
            .get(&req.book_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(GetResp { comments })
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Register one callable unit per comments operation, each delegating to `svc`.
///
/// # Errors
///
/// Returns `ConfigError::DuplicateOperation` only if registration is broken,
/// which the operation enum rules out.
pub fn make_comments_endpoints(svc: Arc<dyn BookComments>) -> Result<CommentsEndpoints, ConfigError> {
    let mut set = EndpointSet::new(SERVICE_NAME);

    let post_svc = Arc::clone(&svc);
    set.register(
        CommentsOp::Post,
        unit_fn(move |call: Call<CommentsRequest>| {
            let svc = Arc::clone(&post_svc);
            async move {
                let CommentsRequest::Post(req) = call.request else {
                    return Err(OperationError::WrongRequest { operation: "Post" });
                };
                svc.post(&call.ctx, req).await.map(CommentsResponse::Post)
            }
        }),
    )?;

    set.register(
        CommentsOp::Get,
        unit_fn(move |call: Call<CommentsRequest>| {
            let svc = Arc::clone(&svc);
            async move {
                let CommentsRequest::Get(req) = call.request else {
                    return Err(OperationError::WrongRequest { operation: "Get" });
                };
                svc.get(&call.ctx, req).await.map(CommentsResponse::Get)
            }
        }),
    )?;

    Ok(set)
}

// ---------------------------------------------------------------------------
// CommentsClient
// ---------------------------------------------------------------------------

/// Typed view of a (decorated) comments endpoint set.
#[derive(Clone)]
pub struct CommentsClient {
    endpoints: Arc<CommentsEndpoints>,
}

impl CommentsClient {
    #[must_use]
    pub fn new(endpoints: Arc<CommentsEndpoints>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl BookComments for CommentsClient {
    async fn post(&self, ctx: &CallContext, req: PostReq) -> Result<PostResp, OperationError> {
        match self
            .endpoints
            .invoke(CommentsOp::Post, ctx.clone(), CommentsRequest::Post(req))
            .await?
        {
            CommentsResponse::Post(resp) => Ok(resp),
            CommentsResponse::Get(_) => Err(OperationError::UnexpectedResponse { operation: "Post" }),
        }
    }

    async fn get(&self, ctx: &CallContext, req: GetReq) -> Result<GetResp, OperationError> {
        match self
            .endpoints
            .invoke(CommentsOp::Get, ctx.clone(), CommentsRequest::Get(req))
            .await?
        {
            CommentsResponse::Get(resp) => Ok(resp),
            CommentsResponse::Post(_) => Err(OperationError::UnexpectedResponse { operation: "Get" }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::operation::OperationId;

    fn post_req(book_id: u64, content: &str) -> PostReq {
        PostReq {
            book_id,
            author: "ada".to_string(),
            content: content.to_string(),
        }
    }

    fn client() -> (Arc<InMemoryComments>, CommentsClient) {
        let store = Arc::new(InMemoryComments::new());
        let endpoints = make_comments_endpoints(Arc::clone(&store) as Arc<dyn BookComments>).unwrap();
        (store, CommentsClient::new(Arc::new(endpoints)))
    }

    #[tokio::test]
    async fn post_then_get_returns_comments_in_order() {
        let (store, client) = client();
        let ctx = CallContext::new();

        let first = client.post(&ctx, post_req(7, "great read")).await.unwrap().comment;
        let second = client.post(&ctx, post_req(7, "slow middle")).await.unwrap().comment;
        client.post(&ctx, post_req(8, "other book")).await.unwrap();
        assert!(second.id > first.id);

        let comments = client.get(&ctx, GetReq { book_id: 7 }).await.unwrap().comments;
        assert_eq!(comments, vec![first, second]);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn get_unknown_book_is_empty() {
        let (_, client) = client();
        let resp = client.get(&CallContext::new(), GetReq { book_id: 99 }).await.unwrap();
        assert!(resp.comments.is_empty());
    }

    #[tokio::test]
    async fn post_rejects_invalid_input() {
        let (store, client) = client();
        let ctx = CallContext::new();

        let err = client.post(&ctx, post_req(1, "   ")).await.unwrap_err();
        assert!(matches!(err, OperationError::InvalidArgument(_)));

        let mut anonymous = post_req(1, "fine");
        anonymous.author = String::new();
        assert!(client.post(&ctx, anonymous).await.is_err());

        let huge = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(client.post(&ctx, post_req(1, &huge)).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn endpoints_cover_every_operation() {
        let endpoints = make_comments_endpoints(Arc::new(InMemoryComments::new())).unwrap();
        assert_eq!(endpoints.service_name(), SERVICE_NAME);
        assert_eq!(endpoints.operations(), CommentsOp::ALL.to_vec());
    }

    #[tokio::test]
    async fn mismatched_envelope_is_wrong_request() {
        let endpoints = make_comments_endpoints(Arc::new(InMemoryComments::new())).unwrap();
        let err = endpoints
            .invoke(
                CommentsOp::Post,
                CallContext::new(),
                CommentsRequest::Get(GetReq { book_id: 1 }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::WrongRequest { operation: "Post" }));
    }

    #[tokio::test]
    async fn client_rejects_mismatched_response() {
        let mut endpoints = CommentsEndpoints::new(SERVICE_NAME);
        endpoints
            .register(
                CommentsOp::Get,
                unit_fn(|_call: Call<CommentsRequest>| async {
                    Ok(CommentsResponse::Post(PostResp {
                        comment: Comment {
                            id: 1,
                            book_id: 1,
                            author: "a".into(),
                            content: "c".into(),
                            created_at_ms: 0,
                        },
                    }))
                }),
            )
            .unwrap();
        let client = CommentsClient::new(Arc::new(endpoints));

        let err = client.get(&CallContext::new(), GetReq { book_id: 1 }).await.unwrap_err();
        assert!(matches!(err, OperationError::UnexpectedResponse { operation: "Get" }));

        // Post was never registered.
        let err = client.post(&CallContext::new(), post_req(1, "hi")).await.unwrap_err();
        assert!(matches!(err, OperationError::UnknownOperation { ref name } if name == "Post"));
    }

    #[tokio::test]
    async fn cancelled_call_never_reaches_store() {
        let (store, client) = client();
        let ctx = CallContext::new();
        ctx.cancel();
        let err = client.post(&ctx, post_req(1, "late")).await.unwrap_err();
        assert!(matches!(err, OperationError::Cancelled));
        assert!(store.is_empty());
    }
}
