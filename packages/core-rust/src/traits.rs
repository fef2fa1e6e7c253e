use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::OperationError;
use crate::messages::{DetailReq, DetailResp, GetReq, GetResp, PostReq, PostResp};

/// Business logic behind the comments service.
/// Implementations: in-memory store (server crate), test doubles.
#[async_trait]
pub trait BookComments: Send + Sync {
    /// Store a new comment and return it with its assigned id.
    async fn post(&self, ctx: &CallContext, req: PostReq) -> Result<PostResp, OperationError>;

    /// List every comment on a book, oldest first.
    async fn get(&self, ctx: &CallContext, req: GetReq) -> Result<GetResp, OperationError>;
}

/// Business logic behind the book-details service.
#[async_trait]
pub trait BookDetails: Send + Sync {
    /// Look up a single book. Unknown ids yield `OperationError::NotFound`.
    async fn detail(&self, ctx: &CallContext, req: DetailReq)
        -> Result<DetailResp, OperationError>;
}
