//! Book details service: operations, in-memory catalogue, endpoints, and client.

use std::sync::Arc;

use async_trait::async_trait;
use bookinfo_core::messages::{DetailReq, DetailResp, DetailsRequest, DetailsResponse};
use bookinfo_core::{BookDetail, BookDetails, CallContext, OperationError};
use dashmap::DashMap;

use crate::service::decorator::unit_fn;
use crate::service::endpoint::EndpointSet;
use crate::service::operation::{operations, Call, ConfigError};

/// Name of the details service in logs, metrics, and rate-limit labels.
pub const SERVICE_NAME: &str = "details";

operations! {
    /// Operations of the details service.
    pub enum DetailsOp {
        Detail => "Detail",
    }
}

pub type DetailsEndpoints = EndpointSet<DetailsOp, DetailsRequest, DetailsResponse>;

// ---------------------------------------------------------------------------
// InMemoryDetails
// ---------------------------------------------------------------------------

/// Book catalogue keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryDetails {
    books: DashMap<u64, BookDetail>,
}

impl InMemoryDetails {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_books(books: impl IntoIterator<Item = BookDetail>) -> Self {
        let catalogue = Self::new();
        for book in books {
            catalogue.insert(book);
        }
        catalogue
    }

    /// A small fixed catalogue for local runs.
    #[must_use]
    pub fn sample() -> Self {
        Self::with_books([
            BookDetail {
                id: 1,
                title: "The Comedy of Errors".to_string(),
                author: "William Shakespeare".to_string(),
                isbn: "0486424618".to_string(),
                pages: 200,
                publisher: "Dover Publications".to_string(),
                language: "English".to_string(),
                year: 1595,
            },
            BookDetail {
                id: 2,
                title: "The Rust Programming Language".to_string(),
                author: "Steve Klabnik, Carol Nichols".to_string(),
                isbn: "1718503105".to_string(),
                pages: 560,
                publisher: "No Starch Press".to_string(),
                language: "English".to_string(),
                year: 2023,
            },
        ])
    }

    /// Insert or replace a book, returning the previous entry for its id.
    pub fn insert(&self, book: BookDetail) -> Option<BookDetail> {
        self.books.insert(book.id, book)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

#[async_trait]
impl BookDetails for InMemoryDetails {
    async fn detail(&self, _ctx: &CallContext, req: DetailReq) -> Result<DetailResp, OperationError> {
        if req.id == 0 {
            return Err(OperationError::InvalidArgument("book id must be positive".into()));
        }
        self.books
            .get(&req.id)
            .map(|entry| DetailResp {
                detail: entry.value().clone(),
            })
            .ok_or_else(|| OperationError::NotFound(format!("book {}", req.id)))
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Register the details operation's callable unit, delegating to `svc`.
///
/// # Errors
///
/// Returns `ConfigError::DuplicateOperation` only if registration is broken.
pub fn make_details_endpoints(svc: Arc<dyn BookDetails>) -> Result<DetailsEndpoints, ConfigError> {
    let mut set = EndpointSet::new(SERVICE_NAME);
    set.register(
        DetailsOp::Detail,
        unit_fn(move |call: Call<DetailsRequest>| {
            let svc = Arc::clone(&svc);
            async move {
                let DetailsRequest::Detail(req) = call.request;
                svc.detail(&call.ctx, req).await.map(DetailsResponse::Detail)
            }
        }),
    )?;
    Ok(set)
}

// ---------------------------------------------------------------------------
// DetailsClient
// ---------------------------------------------------------------------------

/// Typed view of a (decorated) details endpoint set.
#[derive(Clone)]
pub struct DetailsClient {
    endpoints: Arc<DetailsEndpoints>,
}

impl DetailsClient {
    #[must_use]
    pub fn new(endpoints: Arc<DetailsEndpoints>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl BookDetails for DetailsClient {
    async fn detail(&self, ctx: &CallContext, req: DetailReq) -> Result<DetailResp, OperationError> {
        let DetailsResponse::Detail(resp) = self
            .endpoints
            .invoke(DetailsOp::Detail, ctx.clone(), DetailsRequest::Detail(req))
            .await?;
        Ok(resp)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
