//! JSON handlers for the comments and details RPCs.
//!
//! Each handler builds a `CallContext` from the request (trace id from
//! `x-request-id`, deadline from the configured call timeout), invokes the
//! decorated service within that deadline, and maps errors through
//! [`ApiError`].

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bookinfo_core::messages::{DetailReq, DetailResp, GetReq, GetResp, PostReq, PostResp};
use bookinfo_core::CallContext;

use super::{ApiError, AppState};
use crate::network::middleware::REQUEST_ID_HEADER;

/// Cancels the call if the handler future is dropped, e.g. when the client
/// disconnects.
struct CancelOnDrop(CallContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn call_context(state: &AppState, headers: &HeaderMap) -> CallContext {
    let trace_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty());
    let ctx = match trace_id {
        Some(id) => CallContext::with_trace_id(id),
        None => CallContext::new(),
    };
    ctx.with_timeout(state.call_timeout)
}

/// `POST /v1/comments`
pub async fn post_comment_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PostReq>,
) -> Result<(StatusCode, Json<PostResp>), ApiError> {
    let _in_flight = state.shutdown.in_flight_guard();
    let ctx = call_context(&state, &headers);
    let _cancel = CancelOnDrop(ctx.clone());

    let resp = ctx.scope(state.comments.post(&ctx, req)).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// `GET /v1/comments/{book_id}`
pub async fn get_comments_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<u64>,
) -> Result<Json<GetResp>, ApiError> {
    let _in_flight = state.shutdown.in_flight_guard();
    let ctx = call_context(&state, &headers);
    let _cancel = CancelOnDrop(ctx.clone());

    let resp = ctx.scope(state.comments.get(&ctx, GetReq { book_id })).await?;
    Ok(Json(resp))
}

/// `GET /v1/detail/{id}`
pub async fn get_detail_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<DetailResp>, ApiError> {
    let _in_flight = state.shutdown.in_flight_guard();
    let ctx = call_context(&state, &headers);
    let _cancel = CancelOnDrop(ctx.clone());

    let resp = ctx.scope(state.details.detail(&ctx, DetailReq { id })).await?;
    Ok(Json(resp))
}
