//! Request/response schemas for the bookinfo RPC services.
//!
//! Leaf messages serialize as JSON with camelCase field names. The
//! `*Request`/`*Response` envelopes are in-process only: they give every
//! operation of a service one uniform request and response type so the
//! endpoint pipeline can treat all operations alike.

pub mod comments;
pub mod details;

pub use comments::{CommentsRequest, CommentsResponse, GetReq, GetResp, PostReq, PostResp};
pub use details::{DetailReq, DetailResp, DetailsRequest, DetailsResponse};
