//! Comments service messages: `Post` adds a comment, `Get` lists a book's comments.

use serde::{Deserialize, Serialize};

use crate::types::Comment;

/// Request to add a comment to a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReq {
    pub book_id: u64,
    pub author: String,
    pub content: String,
}

/// Response carrying the stored comment, including its assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResp {
    pub comment: Comment,
}

/// Request for all comments on a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetReq {
    pub book_id: u64,
}

/// Comments on a book in insertion order. Empty when the book has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResp {
    pub comments: Vec<Comment>,
}

/// Request envelope for every comments operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentsRequest {
    Post(PostReq),
    Get(GetReq),
}

/// Response envelope for every comments operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentsResponse {
    Post(PostResp),
    Get(GetResp),
}
