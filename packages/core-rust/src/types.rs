use serde::{Deserialize, Serialize};

/// A reader comment attached to a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Server-assigned identifier, unique per process.
    pub id: u64,
    /// Book this comment belongs to.
    pub book_id: u64,
    pub author: String,
    pub content: String,
    /// Wall-clock creation time (ms since epoch).
    pub created_at_ms: u64,
}

/// Catalogue entry describing a single book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDetail {
    pub id: u64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub pages: u32,
    pub publisher: String,
    pub language: String,
    pub year: u16,
}
