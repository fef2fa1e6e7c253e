//! Book-details service messages.

use serde::{Deserialize, Serialize};

use crate::types::BookDetail;

/// Request for the catalogue entry of one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailReq {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailResp {
    pub detail: BookDetail,
}

/// Request envelope for the details service. One variant today; kept as an
/// enum so the service shares the endpoint-set machinery with comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsRequest {
    Detail(DetailReq),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsResponse {
    Detail(DetailResp),
}
