//! Domain services.
//!
//! Each service defines its closed operation enum, an in-memory business
//! implementation, the constructor that turns it into an endpoint set, and a
//! typed client over a (decorated) endpoint set.

pub mod comments;
pub mod details;

pub use comments::{
    make_comments_endpoints, CommentsClient, CommentsEndpoints, CommentsOp, InMemoryComments,
};
pub use details::{
    make_details_endpoints, DetailsClient, DetailsEndpoints, DetailsOp, InMemoryDetails,
};
