//! Bookinfo Core: call context, error taxonomy, message schemas, and service traits.

pub mod context;
pub mod error;
pub mod messages;
pub mod traits;
pub mod types;

pub use context::CallContext;
pub use error::OperationError;
pub use traits::{BookComments, BookDetails};
pub use types::{BookDetail, Comment};

