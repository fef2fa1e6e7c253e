//! Bookinfo Server: decorated comments and details services behind an axum HTTP transport.

pub mod network;
pub mod service;

pub use network::{NetworkConfig, NetworkModule};
pub use service::{ServerConfig, Services};
