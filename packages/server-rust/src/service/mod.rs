//! Endpoint decoration and admission-control pipeline.
//!
//! 1. **Operations** (`operation`): closed operation enums, the `Call` envelope, config errors
//! 2. **Callable units** (`decorator`): type-erased endpoints and labeled layers
//! 3. **Endpoint sets** (`endpoint`): per-service unit maps with bulk decoration
//! 4. **Middleware** (`middleware`): metrics, logging, tracing, timeout, rate limit, circuit breaker
//! 5. **Domain services** (`domain`): comments and details business logic and clients
//! 6. **Configuration** (`config`): TOML-backed pipeline settings
//! 7. **Assembly** (`assembly`): decorated services built from configuration

pub mod assembly;
pub mod config;
pub mod decorator;
pub mod domain;
pub mod endpoint;
pub mod middleware;
pub mod operation;

// Re-export key types for convenient access.
pub use assembly::Services;
pub use config::{PipelineConfig, ServerConfig};
pub use decorator::{labeled_fn, unit_fn, Endpoint, IntoEndpoint, LabeledLayer};
pub use endpoint::EndpointSet;
pub use operation::{Call, ConfigError, OperationError, OperationId};
