//! # Axum Helpers
//!
//! Shared utilities for the analytics HTTP surfaces.
//!
//! ## Modules
//!
//! - **[`errors`]**: Structured error responses with error codes
//! - **[`extractors`]**: Custom extractors (validated JSON)
//! - **[`health`]**: Liveness/readiness router for Kubernetes probes
//! - **[`shutdown`]**: Graceful shutdown signal handling

pub mod errors;
pub mod extractors;
pub mod health;
pub mod shutdown;

pub use errors::{AppError, ErrorCode, ErrorResponse};
pub use extractors::ValidatedJson;
pub use health::{health_router, HealthResponse};
pub use shutdown::shutdown_signal;
