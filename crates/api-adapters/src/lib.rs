//! # api-adapters
//!
//! JSON-over-HTTP surface of the services. Every operation is
//! `POST /api/{operation}` with a camelCase JSON body; the caller comes from
//! the bearer token, never from the body. Responses use one envelope:
//! `{ "success": true, ...data }` or `{ "success": false, "message": "..." }`.

pub mod dto;
pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod routes;
#[cfg(feature = "web-axum")]
pub mod state;

pub use metrics::{ApiMetrics, Outcome};

#[cfg(feature = "web-axum")]
pub use error::ApiError;
#[cfg(feature = "web-axum")]
pub use routes::router;
#[cfg(feature = "web-axum")]
pub use state::AppState;
