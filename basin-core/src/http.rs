//! Thin re-export surface so downstream crates depend on `basin_core::http`
//! rather than pinning their own `axum`/`http` versions.

pub use axum::extract;
pub use axum::response;
pub use axum::routing;
pub use axum::Json;
pub use axum::Router;
pub use http::{HeaderMap, Method, StatusCode};
