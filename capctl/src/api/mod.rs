//! HTTP surface: axum handlers and the request/response models they exchange.
//!
//! - [`handlers`]: one module per resource, each handler annotated for OpenAPI
//! - [`models`]: request/response types, separate from [`crate::db::models`]

pub mod handlers;
pub mod models;
