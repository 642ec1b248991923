//! OpenAPI document generation
//!
//! The document is derived from the same field descriptors and dependencies
//! the resolver uses, so what is documented is what is validated. It is
//! built from `utoipa::openapi` objects, re-exported here for callers that
//! post-process the document.

pub mod builder;
pub mod ui;

pub use builder::{OpenApiBuilder, to_json, to_yaml};
pub use utoipa;
pub use utoipa::openapi::OpenApi as OpenApiDocument;
