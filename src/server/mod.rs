//! Serving endpoints
//!
//! - [`AppBuilder`] mounts endpoints and documentation on an axum `Router`
//! - [`HyperApp`] is a tower service for hyper stacks
//! - [`init_tracing`] installs the `tracing` subscriber from config

pub mod builder;
pub mod docs;
pub mod hyper_app;
pub mod telemetry;

pub use builder::AppBuilder;
pub use docs::DocsPages;
pub use hyper_app::{HyperApp, HyperAppBuilder};
pub use telemetry::init_tracing;
