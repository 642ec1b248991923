//! Core building blocks: fields, requests, dependencies and endpoints

pub mod depend;
pub mod endpoint;
pub mod error;
pub mod field;
pub mod path;
pub mod request;
pub mod validation;

pub use depend::{Arguments, Depends, Param, Provider, Resolver};
pub use endpoint::{Endpoint, Reply, Signature};
pub use error::{BindError, BindResult};
pub use field::{Field, FieldKind, FieldType};
pub use request::RequestAdapter;
