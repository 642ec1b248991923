//! Validation and filtering
//!
//! Field values are coerced to their declared type, passed through filters,
//! then checked by validators. Whole JSON bodies can be validated as typed
//! models.

pub mod filters;
pub mod model;
pub mod validators;

pub use filters::Filter;
pub use model::validate_model;
pub use validators::Validator;
