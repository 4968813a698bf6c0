//! # kestrel-validate
//!
//! Structural and security checks on every loop boundary.
//!
//! The [`Validator`] validates four boundaries — loop configuration, a single
//! action call, a batch of calls, and an action outcome — each returning a
//! [`ValidationResult`]. Blocking problems are errors; sanitization rewrites
//! and sensitive-key findings are advisory warnings, never errors.
//!
//! The [`schema`] module provides a closed, explicitly-dispatched recursive
//! schema checker for action input schemas.

#![deny(unsafe_code)]

pub mod sanitize;
pub mod schema;
pub mod sensitive;
pub mod types;
pub mod validator;

pub use types::{ValidationError, ValidationLimits, ValidationResult, ValidationWarning, codes};
pub use validator::Validator;
