//! # kestrel-actions
//!
//! The loop engine's collaborator contracts, and the dependency-injected
//! action registry.
//!
//! The engine is generic over four injected collaborators — prompt building,
//! action cataloguing, model querying, and action execution — plus an
//! optional recovery hook invoked on action failure. All are defined here as
//! object-safe async traits so embedders can wire real providers without the
//! engine knowing about any of them.
//!
//! [`ActionRegistry`] is the default catalog/executor pair: an explicitly
//! constructed registry whose lifecycle is tied to the engine instance (never
//! a process-wide singleton).

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod traits;

pub use errors::{CollaboratorError, HandlerError};
pub use registry::ActionRegistry;
pub use traits::{
    ActionCatalog, ActionExecutor, ActionHandler, ActionSpec, Message, ModelQuerier,
    ModelRequest, PromptBuilder, PromptContext, PromptPayload, RecoveryHook,
};
