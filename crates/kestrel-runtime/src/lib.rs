//! # kestrel-runtime
//!
//! The Kestrel orchestration engine: a round-based execution loop for
//! model-directed action calls.
//!
//! - [`engine::LoopEngine`] drives rounds — build prompt → query model →
//!   execute actions — until the model stops requesting actions, the round
//!   budget is exhausted, or execution is cancelled.
//! - [`identity::IdentityManager`] keeps action-call identifiers
//!   collision-free across rounds and nesting.
//! - [`nested::DelegationManager`] lets one action spawn a bounded
//!   sub-orchestration with per-depth resource shrinkage.
//! - [`stream::consume_stream`] is the pausable, bounded-memory consumer of
//!   incremental model output.

#![deny(unsafe_code)]

pub mod emitter;
pub mod engine;
pub mod errors;
mod executor;
pub mod identity;
pub mod nested;
mod round;
pub mod stream;

pub use emitter::EventEmitter;
pub use engine::{EngineCollaborators, LoopEngine};
pub use errors::EngineError;
pub use identity::{IdStrategy, IdentityConfig, IdentityManager};
pub use nested::{DelegationConfig, DelegationError, DelegationManager};
pub use stream::{ConsumeOutcome, RingBuffer, StreamLifecycle, StreamMetrics, consume_stream};
