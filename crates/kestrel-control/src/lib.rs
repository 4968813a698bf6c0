//! # kestrel-control
//!
//! The cooperative pause/cancel primitive shared by every Kestrel operation.
//!
//! A [`ControlToken`] is a cloneable handle threaded through each suspension
//! point of the loop engine. Cancellation is advisory, never preemptive: it is
//! observed at explicit suspension points (`wait_if_paused`, the inner
//! cancellation future), and in-flight work is allowed to settle.
//!
//! The token is five-state — running, paused, draining, cancelled, disposed —
//! with graceful cancellation layering a bounded cleanup window ahead of the
//! hard cancel.

#![deny(unsafe_code)]

pub mod errors;
pub mod token;

pub use errors::CancellationError;
pub use token::{ControlState, ControlToken};
