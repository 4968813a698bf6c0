//! # kestrel-core
//!
//! Foundation types for the Kestrel loop engine.
//!
//! This crate provides the shared vocabulary the other Kestrel crates depend on:
//!
//! - **Branded IDs**: `SessionId`, `CallId`, `ExecutionId` as newtypes for type safety
//! - **Calls**: `ActionCall`, `ActionOutcome`, `ActionRecord` and the call status lifecycle
//! - **Replies**: `ModelReply` and `RequestedAction` — the model-side half of a round
//! - **Rounds**: `Round`, `LoopResult`, `LoopConfig`
//! - **Events**: `LoopEvent` lifecycle events with session context, `LoopPhase` / `LoopProgress`
//! - **Logging**: `tracing` subscriber init helper

#![deny(unsafe_code)]

pub mod calls;
pub mod events;
pub mod ids;
pub mod logging;
pub mod reply;
pub mod rounds;
