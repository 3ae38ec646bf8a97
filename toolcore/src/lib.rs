//! Tool-execution core: dispatch, process supervision, patching, search,
//! and task memory for an AI coding agent.
//!
//! This crate ties together [`toolcore_bash`], [`toolcore_safety`], and
//! [`toolcore_patch`] behind a single [`dispatcher::dispatch`] entry point
//! that decodes a [`model::ToolCall`], runs per-tool permission checks, and
//! returns a [`model::ToolOut`].

pub mod context;
pub mod dispatcher;
pub mod jit;
pub mod knowledge;
pub mod model;
pub mod search;
pub mod think;
pub mod todo;

pub use context::WorkingDir;
pub use dispatcher::{DispatchOptions, dispatch};
pub use model::{Content, StopReason, SubConvo, SubConvoReply, ToolCall, ToolOut};
