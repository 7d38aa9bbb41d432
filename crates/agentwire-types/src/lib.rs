//! Shared types for the agentwire session pipeline.

mod agent;
mod agent_error;
mod claude;
mod codex;
mod event;
mod opencode;
mod ssh;
mod usage;

pub use agent::*;
pub use agent_error::*;
pub use claude::*;
pub use codex::*;
pub use event::*;
pub use opencode::*;
pub use ssh::*;
pub use usage::*;
