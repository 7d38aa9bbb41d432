//! agentwire CLI library - configuration, logging, and session driving for the
//! `agentwire` binary. Separated from main.rs so it can be unit tested.

pub mod config;
pub mod logging;
pub mod session;
