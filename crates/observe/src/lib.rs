//! Process-wide observability plumbing shared by every binary: logging
//! initialization and a panic hook that routes through `tracing` instead of
//! bare stderr.

pub mod panic_hook;
pub mod tracing;
