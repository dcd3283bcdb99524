//! Lifecycle crate – the input engine's configuration control plane.
//!
//! Maps user-triggered configuration actions onto engine lifecycle
//! operations and sequences them safely around restarts. All host
//! integrations sit behind traits; nothing here depends on a UI runtime, so
//! the same logic backs the preference UI and the headless `imectl` harness.

pub mod about;
pub mod commands;
pub mod context;
pub mod engine;
pub mod native;
pub mod platform;
pub mod probes;
pub mod restart;
pub mod scenario;
pub mod session;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use commands::{ActionDispatcher, CommandError};
pub use context::ControlContext;
pub use engine::{EngineGuard, EngineHandle, LifecycleError};
pub use restart::{conclude, ProcessRestartGate, RestartGate};
pub use session::{ActiveSession, SessionRegistry};
pub use types::{ActionKey, ActionReport, CommandResult, Dispatch, ErrorCode, Status};
