//! Restart-as-reset.
//!
//! The engine's native state and caches are process-scoped, so after a deploy
//! or a self-check the process is discarded and the host supervisor starts a
//! fresh one. The dispatcher only reports [`TerminalAction::RestartProcess`];
//! the call site hands the report to [`conclude`] as its very last step.

use crate::types::{ActionReport, TerminalAction};
use std::io::Write;

pub trait RestartGate: Send + Sync {
    /// End the current process. May not return.
    fn terminate_for_reset(&self);
}

/// Execute the terminal action carried by `terminal`, if any.
/// Returns whether the gate was invoked.
pub fn conclude_with(gate: &dyn RestartGate, terminal: Option<TerminalAction>) -> bool {
    match terminal {
        Some(TerminalAction::RestartProcess) => {
            tracing::info!("terminating process for a clean engine restart");
            gate.terminate_for_reset();
            true
        }
        None => false,
    }
}

pub fn conclude(gate: &dyn RestartGate, report: &ActionReport) -> bool {
    conclude_with(gate, report.terminal)
}

/// Exits the process, leaving the restart to the supervisor.
pub struct ProcessRestartGate {
    exit_code: i32,
}

impl ProcessRestartGate {
    pub fn new(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

impl Default for ProcessRestartGate {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RestartGate for ProcessRestartGate {
    fn terminate_for_reset(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        std::process::exit(self.exit_code);
    }
}
