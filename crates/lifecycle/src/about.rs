//! About – version and environment facts.

use crate::context::ControlContext;
use crate::probes;
use crate::types::*;
use std::time::Instant;

pub const CONTROL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Gather the about report and wrap it in a CommandResult.
pub fn run_about(ctx: &ControlContext) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();

    let report = gather_report(ctx);

    let mut r = result_ok("about", "control", &run_id, start.elapsed().as_millis() as u64);
    r.data = Some(serde_json::to_value(&report).unwrap_or_default());
    r
}

pub fn gather_report(ctx: &ControlContext) -> AboutReport {
    let guard = ctx.engine().lock();
    let engine = guard.state();
    let engine_version = guard.engine_version();
    let conversion_library_version = guard.conversion_library_version();
    drop(guard);

    AboutReport {
        control_version: CONTROL_VERSION.to_string(),
        engine_version,
        conversion_library_version,
        package_identity: ctx.package_identity.clone(),
        enabled: probes::is_enabled(ctx.input_methods(), &ctx.package_identity),
        engine,
        session_bound: ctx.sessions().is_bound(),
        os_name: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        headless: detect_headless(),
    }
}
