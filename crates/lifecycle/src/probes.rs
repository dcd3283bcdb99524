//! Probes – enablement and engine status.

use crate::context::ControlContext;
use crate::traits::{InputMethodInfo, InputMethodOps};
use crate::types::*;
use std::collections::HashMap;
use std::time::Instant;

/// Whether `package_identity` appears in the host's enabled input methods.
///
/// Queries the live list on every call. An empty list or a failed query
/// yields `false`.
pub fn is_enabled(input_methods: &dyn InputMethodOps, package_identity: &str) -> bool {
    match input_methods.enabled_input_methods() {
        Ok(list) => lists_package(&list, package_identity),
        Err(e) => {
            tracing::debug!(error = %e, "enabled input method query failed");
            false
        }
    }
}

/// Exact package identity match; a prefix or a sibling package is not us.
fn lists_package(list: &[InputMethodInfo], package_identity: &str) -> bool {
    list.iter().any(|im| im.package == package_identity)
}

/// Run a probe by name and return a full CommandResult.
pub fn run_probe(name: &str, ctx: &ControlContext) -> CommandResult {
    match name {
        "enablement" => probe_enablement(ctx),
        "engine" => probe_engine(ctx),
        _ => {
            let run_id = new_run_id();
            result_err(
                "probe",
                name,
                &run_id,
                0,
                ErrorCode::InvalidInput,
                format!("unknown probe: {} (available: enablement, engine)", name),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Enablement probe
// ---------------------------------------------------------------------------

fn probe_enablement(ctx: &ControlContext) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();
    let mut steps = HashMap::new();

    let t0 = Instant::now();
    let listed = ctx.input_methods().enabled_input_methods();
    steps.insert("list_enabled".into(), t0.elapsed().as_millis() as u64);

    let (enabled, listed_count, query_error) = match &listed {
        Ok(list) => (
            lists_package(list, &ctx.package_identity),
            list.len(),
            None,
        ),
        Err(e) => (false, 0, Some(e.to_string())),
    };

    let mut r = result_ok(
        "probe",
        "enablement",
        &run_id,
        start.elapsed().as_millis() as u64,
    );
    if !enabled {
        r.status = Status::Fail;
    }
    r.timing_ms.steps = steps;
    r.data = Some(serde_json::json!({
        "package_identity": ctx.package_identity,
        "enabled": enabled,
        "enabled_count": listed_count,
        "query_error": query_error,
    }));
    r
}

// ---------------------------------------------------------------------------
// Engine probe
// ---------------------------------------------------------------------------

fn probe_engine(ctx: &ControlContext) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();

    let guard = ctx.engine().lock();
    let state = guard.state();
    let engine_version = guard.engine_version();
    let conversion_version = guard.conversion_library_version();
    drop(guard);

    let mut r = result_ok("probe", "engine", &run_id, start.elapsed().as_millis() as u64);
    r.data = Some(serde_json::json!({
        "engine": state,
        "engine_version": engine_version,
        "conversion_library_version": conversion_version,
        "last_error": ctx.engine().last_error(),
        "session_bound": ctx.sessions().is_bound(),
    }));
    r
}
