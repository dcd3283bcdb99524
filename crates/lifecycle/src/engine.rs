//! Engine handle – the single, process-scoped owner of the native engine.
//!
//! Every state transition happens behind one exclusive lock. Callers take the
//! lock with [`EngineHandle::lock`] and keep the returned guard for as long as
//! a multi-step operation (destroy + initialize, say) must not interleave with
//! another one.

use crate::traits::{CapResult, ColorScheme, NativeEngine, SchemaItem};
use crate::types::{CheckReport, EngineState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("an engine handle already exists in this process")]
    AlreadyExists,
}

/// Set while an [`EngineHandle`] is alive.
static HANDLE_LIVE: AtomicBool = AtomicBool::new(false);

struct EngineCell {
    native: Box<dyn NativeEngine>,
    state: EngineState,
    last_error: Option<String>,
}

pub struct EngineHandle {
    cell: Mutex<EngineCell>,
}

impl EngineHandle {
    /// Take ownership of the native engine. Fails if another handle is still
    /// alive in this process.
    pub fn new(native: Box<dyn NativeEngine>) -> Result<Self, LifecycleError> {
        if HANDLE_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LifecycleError::AlreadyExists);
        }
        Ok(Self {
            cell: Mutex::new(EngineCell {
                native,
                state: EngineState::Uninitialized,
                last_error: None,
            }),
        })
    }

    /// Acquire the instance lock.
    pub fn lock(&self) -> EngineGuard<'_> {
        // Transitions are total, so a panic elsewhere never leaves the cell
        // half-updated.
        let cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        EngineGuard { cell }
    }

    pub fn state(&self) -> EngineState {
        self.lock().state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().cell.last_error.clone()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        HANDLE_LIVE.store(false, Ordering::SeqCst);
    }
}

/// Exclusive access to the engine for the lifetime of the guard.
pub struct EngineGuard<'a> {
    cell: MutexGuard<'a, EngineCell>,
}

impl EngineGuard<'_> {
    pub fn state(&self) -> EngineState {
        self.cell.state
    }

    /// Release all engine resources. A no-op unless the engine is `Ready`.
    pub fn destroy(&mut self) {
        if !self.cell.state.is_ready() {
            tracing::debug!(state = ?self.cell.state, "destroy skipped, engine not ready");
            return;
        }
        self.cell.native.destroy();
        self.cell.state = EngineState::Destroyed;
        tracing::info!("engine destroyed");
    }

    /// Bring the engine to `Ready`, starting from a fresh configuration.
    ///
    /// The state always ends up `Ready`; a native failure is logged and kept
    /// in `last_error`.
    pub fn initialize(&mut self, full_rebuild: bool) {
        if self.cell.state.is_ready() {
            self.cell.native.destroy();
        }
        match self.cell.native.initialize(full_rebuild) {
            Ok(()) => {
                self.cell.last_error = None;
                tracing::info!(full_rebuild, "engine initialized");
            }
            Err(e) => {
                tracing::warn!(full_rebuild, error = %e, "engine initialized with errors");
                self.cell.last_error = Some(e.to_string());
            }
        }
        self.cell.state = EngineState::Ready { full_rebuild };
    }

    /// Initialize with cached artifacts if nothing has been loaded yet.
    pub fn ensure_ready(&mut self) {
        if !self.cell.state.is_ready() {
            self.initialize(false);
        }
    }

    /// Validate installed data. Never terminates; when `schedule_restart` is
    /// set the caller is expected to restart the process afterwards.
    pub fn run_self_check(&mut self, schedule_restart: bool) -> CheckReport {
        let issues = match self.cell.native.run_self_check(schedule_restart) {
            Ok(findings) => findings.issues,
            Err(e) => vec![format!("self-check aborted: {}", e)],
        };
        let report = CheckReport {
            ok: issues.is_empty(),
            issues,
            restart_scheduled: schedule_restart,
        };
        if report.ok {
            tracing::info!(schedule_restart, "self-check passed");
        } else {
            tracing::warn!(issues = ?report.issues, schedule_restart, "self-check found problems");
        }
        report
    }

    pub fn sync_user_data(&mut self) -> bool {
        let ok = self.cell.native.sync_user_data();
        tracing::info!(ok, "user data sync finished");
        ok
    }

    pub fn deploy_conversion(&mut self) -> bool {
        let ok = self.cell.native.deploy_conversion();
        tracing::info!(ok, "conversion deploy finished");
        ok
    }

    pub fn engine_version(&self) -> String {
        self.cell.native.engine_version()
    }

    pub fn conversion_library_version(&self) -> String {
        self.cell.native.conversion_library_version()
    }

    pub fn color_schemes(&self) -> CapResult<Vec<ColorScheme>> {
        self.cell.native.color_schemes()
    }

    pub fn select_color_scheme(&mut self, id: &str) -> CapResult<()> {
        self.cell.native.select_color_scheme(id)
    }

    pub fn schemas(&self) -> CapResult<Vec<SchemaItem>> {
        self.cell.native.schemas()
    }

    pub fn select_schemas(&mut self, ids: &[String]) -> CapResult<()> {
        self.cell.native.select_schemas(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EngineCall, MockEngine};
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_single_instance() {
        let (engine, _) = MockEngine::new();
        let first = EngineHandle::new(Box::new(engine)).unwrap();

        let (engine, _) = MockEngine::new();
        assert!(matches!(
            EngineHandle::new(Box::new(engine)),
            Err(LifecycleError::AlreadyExists)
        ));

        drop(first);
        let (engine, _) = MockEngine::new();
        assert!(EngineHandle::new(Box::new(engine)).is_ok());
    }

    #[test]
    #[serial]
    fn test_lifecycle_transitions() {
        let (engine, log) = MockEngine::new();
        let handle = EngineHandle::new(Box::new(engine)).unwrap();
        assert_eq!(handle.state(), EngineState::Uninitialized);

        let mut g = handle.lock();
        g.initialize(false);
        assert_eq!(g.state(), EngineState::Ready { full_rebuild: false });
        g.destroy();
        assert_eq!(g.state(), EngineState::Destroyed);
        g.initialize(true);
        assert_eq!(g.state(), EngineState::Ready { full_rebuild: true });
        drop(g);

        assert_eq!(
            log.calls(),
            vec![
                EngineCall::Initialize(false),
                EngineCall::Destroy,
                EngineCall::Initialize(true),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_destroy_is_idempotent() {
        let (engine, log) = MockEngine::new();
        let handle = EngineHandle::new(Box::new(engine)).unwrap();
        let mut g = handle.lock();
        g.initialize(false);
        g.destroy();
        g.destroy();
        assert_eq!(g.state(), EngineState::Destroyed);
        drop(g);

        let destroys = log
            .calls()
            .into_iter()
            .filter(|c| *c == EngineCall::Destroy)
            .count();
        assert_eq!(destroys, 1);
    }

    #[test]
    #[serial]
    fn test_destroy_before_initialize_is_noop() {
        let (engine, log) = MockEngine::new();
        let handle = EngineHandle::new(Box::new(engine)).unwrap();
        handle.lock().destroy();
        assert_eq!(handle.state(), EngineState::Uninitialized);
        assert!(log.calls().is_empty());
    }

    #[test]
    #[serial]
    fn test_failed_initialize_still_ready() {
        let (mut engine, _) = MockEngine::new();
        engine.fail_initialize = true;
        let handle = EngineHandle::new(Box::new(engine)).unwrap();
        handle.lock().initialize(true);
        assert_eq!(handle.state(), EngineState::Ready { full_rebuild: true });
        assert!(handle.last_error().is_some());
    }

    #[test]
    #[serial]
    fn test_reinitialize_when_ready_destroys_first() {
        let (engine, log) = MockEngine::new();
        let handle = EngineHandle::new(Box::new(engine)).unwrap();
        let mut g = handle.lock();
        g.initialize(false);
        g.initialize(false);
        drop(g);
        assert_eq!(
            log.calls(),
            vec![
                EngineCall::Initialize(false),
                EngineCall::Destroy,
                EngineCall::Initialize(false),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_sync_failure_leaves_state() {
        let (mut engine, _) = MockEngine::new();
        engine.sync_ok = false;
        let handle = EngineHandle::new(Box::new(engine)).unwrap();
        let mut g = handle.lock();
        g.initialize(false);
        assert!(!g.sync_user_data());
        assert_eq!(g.state(), EngineState::Ready { full_rebuild: false });
    }

    #[test]
    #[serial]
    fn test_self_check_report() {
        let (mut engine, _) = MockEngine::new();
        engine.check_issues = vec!["missing build/default.schema.yaml".into()];
        let handle = EngineHandle::new(Box::new(engine)).unwrap();
        let report = handle.lock().run_self_check(true);
        assert!(!report.ok);
        assert!(report.restart_scheduled);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(handle.state(), EngineState::Uninitialized);
    }
}
