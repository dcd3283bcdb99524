//! Action dispatcher and the built-in lifecycle actions.
//!
//! Actions are registered by key and run while holding the engine's instance
//! lock, so two dispatches never interleave.

use crate::context::ControlContext;
use crate::engine::EngineGuard;
use crate::probes;
use crate::traits::CapError;
use crate::types::*;
use std::collections::HashMap;
use std::time::Instant;

/// Signature for all actions.
pub type ActionHandler =
    fn(&ControlContext, &mut EngineGuard<'_>) -> Result<ActionReport, CommandError>;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("dependency missing: {0}")]
    DependencyMissing(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine: {0}")]
    Engine(String),
    #[error("{0}")]
    Other(String),
}

impl CommandError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::Unsupported(_) => ErrorCode::Unsupported,
            CommandError::DependencyMissing(_) => ErrorCode::DependencyMissing,
            CommandError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            CommandError::Io(_) => ErrorCode::IoError,
            CommandError::Engine(_) => ErrorCode::EngineError,
            CommandError::Other(_) => ErrorCode::InternalError,
        }
    }
}

impl From<CapError> for CommandError {
    fn from(e: CapError) -> Self {
        match e {
            CapError::Unsupported(m) => CommandError::Unsupported(m),
            CapError::DependencyMissing(m) => CommandError::DependencyMissing(m),
            CapError::PermissionDenied(m) => CommandError::PermissionDenied(m),
            CapError::Io(io) => CommandError::Io(io),
            CapError::Engine(m) => CommandError::Engine(m),
            CapError::Other(m) => CommandError::Other(m),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct ActionDispatcher {
    ctx: ControlContext,
    handlers: HashMap<ActionKey, ActionHandler>,
}

impl ActionDispatcher {
    pub fn new(ctx: ControlContext) -> Self {
        let mut d = Self {
            ctx,
            handlers: HashMap::new(),
        };
        d.register(ActionKey::Enable, act_enable);
        d.register(ActionKey::Select, act_select);
        d.register(ActionKey::Colors, act_colors);
        d.register(ActionKey::Schemas, act_schemas);
        d.register(ActionKey::Maintenance, act_maintenance);
        d.register(ActionKey::DeployOpencc, act_deploy_opencc);
        d.register(ActionKey::Deploy, act_deploy);
        d.register(ActionKey::Sync, act_sync);
        d.register(ActionKey::Reset, act_reset);
        d.register(ActionKey::Licensing, act_licensing);
        d
    }

    /// Replace the handler for `action`, e.g. to route a surface elsewhere.
    pub fn register(&mut self, action: ActionKey, handler: ActionHandler) {
        self.handlers.insert(action, handler);
    }

    pub fn ctx(&self) -> &ControlContext {
        &self.ctx
    }

    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }

    /// Run the action named by `key`.
    ///
    /// Unknown keys are `Unhandled` and touch nothing. `Err` is reserved for
    /// failures at the platform boundary; engine failures come back as a
    /// failing [`Notice`] instead.
    pub fn dispatch(&self, key: &str) -> Result<Dispatch, CommandError> {
        let Some(action) = ActionKey::parse(key) else {
            tracing::debug!(key, "unhandled action");
            return Ok(Dispatch::Unhandled);
        };
        let Some(handler) = self.handlers.get(&action) else {
            return Ok(Dispatch::Unhandled);
        };

        let mut engine = self.ctx.engine().lock();
        tracing::info!(action = %action, "dispatching action");
        let report = handler(&self.ctx, &mut engine)?;
        Ok(Dispatch::Handled(report))
    }

    /// Dispatch and wrap the outcome in a full CommandResult.
    pub fn execute(&self, key: &str) -> CommandResult {
        let run_id = new_run_id();
        let start = Instant::now();

        match self.dispatch(key) {
            Ok(Dispatch::Handled(report)) => {
                let mut r = result_ok("dispatch", key, &run_id, start.elapsed().as_millis() as u64);
                if matches!(report.notice, Some(n) if n.outcome == Outcome::Failure) {
                    r.status = Status::Fail;
                }
                let mut data = serde_json::to_value(&report).unwrap_or_default();
                if let (Some(notice), Some(obj)) = (report.notice, data.as_object_mut()) {
                    obj.insert("message".into(), notice.message().into());
                }
                r.data = Some(data);
                r
            }
            Ok(Dispatch::Unhandled) => result_skip(
                "dispatch",
                key,
                &run_id,
                start.elapsed().as_millis() as u64,
                ErrorCode::InvalidInput,
                format!("unhandled action: {}", key),
            ),
            Err(e) => result_err(
                "dispatch",
                key,
                &run_id,
                start.elapsed().as_millis() as u64,
                e.error_code(),
                e.to_string(),
            ),
        }
    }
}

// ===========================================================================
// Built-in actions
// ===========================================================================

/// `enable` – make sure storage is accessible, then send the user to the
/// host's input-method settings unless we are already enabled.
fn act_enable(ctx: &ControlContext, _engine: &mut EngineGuard<'_>) -> Result<ActionReport, CommandError> {
    let perms = ctx.permissions();
    if perms.storage_permission_required() {
        if let Err(e) = perms.request_storage_permission() {
            tracing::warn!(error = %e, "storage permission request failed");
        }
    }

    let enabled = probes::is_enabled(ctx.input_methods(), &ctx.package_identity);
    if !enabled {
        ctx.input_methods().open_input_method_settings()?;
    }

    let mut report = ActionReport::new(ActionKey::Enable);
    report.enabled = Some(enabled);
    Ok(report)
}

/// `select` – show the host's input-method picker.
fn act_select(ctx: &ControlContext, _engine: &mut EngineGuard<'_>) -> Result<ActionReport, CommandError> {
    ctx.input_methods().show_input_method_picker()?;
    Ok(ActionReport::new(ActionKey::Select))
}

fn act_colors(ctx: &ControlContext, engine: &mut EngineGuard<'_>) -> Result<ActionReport, CommandError> {
    engine.ensure_ready();
    let schemes = engine.color_schemes()?;
    if let Some(id) = ctx.surfaces().pick_color_scheme(&schemes)? {
        engine.select_color_scheme(&id)?;
        tracing::info!(scheme = %id, "color scheme selected");
    }
    Ok(ActionReport::new(ActionKey::Colors))
}

fn act_schemas(ctx: &ControlContext, engine: &mut EngineGuard<'_>) -> Result<ActionReport, CommandError> {
    engine.ensure_ready();
    let schemas = engine.schemas()?;
    if let Some(ids) = ctx.surfaces().pick_schemas(&schemas)? {
        engine.select_schemas(&ids)?;
        tracing::info!(schemas = ?ids, "schemas selected");
    }
    Ok(ActionReport::new(ActionKey::Schemas))
}

/// `maintenance` – self-check, then restart the process.
fn act_maintenance(
    _ctx: &ControlContext,
    engine: &mut EngineGuard<'_>,
) -> Result<ActionReport, CommandError> {
    let check = engine.run_self_check(true);
    let mut report = ActionReport::new(ActionKey::Maintenance)
        .with_terminal(TerminalAction::RestartProcess);
    report.check = Some(check);
    Ok(report)
}

fn act_deploy_opencc(
    _ctx: &ControlContext,
    engine: &mut EngineGuard<'_>,
) -> Result<ActionReport, CommandError> {
    let ok = engine.deploy_conversion();
    Ok(ActionReport::new(ActionKey::DeployOpencc)
        .with_notice(Notice::new(NoticeKind::ConversionDeploy, ok)))
}

/// `deploy` – destroy, rebuild everything, invalidate the session, restart.
fn act_deploy(ctx: &ControlContext, engine: &mut EngineGuard<'_>) -> Result<ActionReport, CommandError> {
    engine.destroy();
    engine.initialize(true);
    ctx.sessions().notify_invalidate();
    Ok(ActionReport::new(ActionKey::Deploy).with_terminal(TerminalAction::RestartProcess))
}

fn act_sync(_ctx: &ControlContext, engine: &mut EngineGuard<'_>) -> Result<ActionReport, CommandError> {
    let ok = engine.sync_user_data();
    Ok(ActionReport::new(ActionKey::Sync).with_notice(Notice::new(NoticeKind::Sync, ok)))
}

/// `reset` – confirm, then hand over to the factory-reset collaborator.
fn act_reset(ctx: &ControlContext, _engine: &mut EngineGuard<'_>) -> Result<ActionReport, CommandError> {
    let report = ActionReport::new(ActionKey::Reset);
    if !ctx.surfaces().confirm_factory_reset()? {
        tracing::info!("factory reset declined");
        return Ok(report);
    }
    let ok = match ctx.factory_reset().restore_factory() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "factory reset failed");
            false
        }
    };
    Ok(report.with_notice(Notice::new(NoticeKind::Reset, ok)))
}

fn act_licensing(ctx: &ControlContext, _engine: &mut EngineGuard<'_>) -> Result<ActionReport, CommandError> {
    ctx.surfaces().show_licensing(&ctx.licensing)?;
    Ok(ActionReport::new(ActionKey::Licensing))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restart::conclude;
    use crate::session::ActiveSession;
    use crate::testing::*;
    use serial_test::serial;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    fn ready_dispatcher(engine: MockEngine) -> (ActionDispatcher, Harness) {
        let (ctx, h) = harness(engine);
        ctx.engine().lock().initialize(false);
        h.log.clear();
        (ActionDispatcher::new(ctx), h)
    }

    #[test]
    #[serial]
    fn test_unknown_keys_are_unhandled() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        let counting = Arc::new(CountingSession::default());
        let session: Arc<dyn ActiveSession> = counting.clone();
        d.ctx().sessions().bind(&session);

        for key in ["", "theme", "DEPLOY", "pref_theme", "deploy ", "keyboard"] {
            assert_eq!(d.dispatch(key).unwrap(), Dispatch::Unhandled, "key {:?}", key);
        }

        assert_eq!(d.ctx().engine().state(), EngineState::Ready { full_rebuild: false });
        assert!(h.log.calls().is_empty());
        assert_eq!(counting.count(), 0);
        assert!(d.ctx().sessions().is_bound());
    }

    #[test]
    #[serial]
    fn test_deploy_sequence_with_session() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        let counting = Arc::new(CountingSession::default());
        let session: Arc<dyn ActiveSession> = counting.clone();
        d.ctx().sessions().bind(&session);
        let gate = CountingGate::default();

        let dispatch = d.dispatch("deploy").unwrap();
        let report = dispatch.report().unwrap();
        assert_eq!(report.terminal, Some(TerminalAction::RestartProcess));
        assert_eq!(
            h.log.calls(),
            vec![EngineCall::Destroy, EngineCall::Initialize(true)]
        );
        assert_eq!(d.ctx().engine().state(), EngineState::Ready { full_rebuild: true });
        assert_eq!(counting.count(), 1);

        assert!(conclude(&gate, report));
        assert_eq!(gate.count(), 1);
    }

    #[test]
    #[serial]
    fn test_deploy_sequence_without_session() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        let gate = CountingGate::default();

        let dispatch = d.dispatch("deploy").unwrap();
        assert_eq!(
            h.log.calls(),
            vec![EngineCall::Destroy, EngineCall::Initialize(true)]
        );
        conclude(&gate, dispatch.report().unwrap());
        assert_eq!(gate.count(), 1);
    }

    #[test]
    #[serial]
    fn test_maintenance_checks_then_restarts() {
        let (mut engine, _) = MockEngine::new();
        engine.check_issues = vec!["stale build".into()];
        let (d, h) = ready_dispatcher(engine);

        let dispatch = d.dispatch("maintenance").unwrap();
        let report = dispatch.report().unwrap();
        assert_eq!(h.log.calls(), vec![EngineCall::SelfCheck(true)]);
        assert_eq!(report.terminal, Some(TerminalAction::RestartProcess));
        assert_eq!(report.check.as_ref().map(|c| c.ok), Some(false));
    }

    #[test]
    #[serial]
    fn test_sync_failure_end_to_end() {
        let (mut engine, _) = MockEngine::new();
        engine.sync_ok = false;
        let (d, h) = ready_dispatcher(engine);
        let gate = CountingGate::default();
        let before = d.ctx().engine().state();

        let dispatch = d.dispatch("sync").unwrap();
        let report = dispatch.report().unwrap();
        assert_eq!(
            report.notice,
            Some(Notice {
                kind: NoticeKind::Sync,
                outcome: Outcome::Failure
            })
        );
        assert_eq!(report.terminal, None);
        assert_eq!(d.ctx().engine().state(), before);
        assert_eq!(h.log.calls(), vec![EngineCall::Sync]);

        assert!(!conclude(&gate, report));
        assert_eq!(gate.count(), 0);
    }

    #[test]
    #[serial]
    fn test_sync_failure_result_status() {
        let (mut engine, _) = MockEngine::new();
        engine.sync_ok = false;
        let (d, _) = ready_dispatcher(engine);
        let r = d.execute("sync");
        assert_eq!(r.status, Status::Fail);
        assert_eq!(
            r.notice().map(|n| n.message()),
            Some("user data sync failed")
        );
        let data = r.data.unwrap();
        assert_eq!(data["notice"]["outcome"], "failure");
        assert_eq!(data["message"], "user data sync failed");
    }

    #[test]
    #[serial]
    fn test_deploy_opencc_notice() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        let dispatch = d.dispatch("deploy_opencc").unwrap();
        let report = dispatch.report().unwrap();
        assert_eq!(
            report.notice,
            Some(Notice::new(NoticeKind::ConversionDeploy, true))
        );
        assert_eq!(report.terminal, None);
        assert_eq!(h.log.calls(), vec![EngineCall::DeployConversion]);
    }

    #[test]
    #[serial]
    fn test_deploy_opencc_failure() {
        let (mut engine, _) = MockEngine::new();
        engine.deploy_ok = false;
        let (d, h) = ready_dispatcher(engine);
        let before = d.ctx().engine().state();

        let dispatch = d.dispatch("deploy_opencc").unwrap();
        let report = dispatch.report().unwrap();
        assert_eq!(
            report.notice,
            Some(Notice {
                kind: NoticeKind::ConversionDeploy,
                outcome: Outcome::Failure
            })
        );
        assert_eq!(report.terminal, None);
        assert_eq!(d.ctx().engine().state(), before);

        let r = d.execute("deploy_opencc");
        assert_eq!(r.status, Status::Fail);
        assert_eq!(r.terminal(), None);
        assert_eq!(r.data.unwrap()["message"], "conversion data deploy failed");
        assert_eq!(d.ctx().engine().state(), before);
        assert_eq!(
            h.log.calls(),
            vec![EngineCall::DeployConversion, EngineCall::DeployConversion]
        );
    }

    #[test]
    #[serial]
    fn test_enable_opens_settings_when_disabled() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        h.permissions.set_required(true);

        let dispatch = d.dispatch("enable").unwrap();
        assert_eq!(dispatch.report().unwrap().enabled, Some(false));
        assert_eq!(h.permissions.requests(), 1);
        assert_eq!(h.input_methods.settings_opened(), 1);
        assert!(h.log.calls().is_empty());
    }

    #[test]
    #[serial]
    fn test_enable_skips_settings_when_enabled() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        h.input_methods.set(Ok(vec![im(TEST_PACKAGE)]));

        let dispatch = d.dispatch("pref_enable").unwrap();
        assert_eq!(dispatch.report().unwrap().enabled, Some(true));
        assert_eq!(h.permissions.requests(), 0);
        assert_eq!(h.input_methods.settings_opened(), 0);
    }

    #[test]
    #[serial]
    fn test_select_shows_picker() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        assert!(d.dispatch("select").unwrap().is_handled());
        assert_eq!(h.input_methods.pickers_shown(), 1);
    }

    #[test]
    #[serial]
    fn test_colors_lazily_initializes_and_applies_choice() {
        let (engine, log) = MockEngine::new();
        let (ctx, h) = harness(engine);
        let d = ActionDispatcher::new(ctx);
        h.surfaces.choose_color(Some("dark".into()));

        assert!(d.dispatch("colors").unwrap().is_handled());
        assert_eq!(
            log.calls(),
            vec![
                EngineCall::Initialize(false),
                EngineCall::SelectColor("dark".into())
            ]
        );
        assert_eq!(d.ctx().engine().state(), EngineState::Ready { full_rebuild: false });
    }

    #[test]
    #[serial]
    fn test_schemas_dismissed_changes_nothing() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        assert!(d.dispatch("schemas").unwrap().is_handled());
        assert!(h.log.calls().is_empty());
        assert_eq!(h.surfaces.shown(), vec!["schemas"]);
    }

    #[test]
    #[serial]
    fn test_schemas_applies_selection() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        h.surfaces.choose_schemas(Some(vec!["luna_pinyin".into()]));
        d.dispatch("schemas").unwrap();
        assert_eq!(
            h.log.calls(),
            vec![EngineCall::SelectSchemas(vec!["luna_pinyin".into()])]
        );
    }

    #[test]
    #[serial]
    fn test_reset_declined() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        let dispatch = d.dispatch("reset").unwrap();
        assert_eq!(dispatch.report().unwrap().notice, None);
        assert_eq!(h.reset.count(), 0);
    }

    #[test]
    #[serial]
    fn test_reset_confirmed() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        h.surfaces.confirm_reset(true);
        let dispatch = d.dispatch("reset").unwrap();
        assert_eq!(
            dispatch.report().unwrap().notice,
            Some(Notice::new(NoticeKind::Reset, true))
        );
        assert_eq!(h.reset.count(), 1);
        assert!(h.log.calls().is_empty());
    }

    #[test]
    #[serial]
    fn test_licensing_shows_static_content() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        assert!(d.dispatch("licensing").unwrap().is_handled());
        assert_eq!(h.surfaces.shown(), vec!["licensing"]);
        assert!(h.log.calls().is_empty());
    }

    #[test]
    #[serial]
    fn test_surface_failure_is_error() {
        let (engine, _) = MockEngine::new();
        let (d, h) = ready_dispatcher(engine);
        h.input_methods.fail_picker(true);
        let r = d.execute("select");
        assert_eq!(r.status, Status::Error);
        assert_eq!(r.error.unwrap().code, ErrorCode::Unsupported);
    }

    #[test]
    #[serial]
    fn test_execute_unknown_is_skip() {
        let (engine, _) = MockEngine::new();
        let (d, _) = ready_dispatcher(engine);
        let r = d.execute("nonexistent");
        assert_eq!(r.status, Status::Skip);
        assert_eq!(r.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[test]
    #[serial]
    fn test_list_actions() {
        let (engine, _) = MockEngine::new();
        let (d, _) = ready_dispatcher(engine);
        let names = d.list();
        assert_eq!(names.len(), 10);
        assert!(names.contains(&"deploy"));
        assert!(names.contains(&"deploy_opencc"));
        assert!(names.contains(&"licensing"));
    }

    #[test]
    #[serial]
    fn test_back_to_back_destructive_actions_serialize() {
        let (mut engine, _) = MockEngine::new();
        engine.delay = Duration::from_millis(30);
        let (d, h) = ready_dispatcher(engine);
        let d = Arc::new(d);
        let barrier = Arc::new(Barrier::new(2));

        let threads: Vec<_> = ["deploy", "maintenance"]
            .into_iter()
            .map(|key| {
                let d = Arc::clone(&d);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    d.dispatch(key).unwrap()
                })
            })
            .collect();
        for t in threads {
            assert!(t.join().unwrap().is_handled());
        }

        let calls = h.log.calls();
        let deploy_first = vec![
            EngineCall::Destroy,
            EngineCall::Initialize(true),
            EngineCall::SelfCheck(true),
        ];
        let check_first = vec![
            EngineCall::SelfCheck(true),
            EngineCall::Destroy,
            EngineCall::Initialize(true),
        ];
        assert!(calls == deploy_first || calls == check_first, "interleaved: {:?}", calls);

        let windows = h.log.windows();
        let deploy_start = windows[&EngineCall::Destroy].0;
        let deploy_end = windows[&EngineCall::Initialize(true)].1;
        let (check_start, check_end) = windows[&EngineCall::SelfCheck(true)];
        assert!(
            deploy_end <= check_start || check_end <= deploy_start,
            "deploy and maintenance overlapped"
        );
    }
}
