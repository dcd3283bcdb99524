//! Test doubles for every capability trait.

use crate::context::ControlContext;
use crate::restart::RestartGate;
use crate::session::ActiveSession;
use crate::traits::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const TEST_PACKAGE: &str = "com.osfans.trime";

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EngineCall {
    Destroy,
    Initialize(bool),
    SelfCheck(bool),
    Sync,
    DeployConversion,
    SelectColor(String),
    SelectSchemas(Vec<String>),
}

/// Shared record of native calls with their execution windows.
#[derive(Clone, Default)]
pub struct EngineLog {
    entries: Arc<Mutex<Vec<(EngineCall, Instant, Instant)>>>,
}

impl EngineLog {
    fn record(&self, call: EngineCall, started: Instant) {
        self.entries
            .lock()
            .unwrap()
            .push((call, started, Instant::now()));
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _, _)| c.clone())
            .collect()
    }

    /// Start/end of the last occurrence of each call.
    pub fn windows(&self) -> HashMap<EngineCall, (Instant, Instant)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(c, s, e)| (c.clone(), (*s, *e)))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

pub struct MockEngine {
    log: EngineLog,
    pub fail_initialize: bool,
    pub sync_ok: bool,
    pub deploy_ok: bool,
    pub check_issues: Vec<String>,
    /// Time spent inside every state-changing call.
    pub delay: Duration,
}

impl MockEngine {
    pub fn new() -> (Self, EngineLog) {
        let log = EngineLog::default();
        let engine = Self {
            log: log.clone(),
            fail_initialize: false,
            sync_ok: true,
            deploy_ok: true,
            check_issues: vec![],
            delay: Duration::ZERO,
        };
        (engine, log)
    }

    fn work(&self) -> Instant {
        let started = Instant::now();
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        started
    }
}

impl NativeEngine for MockEngine {
    fn destroy(&mut self) {
        let t = self.work();
        self.log.record(EngineCall::Destroy, t);
    }

    fn initialize(&mut self, full_rebuild: bool) -> CapResult<()> {
        let t = self.work();
        self.log.record(EngineCall::Initialize(full_rebuild), t);
        if self.fail_initialize {
            return Err(CapError::Engine("corrupt build".into()));
        }
        Ok(())
    }

    fn run_self_check(&mut self, schedule_restart: bool) -> CapResult<CheckFindings> {
        let t = self.work();
        self.log.record(EngineCall::SelfCheck(schedule_restart), t);
        Ok(CheckFindings {
            issues: self.check_issues.clone(),
        })
    }

    fn sync_user_data(&mut self) -> bool {
        let t = self.work();
        self.log.record(EngineCall::Sync, t);
        self.sync_ok
    }

    fn deploy_conversion(&mut self) -> bool {
        let t = self.work();
        self.log.record(EngineCall::DeployConversion, t);
        self.deploy_ok
    }

    fn engine_version(&self) -> String {
        "1.9.0".into()
    }

    fn conversion_library_version(&self) -> String {
        "1.1.6".into()
    }

    fn color_schemes(&self) -> CapResult<Vec<ColorScheme>> {
        Ok(vec![
            ColorScheme {
                id: "aqua".into(),
                name: "Aqua".into(),
                selected: true,
            },
            ColorScheme {
                id: "dark".into(),
                name: "Dark".into(),
                selected: false,
            },
        ])
    }

    fn select_color_scheme(&mut self, id: &str) -> CapResult<()> {
        self.log
            .record(EngineCall::SelectColor(id.to_string()), Instant::now());
        Ok(())
    }

    fn schemas(&self) -> CapResult<Vec<SchemaItem>> {
        Ok(vec![SchemaItem {
            id: "luna_pinyin".into(),
            name: "Luna Pinyin".into(),
            selected: true,
        }])
    }

    fn select_schemas(&mut self, ids: &[String]) -> CapResult<()> {
        self.log
            .record(EngineCall::SelectSchemas(ids.to_vec()), Instant::now());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session and restart
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CountingSession {
    count: AtomicUsize,
}

impl CountingSession {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ActiveSession for CountingSession {
    fn notify_invalidate(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct CountingGate {
    count: AtomicUsize,
}

impl CountingGate {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RestartGate for CountingGate {
    fn terminate_for_reset(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

pub fn im(package: &str) -> InputMethodInfo {
    InputMethodInfo {
        id: format!("{}/.Ime", package),
        package: package.to_string(),
    }
}

#[derive(Clone, Default)]
pub struct ScriptedInputMethods {
    enabled: Arc<Mutex<Vec<InputMethodInfo>>>,
    error: Arc<Mutex<Option<String>>>,
    queries: Arc<AtomicUsize>,
    pickers: Arc<AtomicUsize>,
    settings: Arc<AtomicUsize>,
    picker_fails: Arc<AtomicBool>,
}

impl ScriptedInputMethods {
    pub fn with(list: Result<Vec<InputMethodInfo>, String>) -> Self {
        let ims = Self::default();
        ims.set(list);
        ims
    }

    pub fn set(&self, list: Result<Vec<InputMethodInfo>, String>) {
        match list {
            Ok(l) => {
                *self.enabled.lock().unwrap() = l;
                *self.error.lock().unwrap() = None;
            }
            Err(e) => *self.error.lock().unwrap() = Some(e),
        }
    }

    pub fn fail_picker(&self, fail: bool) {
        self.picker_fails.store(fail, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn pickers_shown(&self) -> usize {
        self.pickers.load(Ordering::SeqCst)
    }

    pub fn settings_opened(&self) -> usize {
        self.settings.load(Ordering::SeqCst)
    }
}

impl InputMethodOps for ScriptedInputMethods {
    fn enabled_input_methods(&self) -> CapResult<Vec<InputMethodInfo>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.error.lock().unwrap().clone() {
            return Err(CapError::Other(e));
        }
        Ok(self.enabled.lock().unwrap().clone())
    }

    fn show_input_method_picker(&self) -> CapResult<()> {
        if self.picker_fails.load(Ordering::SeqCst) {
            return Err(CapError::Unsupported("no picker".into()));
        }
        self.pickers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_input_method_settings(&self) -> CapResult<()> {
        self.settings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingPermissions {
    required: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
}

impl RecordingPermissions {
    pub fn set_required(&self, required: bool) {
        self.required.store(required, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionOps for RecordingPermissions {
    fn storage_permission_required(&self) -> bool {
        self.required.load(Ordering::SeqCst)
    }

    fn request_storage_permission(&self) -> CapResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct ScriptedSurfaces {
    color: Arc<Mutex<Option<String>>>,
    schemas: Arc<Mutex<Option<Vec<String>>>>,
    confirm: Arc<AtomicBool>,
    shown: Arc<Mutex<Vec<&'static str>>>,
}

impl ScriptedSurfaces {
    pub fn choose_color(&self, id: Option<String>) {
        *self.color.lock().unwrap() = id;
    }

    pub fn choose_schemas(&self, ids: Option<Vec<String>>) {
        *self.schemas.lock().unwrap() = ids;
    }

    pub fn confirm_reset(&self, confirm: bool) {
        self.confirm.store(confirm, Ordering::SeqCst);
    }

    pub fn shown(&self) -> Vec<&'static str> {
        self.shown.lock().unwrap().clone()
    }

    fn mark(&self, surface: &'static str) {
        self.shown.lock().unwrap().push(surface);
    }
}

impl SurfaceOps for ScriptedSurfaces {
    fn pick_color_scheme(&self, _schemes: &[ColorScheme]) -> CapResult<Option<String>> {
        self.mark("colors");
        Ok(self.color.lock().unwrap().clone())
    }

    fn pick_schemas(&self, _schemas: &[SchemaItem]) -> CapResult<Option<Vec<String>>> {
        self.mark("schemas");
        Ok(self.schemas.lock().unwrap().clone())
    }

    fn confirm_factory_reset(&self) -> CapResult<bool> {
        self.mark("reset");
        Ok(self.confirm.load(Ordering::SeqCst))
    }

    fn show_licensing(&self, content: &str) -> CapResult<()> {
        assert!(!content.is_empty());
        self.mark("licensing");
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingFactoryReset {
    count: Arc<AtomicUsize>,
}

impl RecordingFactoryReset {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl FactoryReset for RecordingFactoryReset {
    fn restore_factory(&self) -> CapResult<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub log: EngineLog,
    pub input_methods: ScriptedInputMethods,
    pub permissions: RecordingPermissions,
    pub surfaces: ScriptedSurfaces,
    pub reset: RecordingFactoryReset,
}

/// A context around `engine` whose collaborators can be inspected.
/// Callers must be `#[serial]`: the context owns the process's engine handle.
pub fn harness(engine: MockEngine) -> (ControlContext, Harness) {
    let h = Harness {
        log: engine.log.clone(),
        input_methods: ScriptedInputMethods::default(),
        permissions: RecordingPermissions::default(),
        surfaces: ScriptedSurfaces::default(),
        reset: RecordingFactoryReset::default(),
    };
    let ctx = ControlContext::new(
        Box::new(engine),
        TEST_PACKAGE,
        Box::new(h.input_methods.clone()),
        Box::new(h.permissions.clone()),
        Box::new(h.surfaces.clone()),
        Box::new(h.reset.clone()),
    )
    .expect("no other engine handle alive");
    (ctx, h)
}
