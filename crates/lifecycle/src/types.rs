use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// The closed set of configuration actions the control plane understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKey {
    Enable,
    Select,
    Colors,
    Schemas,
    Maintenance,
    DeployOpencc,
    Deploy,
    Sync,
    Reset,
    Licensing,
}

impl ActionKey {
    pub const ALL: [ActionKey; 10] = [
        ActionKey::Enable,
        ActionKey::Select,
        ActionKey::Colors,
        ActionKey::Schemas,
        ActionKey::Maintenance,
        ActionKey::DeployOpencc,
        ActionKey::Deploy,
        ActionKey::Sync,
        ActionKey::Reset,
        ActionKey::Licensing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKey::Enable => "enable",
            ActionKey::Select => "select",
            ActionKey::Colors => "colors",
            ActionKey::Schemas => "schemas",
            ActionKey::Maintenance => "maintenance",
            ActionKey::DeployOpencc => "deploy_opencc",
            ActionKey::Deploy => "deploy",
            ActionKey::Sync => "sync",
            ActionKey::Reset => "reset",
            ActionKey::Licensing => "licensing",
        }
    }

    /// Parse a key, accepting the `pref_` prefix used by preference screens.
    /// Unknown keys yield `None`.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.strip_prefix("pref_").unwrap_or(key);
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Actions that end with the process being restarted.
    pub fn restarts_process(&self) -> bool {
        matches!(self, ActionKey::Deploy | ActionKey::Maintenance)
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl From<bool> for Outcome {
    fn from(ok: bool) -> Self {
        if ok {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Sync,
    ConversionDeploy,
    Reset,
}

/// A binary outcome to be shown to the user once the action finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub outcome: Outcome,
}

impl Notice {
    pub fn new(kind: NoticeKind, ok: bool) -> Self {
        Self {
            kind,
            outcome: ok.into(),
        }
    }

    pub fn message(&self) -> &'static str {
        match (self.kind, self.outcome) {
            (NoticeKind::Sync, Outcome::Success) => "user data synced",
            (NoticeKind::Sync, Outcome::Failure) => "user data sync failed",
            (NoticeKind::ConversionDeploy, Outcome::Success) => "conversion data deployed",
            (NoticeKind::ConversionDeploy, Outcome::Failure) => "conversion data deploy failed",
            (NoticeKind::Reset, Outcome::Success) => "factory configuration restored",
            (NoticeKind::Reset, Outcome::Failure) => "factory reset failed",
        }
    }
}

/// What the caller has to do after the dispatcher returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalAction {
    RestartProcess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub action: ActionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalAction>,
    /// Enablement observed by `enable` before it opened any surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckReport>,
}

impl ActionReport {
    pub fn new(action: ActionKey) -> Self {
        Self {
            action,
            notice: None,
            terminal: None,
            enabled: None,
            check: None,
        }
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }

    pub fn with_terminal(mut self, terminal: TerminalAction) -> Self {
        self.terminal = Some(terminal);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Handled(ActionReport),
    Unhandled,
}

impl Dispatch {
    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }

    pub fn report(&self) -> Option<&ActionReport> {
        match self {
            Dispatch::Handled(r) => Some(r),
            Dispatch::Unhandled => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum EngineState {
    Uninitialized,
    Ready { full_rebuild: bool },
    Destroyed,
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub ok: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    pub restart_scheduled: bool,
}

// ---------------------------------------------------------------------------
// Final result JSON – the stable output contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub run_id: String,
    pub command: String,
    pub target: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub timing_ms: TimingInfo,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub env_summary: EnvSummary,
    /// Arbitrary command-specific payload returned on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResult {
    /// The terminal action carried in `data`, if the command produced one.
    pub fn terminal(&self) -> Option<TerminalAction> {
        self.data
            .as_ref()
            .and_then(|d| d.get("terminal"))
            .and_then(|t| serde_json::from_value(t.clone()).ok())
    }

    /// The user-facing notice carried in `data`, if the action produced one.
    pub fn notice(&self) -> Option<Notice> {
        self.data
            .as_ref()
            .and_then(|d| d.get("notice"))
            .and_then(|n| serde_json::from_value(n.clone()).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Skip,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    Unsupported,
    DependencyMissing,
    PermissionDenied,
    IoError,
    EngineError,
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimingInfo {
    pub total: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub steps: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvSummary {
    pub os: String,
    pub arch: String,
    pub headless: bool,
}

impl Default for EnvSummary {
    fn default() -> Self {
        Self {
            os: current_os().to_string(),
            arch: std::env::consts::ARCH.to_string(),
            headless: detect_headless(),
        }
    }
}

// ---------------------------------------------------------------------------
// About report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AboutReport {
    pub control_version: String,
    pub engine_version: String,
    pub conversion_library_version: String,
    pub package_identity: String,
    pub enabled: bool,
    pub engine: EngineState,
    pub session_bound: bool,
    pub os_name: String,
    pub arch: String,
    pub headless: bool,
}

// ---------------------------------------------------------------------------
// Scenario types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioStep {
    Action {
        action: String,
        #[serde(default = "default_expect_status")]
        expect_status: String,
    },
    Probe {
        probe: String,
    },
}

fn default_expect_status() -> String {
    "pass".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: Option<String>,
    pub overall_status: Status,
    pub step_results: Vec<CommandResult>,
    /// Set when a step asked for a restart; remaining steps were not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalAction>,
}

// ---------------------------------------------------------------------------
// Serve / daemon protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn current_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "macos",
        "linux" => "linux",
        "windows" => "windows",
        other => other,
    }
}

pub fn detect_headless() -> bool {
    match std::env::consts::OS {
        "linux" => {
            // No X11 or Wayland display → headless
            std::env::var("DISPLAY").is_err() && std::env::var("WAYLAND_DISPLAY").is_err()
        }
        "macos" => std::env::var("SSH_TTY").is_ok() && std::env::var("DISPLAY").is_err(),
        _ => false,
    }
}

/// Generate a new run ID (UUIDv4).
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build a successful CommandResult shell (caller fills in data).
pub fn result_ok(command: &str, target: &str, run_id: &str, total_ms: u64) -> CommandResult {
    result_with_status(command, target, run_id, total_ms, Status::Pass, None)
}

/// Build an error CommandResult.
pub fn result_err(
    command: &str,
    target: &str,
    run_id: &str,
    total_ms: u64,
    code: ErrorCode,
    message: impl Into<String>,
) -> CommandResult {
    let error = ErrorInfo {
        code,
        message: message.into(),
        details: serde_json::Value::Null,
    };
    result_with_status(command, target, run_id, total_ms, Status::Error, Some(error))
}

/// Build a skip CommandResult.
pub fn result_skip(
    command: &str,
    target: &str,
    run_id: &str,
    total_ms: u64,
    code: ErrorCode,
    reason: impl Into<String>,
) -> CommandResult {
    let error = ErrorInfo {
        code,
        message: reason.into(),
        details: serde_json::Value::Null,
    };
    result_with_status(command, target, run_id, total_ms, Status::Skip, Some(error))
}

fn result_with_status(
    command: &str,
    target: &str,
    run_id: &str,
    total_ms: u64,
    status: Status,
    error: Option<ErrorInfo>,
) -> CommandResult {
    CommandResult {
        run_id: run_id.to_string(),
        command: command.to_string(),
        target: target.to_string(),
        status,
        error,
        timing_ms: TimingInfo {
            total: total_ms,
            steps: HashMap::new(),
        },
        artifacts: vec![],
        env_summary: EnvSummary::default(),
        data: None,
    }
}
