//! Daemon mode – line-delimited JSON requests over a Unix socket.
//!
//! Each connection gets its own task. A connection that sends `attach`
//! becomes the active input session and receives `{"event":"invalidate"}`
//! lines when the engine is redeployed. Once an action asks for a restart,
//! its response is flushed to the requester (if still connected) and the
//! restart gate runs; dispatches arriving in between are refused.

use lifecycle::types::*;
use lifecycle::{about, probes, restart};
use lifecycle::{ActionDispatcher, ActiveSession, RestartGate};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

pub struct Daemon {
    dispatcher: ActionDispatcher,
    gate: Box<dyn RestartGate>,
    terminating: Mutex<bool>,
}

impl Daemon {
    pub fn new(dispatcher: ActionDispatcher, gate: Box<dyn RestartGate>) -> Self {
        Self {
            dispatcher,
            gate,
            terminating: Mutex::new(false),
        }
    }

    /// Run one action. Serialized with every other dispatch so nothing
    /// slips in after a restart has been decided.
    fn dispatch(&self, key: &str) -> CommandResult {
        let mut terminating = self.terminating.lock().unwrap_or_else(|e| e.into_inner());
        if *terminating {
            return result_err(
                "dispatch",
                key,
                &new_run_id(),
                0,
                ErrorCode::EngineError,
                "engine is restarting".to_string(),
            );
        }
        let result = self.dispatcher.execute(key);
        if result.terminal().is_some() {
            *terminating = true;
        }
        result
    }
}

/// An attached connection seen from the session registry.
struct ConnectionSession {
    id: String,
    tx: mpsc::UnboundedSender<String>,
}

impl ActiveSession for ConnectionSession {
    fn notify_invalidate(&self) {
        let event = serde_json::json!({ "event": "invalidate", "session_id": self.id });
        let _ = self.tx.send(format!("{}\n", event));
    }
}

pub async fn run_daemon(socket_path: PathBuf, daemon: Arc<Daemon>) -> anyhow::Result<()> {
    // Remove stale socket if it exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path).map_err(|e| {
        anyhow::anyhow!("cannot bind socket {}: {}", socket_path.display(), e)
    })?;

    tracing::info!(socket = %socket_path.display(), "imectl daemon listening");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(handle_connection(stream, daemon.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept error");
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, daemon: Arc<Daemon>) {
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let mut session: Option<Arc<dyn ActiveSession>> = None;
    let mut restart_requested = false;
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let (response, terminal) = handle_request(&line, &daemon, &tx, &mut session).await;
        restart_requested = terminal.is_some();
        if tx.send(encode(&response)).is_err() || restart_requested {
            break;
        }
    }

    if let Some(ours) = session.take() {
        detach(&daemon, &ours);
    }
    drop(tx);
    let _ = writer_task.await;

    // The restart is committed once the dispatch reported it; a requester
    // that went away does not cancel it.
    if restart_requested {
        restart::conclude_with(daemon.gate.as_ref(), Some(TerminalAction::RestartProcess));
    }
}

/// Writes queued lines until every sender is gone or the peer stops reading.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if writer.write_all(line.as_bytes()).await.is_err() {
            return;
        }
    }
    let _ = writer.flush().await;
}

fn encode(response: &DaemonResponse) -> String {
    let mut json = serde_json::to_string(response).unwrap_or_else(|_| "{}".into());
    json.push('\n');
    json
}

fn detach(daemon: &Daemon, ours: &Arc<dyn ActiveSession>) {
    let sessions = daemon.dispatcher.ctx().sessions();
    if let Some(current) = sessions.current() {
        if Arc::ptr_eq(&current, ours) {
            sessions.unbind();
        }
    }
}

fn error_response(id: String, code: ErrorCode, message: String) -> DaemonResponse {
    DaemonResponse {
        id,
        result: None,
        error: Some(ErrorInfo {
            code,
            message,
            details: serde_json::Value::Null,
        }),
    }
}

fn param<'a>(req: &'a DaemonRequest, name: &str) -> &'a str {
    req.params.get(name).and_then(|v| v.as_str()).unwrap_or("")
}

/// Blocking control-plane work goes to the blocking pool.
async fn blocking<F>(daemon: &Arc<Daemon>, f: F) -> CommandResult
where
    F: FnOnce(&Daemon) -> CommandResult + Send + 'static,
{
    let daemon = daemon.clone();
    match tokio::task::spawn_blocking(move || f(&daemon)).await {
        Ok(r) => r,
        Err(e) => result_err(
            "daemon",
            "",
            &new_run_id(),
            0,
            ErrorCode::InternalError,
            format!("request task failed: {}", e),
        ),
    }
}

async fn handle_request(
    line: &str,
    daemon: &Arc<Daemon>,
    tx: &mpsc::UnboundedSender<String>,
    session: &mut Option<Arc<dyn ActiveSession>>,
) -> (DaemonResponse, Option<TerminalAction>) {
    let req: DaemonRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            let resp = error_response(
                "unknown".into(),
                ErrorCode::InvalidInput,
                format!("invalid JSON request: {}", e),
            );
            return (resp, None);
        }
    };

    let result = match req.method.as_str() {
        "dispatch" => {
            let key = param(&req, "key").to_string();
            blocking(daemon, move |d| d.dispatch(&key)).await
        }
        "probe" => {
            let target = param(&req, "target").to_string();
            blocking(daemon, move |d| probes::run_probe(&target, d.dispatcher.ctx())).await
        }
        "about" => blocking(daemon, |d| about::run_about(d.dispatcher.ctx())).await,
        "actions" => {
            let mut r = result_ok("actions", "dispatcher", &new_run_id(), 0);
            r.data = Some(serde_json::json!(daemon.dispatcher.list()));
            r
        }
        "attach" => {
            let id = uuid::Uuid::new_v4().to_string();
            let attached: Arc<dyn ActiveSession> = Arc::new(ConnectionSession {
                id: id.clone(),
                tx: tx.clone(),
            });
            daemon.dispatcher.ctx().sessions().bind(&attached);
            *session = Some(attached);
            let mut r = result_ok("attach", "session", &new_run_id(), 0);
            r.data = Some(serde_json::json!({ "session_id": id }));
            r
        }
        "detach" => {
            if let Some(ours) = session.take() {
                detach(daemon, &ours);
            }
            result_ok("detach", "session", &new_run_id(), 0)
        }
        other => {
            let resp = error_response(
                req.id,
                ErrorCode::InvalidInput,
                format!("unknown method: {}", other),
            );
            return (resp, None);
        }
    };

    let terminal = result.terminal();
    let resp = DaemonResponse {
        id: req.id,
        result: Some(result),
        error: None,
    };
    (resp, terminal)
}
