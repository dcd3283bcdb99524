//! `imectl` – headless harness and daemon for the input engine control plane.
//!
//! Runs the same lifecycle logic that backs the preference screen, against a
//! filesystem engine and host integrations chosen by configuration.

mod config;
mod logging;
mod serve;
mod surfaces;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::ImectlConfig;
use lifecycle::native::{EngineDirs, FilesystemEngine};
use lifecycle::platform::*;
use lifecycle::traits::{FactoryReset, InputMethodInfo, InputMethodOps, SurfaceOps};
use lifecycle::types::*;
use lifecycle::{restart, ActionDispatcher, ControlContext, ProcessRestartGate, RestartGate};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "imectl",
    version,
    about = "Lifecycle control for the input engine"
)]
struct Cli {
    /// Extra configuration file, applied over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Versions, enablement and environment facts.
    About {
        #[arg(long)]
        json: bool,
    },

    /// List the action keys the dispatcher handles.
    Actions {
        #[arg(long)]
        json: bool,
    },

    /// Dispatch a preference action by key (e.g. "deploy" or "pref_sync").
    Dispatch {
        key: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Directory for artifacts output.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// Targeted check: enablement | engine
    Probe {
        target: String,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// Run a scripted scenario from a YAML file.
    RunScenario {
        /// Path to the scenario YAML file.
        file: PathBuf,
        #[arg(long)]
        artifacts: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Start daemon mode over a Unix socket.
    Serve {
        /// Path for the Unix domain socket.
        #[arg(long)]
        socket: PathBuf,
    },
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init_logging(&cfg.logging);

    let dispatcher = build_dispatcher(&cfg)?;
    let gate = ProcessRestartGate::new(cfg.restart.exit_code);

    match cli.command {
        Commands::About { json } => {
            let result = lifecycle::about::run_about(dispatcher.ctx());
            output_result(&result, json);
        }
        Commands::Actions { json } => cmd_actions(&dispatcher, json),
        Commands::Dispatch {
            key,
            json,
            artifacts,
        } => {
            let result = dispatcher.execute(&key);
            if let Some(ref dir) = artifacts {
                write_artifacts(dir, &result);
            }
            print_result(&result, json);
            // Last step: nothing may run after the gate.
            restart::conclude_with(&gate, result.terminal());
            exit_for(result.status);
        }
        Commands::Probe {
            target,
            json,
            artifacts,
        } => {
            let result = lifecycle::probes::run_probe(&target, dispatcher.ctx());
            if let Some(ref dir) = artifacts {
                write_artifacts(dir, &result);
            }
            output_result(&result, json);
        }
        Commands::RunScenario {
            file,
            artifacts,
            json,
        } => cmd_run_scenario(&file, json, artifacts, &dispatcher, &gate),
        Commands::Serve { socket } => {
            let daemon = serve::Daemon::new(dispatcher, Box::new(gate));
            serve::run_daemon(socket, Arc::new(daemon)).await?;
        }
    }
    Ok(())
}

// ===========================================================================
// Wiring
// ===========================================================================

fn build_dispatcher(cfg: &ImectlConfig) -> anyhow::Result<ActionDispatcher> {
    let engine = FilesystemEngine::new(
        Box::new(StdFilesystem),
        EngineDirs {
            user_dir: cfg.data.user_dir.clone(),
            shared_dir: cfg.data.shared_dir.clone(),
            sync_dir: cfg.data.sync_dir.clone(),
            installation_id: cfg.data.installation_id.clone(),
        },
    );

    let ims = &cfg.input_methods;
    let input_methods: Box<dyn InputMethodOps> = match &ims.list_command {
        Some(list) => Box::new(CommandInputMethods {
            list: list.clone(),
            picker: ims.picker_command.clone(),
            settings: ims.settings_command.clone(),
        }),
        None => Box::new(StaticInputMethods::new(
            ims.enabled
                .iter()
                .map(|p| InputMethodInfo {
                    id: p.clone(),
                    package: p.clone(),
                })
                .collect(),
        )),
    };

    let surfaces: Box<dyn SurfaceOps> = if cfg.surfaces.interactive && !detect_headless() {
        Box::new(surfaces::TerminalSurfaces::new())
    } else {
        Box::new(HeadlessSurfaces)
    };

    let factory_reset: Box<dyn FactoryReset> = match &cfg.reset.factory_dir {
        Some(dir) => Box::new(DirectoryFactoryReset::new(
            Box::new(StdFilesystem),
            dir.clone(),
            cfg.data.user_dir.clone(),
        )),
        None => Box::new(UnsupportedFactoryReset),
    };

    let ctx = ControlContext::new(
        Box::new(engine),
        cfg.package_identity.clone(),
        input_methods,
        Box::new(GrantedPermissions),
        surfaces,
        factory_reset,
    )?;
    Ok(ActionDispatcher::new(ctx))
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

fn cmd_actions(dispatcher: &ActionDispatcher, json: bool) {
    let actions: Vec<(&'static str, bool)> = dispatcher
        .list()
        .into_iter()
        .map(|name| {
            let restarts = ActionKey::parse(name).is_some_and(|k| k.restarts_process());
            (name, restarts)
        })
        .collect();

    if json {
        let list: Vec<serde_json::Value> = actions
            .iter()
            .map(|(name, restarts)| serde_json::json!({ "key": name, "restarts_process": restarts }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&list).unwrap_or_default());
    } else {
        for (name, restarts) in actions {
            if restarts {
                println!("{}  (restarts process)", name);
            } else {
                println!("{}", name);
            }
        }
    }
}

fn cmd_run_scenario(
    file: &Path,
    json: bool,
    artifacts: Option<PathBuf>,
    dispatcher: &ActionDispatcher,
    gate: &dyn RestartGate,
) {
    let yaml = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            let r = result_err(
                "run-scenario",
                &file.display().to_string(),
                &new_run_id(),
                0,
                ErrorCode::IoError,
                format!("cannot read scenario file: {}", e),
            );
            output_result(&r, json);
            return;
        }
    };

    let scenario = match lifecycle::scenario::load_scenario(&yaml) {
        Ok(s) => s,
        Err(e) => {
            let r = result_err(
                "run-scenario",
                &file.display().to_string(),
                &new_run_id(),
                0,
                ErrorCode::InvalidInput,
                e,
            );
            output_result(&r, json);
            return;
        }
    };

    let scenario_result = lifecycle::scenario::run_scenario(&scenario, dispatcher);

    if json {
        let j = serde_json::to_string_pretty(&scenario_result).unwrap_or_default();
        println!("{}", j);
    } else {
        println!(
            "Scenario: {}",
            scenario_result.name.as_deref().unwrap_or("<unnamed>")
        );
        println!("Overall: {:?}", scenario_result.overall_status);
        for (i, sr) in scenario_result.step_results.iter().enumerate() {
            println!(
                "  Step {}: {} -> {:?} ({}ms)",
                i, sr.target, sr.status, sr.timing_ms.total
            );
        }
        if scenario_result.terminal.is_some() {
            println!("  restart requested; remaining steps not run");
        }
    }

    if let Some(ref dir) = artifacts {
        let art_dir = dir.join(new_run_id());
        let _ = std::fs::create_dir_all(&art_dir);
        let j = serde_json::to_string_pretty(&scenario_result).unwrap_or_default();
        let _ = std::fs::write(art_dir.join("result.json"), j);

        // Write per-step results as events.jsonl
        let mut lines = String::new();
        for sr in &scenario_result.step_results {
            if let Ok(line) = serde_json::to_string(sr) {
                lines.push_str(&line);
                lines.push('\n');
            }
        }
        let _ = std::fs::write(art_dir.join("events.jsonl"), lines);
    }

    restart::conclude_with(gate, scenario_result.terminal);
    exit_for(scenario_result.overall_status);
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn output_result(result: &CommandResult, json: bool) {
    print_result(result, json);
    exit_for(result.status);
}

fn print_result(result: &CommandResult, json: bool) {
    if json {
        let j = serde_json::to_string_pretty(result).unwrap_or_default();
        println!("{}", j);
    } else {
        print_human(result);
    }
}

/// Exit with non-zero status on error/fail.
fn exit_for(status: Status) {
    match status {
        Status::Pass | Status::Skip => {}
        Status::Fail => std::process::exit(1),
        Status::Error => std::process::exit(2),
    }
}

fn print_human(r: &CommandResult) {
    let status_icon = match r.status {
        Status::Pass => "PASS",
        Status::Fail => "FAIL",
        Status::Skip => "SKIP",
        Status::Error => "ERROR",
    };

    println!("[{}] {} {}", status_icon, r.command, r.target);
    println!("  run_id: {}", r.run_id);
    println!("  timing: {}ms", r.timing_ms.total);

    for (step, ms) in &r.timing_ms.steps {
        println!("    {}: {}ms", step, ms);
    }

    if let Some(ref err) = r.error {
        println!("  error:  {} – {}", err.code, err.message);
    }

    if let Some(notice) = r.notice() {
        println!("  notice: {}", notice.message());
    }

    if let Some(ref data) = r.data {
        if let Ok(s) = serde_json::to_string_pretty(data) {
            for line in s.lines() {
                println!("  {}", line);
            }
        }
    }

    println!(
        "  env: os={} arch={} headless={}",
        r.env_summary.os, r.env_summary.arch, r.env_summary.headless
    );
}

// ===========================================================================
// Artifact helpers
// ===========================================================================

fn write_artifacts(dir: &Path, result: &CommandResult) {
    let art_dir = dir.join(&result.run_id);
    if let Err(e) = std::fs::create_dir_all(&art_dir) {
        tracing::warn!(dir = %art_dir.display(), error = %e, "failed to create artifacts dir");
        return;
    }

    let j = serde_json::to_string_pretty(result).unwrap_or_default();
    let _ = std::fs::write(art_dir.join("result.json"), &j);

    // events.jsonl (single event for non-scenario)
    if let Ok(line) = serde_json::to_string(result) {
        let _ = std::fs::write(art_dir.join("events.jsonl"), format!("{}\n", line));
    }
}
