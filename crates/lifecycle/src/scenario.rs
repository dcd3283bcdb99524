//! Scenario runner – execute scripted action flows from YAML files.

use crate::commands::ActionDispatcher;
use crate::probes;
use crate::types::*;

/// Load a scenario from a YAML string.
pub fn load_scenario(yaml: &str) -> Result<Scenario, String> {
    serde_yaml::from_str(yaml).map_err(|e| format!("failed to parse scenario YAML: {}", e))
}

/// Execute a scenario and return the overall result.
///
/// A step that asks for a process restart ends the run; the terminal action
/// is handed back to the caller.
pub fn run_scenario(scenario: &Scenario, dispatcher: &ActionDispatcher) -> ScenarioResult {
    let mut step_results = Vec::new();
    let mut overall = Status::Pass;
    let mut terminal = None;

    for (i, step) in scenario.steps.iter().enumerate() {
        let result = match step {
            ScenarioStep::Action {
                action,
                expect_status,
            } => {
                let r = dispatcher.execute(action);
                let actual_status = serde_json::to_value(r.status)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                if actual_status != *expect_status {
                    tracing::warn!(
                        step = i,
                        expected = %expect_status,
                        actual = %actual_status,
                        "scenario step status mismatch"
                    );
                    overall = Status::Fail;
                }
                r
            }
            ScenarioStep::Probe { probe } => {
                let r = probes::run_probe(probe, dispatcher.ctx());
                if r.status != Status::Pass && r.status != Status::Skip {
                    overall = Status::Fail;
                }
                r
            }
        };
        let stop = result.terminal();
        step_results.push(result);
        if stop.is_some() {
            if i + 1 < scenario.steps.len() {
                tracing::info!(step = i, "restart requested, remaining steps skipped");
            }
            terminal = stop;
            break;
        }
    }

    ScenarioResult {
        name: scenario.name.clone(),
        overall_status: overall,
        step_results,
        terminal,
    }
}
