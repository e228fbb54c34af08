// Handles the `batch` command: runs every task of a batch file concurrently in one run and
// reports the results as a table, or as JSON with `--json`.
//
// Individual task failures are part of the report; the command fails only if the run could
// not be prepared or at least one task failed.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use colored::Colorize;
use dfcli_orchestrator::libs::config_loading::load_batch_file;
use dfcli_orchestrator::libs::executor::{NullSink, ToolCommand};
use dfcli_orchestrator::libs::orchestrator::Orchestrator;
use dfcli_orchestrator::libs::task_runner::TaskResult;
use dfcli_orchestrator::libs::utilities::cancel::CancellationToken;
use dfcli_orchestrator::libs::utilities::path_helpers::expand_path;
use dfcli_orchestrator::schemas::execution::ExecutionResult;
use dfcli_orchestrator::{log_info, log_warn};
use prettytable::{Table, row};
use serde::Serialize;
use std::sync::Arc;

/// One line of the batch report.
#[derive(Debug, Serialize)]
pub struct BatchRow {
    pub index: usize,
    /// `None` when the task could not be scheduled.
    pub command: Option<String>,
    pub success: bool,
    pub duration_ms: u128,
    pub started_at: Option<DateTime<Local>>,
    /// `None` when the task never ran or the process did not exit normally.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl From<TaskResult<ToolCommand, ExecutionResult>> for BatchRow {
    fn from(result: TaskResult<ToolCommand, ExecutionResult>) -> Self {
        let exit_code = result.output.as_ref().and_then(ExecutionResult::exit_code);
        let (stdout, stderr) = result
            .output
            .map(|o| (o.stdout, o.stderr))
            .unwrap_or_default();
        BatchRow {
            index: result.index,
            command: result.task.map(|t| t.command),
            success: result.error.is_none(),
            duration_ms: result.duration.as_millis(),
            started_at: result.started_at,
            exit_code,
            stdout,
            stderr,
            error: result.error.map(|e| e.to_string()),
        }
    }
}

/// # Arguments
/// * `tasks_file`: YAML batch file.
/// * `max_concurrency`: overrides `execution.max_concurrency`.
/// * `json`: print the report as JSON instead of a table.
pub fn run(
    config_flag: Option<&str>,
    tasks_file: &str,
    max_concurrency: Option<usize>,
    json: bool,
    workspace: Option<String>,
    run_id: Option<String>,
) -> Result<()> {
    let config = super::load(config_flag)?;
    let path = expand_path(tasks_file);
    let batch = load_batch_file(&path).with_context(|| format!("loading batch {}", path.display()))?;
    if batch.tasks.is_empty() {
        log_warn!("[Batch] {} contains no tasks", path.display());
        return Ok(());
    }
    let run = super::run_context(run_id, workspace)?;
    let commands: Vec<ToolCommand> = batch.tasks.into_iter().map(ToolCommand::from).collect();

    let orchestrator =
        Orchestrator::from_config(config, Arc::new(NullSink), CancellationToken::new())?;
    let rows: Vec<BatchRow> = orchestrator
        .run_batch(&run, commands, max_concurrency)?
        .into_iter()
        .map(BatchRow::from)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_table(&rows);
    }

    let failed = rows.iter().filter(|r| !r.success).count();
    if failed > 0 {
        bail!("{} of {} task(s) failed", failed, rows.len());
    }
    log_info!("[Batch] All {} task(s) succeeded", rows.len().to_string().green());
    Ok(())
}

fn print_table(rows: &[BatchRow]) {
    let mut table = Table::new();
    table.set_titles(row!["#", "Command", "Status", "Exit", "Duration (ms)", "Started", "Error"]);
    for entry in rows {
        let status = if entry.success { "ok" } else { "FAILED" };
        let started = entry
            .started_at
            .map(|t| t.format("%H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| "-".to_string());
        let exit = entry
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(row![
            entry.index + 1,
            entry.command.as_deref().unwrap_or("<not scheduled>"),
            status,
            exit,
            entry.duration_ms,
            started,
            entry.error.as_deref().unwrap_or("")
        ]);
    }
    table.printstd();
}
