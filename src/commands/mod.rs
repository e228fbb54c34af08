// Register application subcommands.
// Each module corresponds to one `dfcli-orchestrator` command-line action; shared setup
// (configuration loading, run identity, property parsing) lives here.

// Runs many dfcli commands concurrently from a batch file.
pub mod batch;
// Prints the cache key for a version and properties.
pub mod cache_key;
// Deletes the per-run dfcli home directory.
pub mod cleanup;
// Provisions the dfcli binary.
pub mod install;
// Runs a single dfcli command.
pub mod run;
// Displays the version of the orchestrator.
pub mod version;

use anyhow::{Context, Result};
use dfcli_orchestrator::libs::bootstrap::RunContext;
use dfcli_orchestrator::libs::config_loading::load_config;
use dfcli_orchestrator::libs::executor::parse_property;
use dfcli_orchestrator::libs::paths;
use dfcli_orchestrator::libs::utilities::path_helpers::expand_path;
use dfcli_orchestrator::log_debug;
use dfcli_orchestrator::schemas::config::OrchestratorConfig;
use std::collections::BTreeMap;
use std::env;
use uuid::Uuid;

/// Loads the configuration selected by `--config`, the environment or the default location.
pub fn load(config_flag: Option<&str>) -> Result<OrchestratorConfig> {
    let path = paths::resolve_config_path(config_flag);
    load_config(&path).with_context(|| format!("loading configuration {}", path.display()))
}

/// Identity of this invocation.
///
/// The workspace defaults to the current directory. The run id defaults to `BUILD_NUMBER`
/// when running inside a build job, and to a random id otherwise.
pub fn run_context(run_id: Option<String>, workspace: Option<String>) -> Result<RunContext> {
    let workspace = match workspace {
        Some(dir) => expand_path(&dir),
        None => env::current_dir().context("resolving the current directory")?,
    };
    let run_id = run_id
        .or_else(|| env::var("BUILD_NUMBER").ok())
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    log_debug!("[Run] id '{}' in {}", run_id, workspace.display());
    Ok(RunContext::new(run_id, workspace))
}

/// Parses repeated `--property KEY=VALUE` flags.
pub fn parse_properties(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|p| parse_property(p).map_err(anyhow::Error::from))
        .collect()
}
