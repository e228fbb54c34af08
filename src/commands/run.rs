// Handles the `run` command: bootstraps the run environment, configures servers on first
// use and executes one dfcli command. The tool's stdout is printed once the process exits.

use anyhow::Result;
use colored::Colorize;
use dfcli_orchestrator::libs::executor::{ConsoleSink, ToolCommand};
use dfcli_orchestrator::libs::orchestrator::{Orchestration, Orchestrator};
use dfcli_orchestrator::libs::utilities::cancel::CancellationToken;
use dfcli_orchestrator::log_info;
use std::sync::Arc;

/// Arguments of the `run` command.
#[derive(Debug, Default)]
pub struct RunArgs {
    /// The dfcli command, e.g. `["rt", "ping"]`.
    pub command: Vec<String>,
    pub version: Option<String>,
    pub properties: Vec<String>,
    pub cache_key: Option<String>,
    pub retries: Option<u32>,
    pub workspace: Option<String>,
    pub run_id: Option<String>,
}

pub fn run(config_flag: Option<&str>, args: RunArgs) -> Result<()> {
    let config = super::load(config_flag)?;
    let run = super::run_context(args.run_id, args.workspace)?;

    let mut command = ToolCommand::new(args.command.join(" "));
    command.version = args.version;
    command.properties = super::parse_properties(&args.properties)?;
    command.cache_key = args.cache_key;

    let mut orchestrator =
        Orchestrator::from_config(config, Arc::new(ConsoleSink), CancellationToken::new())?;
    if let Some(retries) = args.retries {
        orchestrator = orchestrator.with_retry_attempts(retries);
    }

    let result = orchestrator.execute(&run, &command)?;
    log_info!(
        "[Run] {} finished in {} ms",
        command.command.bold(),
        result.duration_ms()
    );
    Ok(())
}
