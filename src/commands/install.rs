// Handles the `install` command: provisions the dfcli binary and prints the directory it
// was installed into.

use anyhow::{Context, Result};
use colored::Colorize;
use dfcli_orchestrator::libs::executor::ConsoleSink;
use dfcli_orchestrator::libs::orchestrator::{Orchestration, Orchestrator};
use dfcli_orchestrator::libs::provisioner::ProvisionOutcome;
use dfcli_orchestrator::libs::utilities::cancel::CancellationToken;
use dfcli_orchestrator::log_info;
use std::sync::Arc;

/// # Arguments
/// * `config_flag`: value of `--config`.
/// * `version`: overrides `cli.version`.
/// * `dir`: overrides `cli.install_dir`.
pub fn run(config_flag: Option<&str>, version: Option<String>, dir: Option<String>) -> Result<()> {
    let mut config = super::load(config_flag)?;
    if version.is_some() {
        config.cli.version = version;
    }
    if dir.is_some() {
        config.cli.install_dir = dir;
    }

    let orchestrator =
        Orchestrator::from_config(config, Arc::new(ConsoleSink), CancellationToken::new())?;
    let installation = orchestrator
        .provision()
        .context("provisioning the dfcli binary")?;

    let status = match installation.outcome {
        ProvisionOutcome::Downloaded => "installed".green(),
        ProvisionOutcome::UpToDate | ProvisionOutcome::AlreadyVerified => "up to date".cyan(),
    };
    log_info!(
        "[Install] {} is {}",
        installation.binary_path.display(),
        status
    );
    println!("{}", installation.home_directory.display());
    Ok(())
}
