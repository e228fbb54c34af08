// Resolves where the configuration file and the tool installation live.
use crate::libs::utilities::path_helpers::{expand_path, orchestrator_dir};
use crate::log_debug;
use crate::schemas::config::CliSettings;
use colored::Colorize;
use std::env;
use std::path::PathBuf;

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV_VAR: &str = "DFCLI_ORCHESTRATOR_CONFIG";

/// Determines the configuration file path.
///
/// Precedence: the `--config` flag, then `DFCLI_ORCHESTRATOR_CONFIG`, then
/// `~/.dfcli-orchestrator/config.yaml`.
///
/// # Arguments
/// * `flag`: value of the `--config` command-line flag, if given.
pub fn resolve_config_path(flag: Option<&str>) -> PathBuf {
    let from_env = env::var(CONFIG_ENV_VAR).ok().filter(|v| !v.trim().is_empty());
    let resolved = match (flag, from_env) {
        (Some(path), _) => expand_path(path),
        (None, Some(path)) => expand_path(&path),
        (None, None) => orchestrator_dir().join("config.yaml"),
    };
    log_debug!(
        "[Paths] Using configuration file {}",
        resolved.display().to_string().cyan()
    );
    resolved
}

/// Directory the tool binary is installed into: the configured `install_dir`, or
/// `~/.dfcli-orchestrator/tools/<name>`.
pub fn resolve_install_dir(cli: &CliSettings) -> PathBuf {
    match cli.install_dir.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(dir) => expand_path(dir),
        None => orchestrator_dir().join("tools").join(&cli.name),
    }
}
