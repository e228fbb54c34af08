// Path expansion and the orchestrator's well-known directories.
use crate::{log_debug, log_warn};
use colored::Colorize;
use std::env;
use std::path::PathBuf;

/// Name of the directory under the user's home that holds configuration and tools.
pub const ORCHESTRATOR_DIR_NAME: &str = ".dfcli-orchestrator";

/// Expands `~` and `$VAR` / `${VAR}` references in a user supplied path.
///
/// Unknown variables are left untouched instead of failing, so a path that merely looks
/// like it contains a variable still resolves to something the caller can report.
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            log_warn!(
                "[Paths] Could not expand '{}': {}. Using it as-is.",
                path.yellow(),
                e
            );
            PathBuf::from(shellexpand::tilde(path).as_ref())
        }
    }
}

/// `~/.dfcli-orchestrator`, or `./.dfcli-orchestrator` when no home directory is known.
pub fn orchestrator_dir() -> PathBuf {
    let base = match dirs::home_dir() {
        Some(home) => home,
        None => {
            log_warn!("[Paths] Could not determine home directory, using the current directory.");
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    };
    let dir = base.join(ORCHESTRATOR_DIR_NAME);
    log_debug!(
        "[Paths] Orchestrator directory resolved to {}",
        dir.display().to_string().cyan()
    );
    dir
}
