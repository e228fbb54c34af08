// Handles the `version` command: prints the orchestrator version and the dfcli version the
// configuration asks for.

use colored::Colorize;
use dfcli_orchestrator::libs::utilities::assets::is_latest;
use dfcli_orchestrator::schemas::config::OrchestratorConfig;

/// Version of this build, taken from `Cargo.toml` at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run(config: Option<&OrchestratorConfig>) {
    println!("{} {}", env!("CARGO_PKG_NAME").bold(), VERSION.green());
    if let Some(config) = config {
        let requested = config.cli.version.as_deref();
        let shown = if is_latest(requested) {
            "latest".to_string()
        } else {
            requested.unwrap_or_default().to_string()
        };
        println!("{} {}", config.cli.name, shown.cyan());
    }
}
