// Handles the `cleanup` command: removes the dfcli home directory of a finished run.
// A failed removal is reported but does not fail the command.

use anyhow::Result;
use dfcli_orchestrator::libs::bootstrap::cleanup_run_home;

pub fn run(run_id: String, workspace: Option<String>) -> Result<()> {
    let run = super::run_context(Some(run_id), workspace)?;
    cleanup_run_home(&run.workspace, &run.run_id);
    Ok(())
}
