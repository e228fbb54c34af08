// Handles the `cache-key` command: prints the key that would be appended to a command,
// without provisioning or running anything.

use anyhow::Result;
use dfcli_orchestrator::libs::cache_key;
use dfcli_orchestrator::log_info;

/// Prints the key, or nothing when no version is given.
pub fn run(version: Option<String>, properties: &[String]) -> Result<()> {
    let properties = super::parse_properties(properties)?;
    match cache_key::build(version.as_deref(), &properties) {
        Some(key) => println!("{}", key),
        None => log_info!("[CacheKey] No version given, no cache key generated"),
    }
    Ok(())
}
