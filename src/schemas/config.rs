// Defines the data structures for the orchestrator's YAML configuration file
// and for batch task files. Every field has a default so that a partial file
// (or no file at all) still yields a usable configuration.

use crate::schemas::servers::{ProxySettings, ServerProfile};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const DEFAULT_BINARY_NAME: &str = "dfcli";
pub const DEFAULT_RELEASE_BASE_URL: &str = "https://github.com/nickheyer/distroface/releases";
pub const DEFAULT_CHECKSUM_HEADER: &str = "X-Checksum-Sha256";

/// Root of `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub cli: CliSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    /// Allows plain `http://` server URLs.
    #[serde(default)]
    pub allow_http_connections: bool,
    #[serde(default)]
    pub proxy: Option<ProxySettings>,
    #[serde(default)]
    pub servers: Vec<ServerProfile>,
}

/// Where the tool comes from and where it is installed.
#[derive(Debug, Clone, Deserialize)]
pub struct CliSettings {
    #[serde(default = "default_binary_name")]
    pub name: String,
    /// Empty or absent means "latest".
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_release_base_url")]
    pub release_base_url: String,
    /// Defaults to `~/.dfcli-orchestrator/tools/<name>`.
    #[serde(default)]
    pub install_dir: Option<String>,
    #[serde(default = "default_checksum_header")]
    pub checksum_header: String,
}

impl Default for CliSettings {
    fn default() -> Self {
        CliSettings {
            name: default_binary_name(),
            version: None,
            release_base_url: default_release_base_url(),
            install_dir: None,
            checksum_header: default_checksum_header(),
        }
    }
}

/// Knobs for running tool processes.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings {
            max_concurrency: default_max_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: None,
        }
    }
}

fn default_binary_name() -> String {
    DEFAULT_BINARY_NAME.to_string()
}

fn default_release_base_url() -> String {
    DEFAULT_RELEASE_BASE_URL.to_string()
}

fn default_checksum_header() -> String {
    DEFAULT_CHECKSUM_HEADER.to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

/// A batch file: a list of dfcli commands to run concurrently.
///
/// ```yaml
/// tasks:
///   - command: rt ping
///   - command: rt upload build/app.tar.gz generic-local/app/
///     version: 1.4.0
///     properties:
///       arch: amd64
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchFile {
    #[serde(default)]
    pub tasks: Vec<BatchTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchTask {
    pub command: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub cache_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: OrchestratorConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.cli.name, "dfcli");
        assert_eq!(config.cli.checksum_header, DEFAULT_CHECKSUM_HEADER);
        assert_eq!(config.execution.max_concurrency, 4);
        assert_eq!(config.execution.retry_attempts, 3);
        assert!(config.servers.is_empty());
        assert!(!config.allow_http_connections);
    }

    #[test]
    fn servers_and_proxy_parse() {
        let yaml = r#"
cli:
  version: "2.31.3"
proxy:
  host: proxy.corp
  port: 3128
  no_proxy: "localhost | .corp"
servers:
  - id: prod
    url: https://df.example.com
    credentials:
      access_token: abc
  - id: staging
    url: https://staging.example.com
    credentials_id: staging
"#;
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cli.version.as_deref(), Some("2.31.3"));
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].credentials.access_token.expose(), "abc");
        assert_eq!(config.servers[1].credentials_id.as_deref(), Some("staging"));
        assert_eq!(config.proxy.unwrap().port, 3128);
    }

    #[test]
    fn batch_file_parses() {
        let yaml = "tasks:\n  - command: rt ping\n  - command: rt search repo/\n    version: 1.0.0\n    properties:\n      K: V\n";
        let batch: BatchFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(batch.tasks.len(), 2);
        assert_eq!(batch.tasks[1].properties.get("K").map(String::as_str), Some("V"));
    }
}
