// Loads the orchestrator configuration and validates the configured servers.
use crate::error::ConfigurationError;
use crate::schemas::config::{BatchFile, OrchestratorConfig};
use crate::schemas::servers::ServerProfile;
use crate::{log_debug, log_info, log_warn};
use colored::Colorize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

const KNOWN_PROTOCOLS: [&str; 3] = ["http://", "https://", "ssh://"];

/// Reads and validates the YAML configuration at `path`.
///
/// A missing file is not an error: the defaults are used and a warning is logged.
/// Server URLs are normalized (trailing `/` stripped) and validated.
///
/// # Returns
/// * `ConfigurationError::Read` / `Parse` when the file exists but cannot be used.
/// * `ConfigurationError::InvalidServer` when a server profile is rejected.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig, ConfigurationError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log_warn!(
                "[Config] {} not found, using defaults.",
                path.display().to_string().yellow()
            );
            return Ok(OrchestratorConfig::default());
        }
        Err(source) => {
            return Err(ConfigurationError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut config = if content.trim().is_empty() {
        OrchestratorConfig::default()
    } else {
        serde_yaml::from_str::<OrchestratorConfig>(&content).map_err(|source| {
            ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?
    };

    config.servers = validate_servers(
        std::mem::take(&mut config.servers),
        config.allow_http_connections,
    )?;
    log_info!(
        "[Config] Loaded {} with {} server(s)",
        path.display().to_string().cyan(),
        config.servers.len()
    );
    Ok(config)
}

/// Reads a batch task file.
pub fn load_batch_file(path: &Path) -> Result<BatchFile, ConfigurationError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigurationError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Checks ids and URLs of every profile and returns the normalized profiles.
///
/// * ids must be non-blank and unique
/// * `url` must be non-blank
/// * every non-blank URL must use a known protocol, and `http://` only when allowed
pub fn validate_servers(
    servers: Vec<ServerProfile>,
    allow_http: bool,
) -> Result<Vec<ServerProfile>, ConfigurationError> {
    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(servers.len());
    for server in servers {
        let server = server.normalized();
        let id = server.id.as_str();
        if id.is_empty() {
            return Err(ConfigurationError::InvalidServer(
                "please set the server ID".to_string(),
            ));
        }
        if !seen.insert(id.to_string()) {
            return Err(ConfigurationError::InvalidServer(format!(
                "server ID '{}' is already configured",
                id
            )));
        }
        if server.url.is_empty() {
            return Err(ConfigurationError::InvalidServer(format!(
                "please set the platform URL of server '{}'",
                id
            )));
        }
        for url in server.configured_urls().into_iter().filter(|u| !u.is_empty()) {
            check_url(id, url, allow_http)?;
        }
        log_debug!("[Config] Server '{}' at {} is valid", id, server.url.green());
        validated.push(server);
    }
    Ok(validated)
}

fn check_url(id: &str, url: &str, allow_http: bool) -> Result<(), ConfigurationError> {
    if !KNOWN_PROTOCOLS.iter().any(|p| url.starts_with(p)) {
        return Err(ConfigurationError::InvalidServer(format!(
            "URL '{}' of server '{}' must start with one of the following protocols: {:?}",
            url, id, KNOWN_PROTOCOLS
        )));
    }
    if !allow_http && url.starts_with("http://") {
        return Err(ConfigurationError::InvalidServer(format!(
            "HTTP (non HTTPS) connections to server '{}' are not allowed. To bypass this rule, set 'allow_http_connections: true'",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::servers::Credentials;

    fn server(id: &str, url: &str) -> ServerProfile {
        ServerProfile::new(id, url, Credentials::default())
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.cli.name, "dfcli");
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "servers: [ {id: ").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigurationError::Parse { .. })
        ));
    }

    #[test]
    fn loaded_servers_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "servers:\n  - id: prod\n    url: https://df.example.com///\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.servers[0].url, "https://df.example.com");
    }

    #[test]
    fn duplicate_and_blank_ids_are_rejected() {
        let dup = vec![server("a", "https://x"), server("a", "https://y")];
        assert!(validate_servers(dup, false).is_err());
        assert!(validate_servers(vec![server(" ", "https://x")], false).is_err());
    }

    #[test]
    fn validated_ids_are_stored_trimmed() {
        let validated = validate_servers(vec![server("  prod ", "https://df.example.com")], false)
            .unwrap();
        assert_eq!(validated[0].id, "prod");

        let padded_duplicate = vec![server("prod", "https://x"), server(" prod", "https://y")];
        assert!(validate_servers(padded_duplicate, false).is_err());
    }

    #[test]
    fn http_requires_opt_in() {
        let servers = vec![server("a", "http://df.local")];
        assert!(validate_servers(servers.clone(), false).is_err());
        assert!(validate_servers(servers, true).is_ok());
    }

    #[test]
    fn unknown_protocol_and_blank_url_are_rejected() {
        assert!(validate_servers(vec![server("a", "ftp://df.local")], true).is_err());
        assert!(validate_servers(vec![server("a", "")], true).is_err());
        let mut with_sub = server("a", "https://df.local");
        with_sub.xray_url = Some("xray.local".into());
        assert!(validate_servers(vec![with_sub], true).is_err());
    }

    #[test]
    fn batch_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_batch_file(&dir.path().join("tasks.yaml")),
            Err(ConfigurationError::Read { .. })
        ));
    }
}
