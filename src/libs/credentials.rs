// Credential lookup collaborator.
//
// A server profile either carries inline credentials or names a `credentials_id` that the
// host resolves. The host side is the `CredentialLookup` trait; `EnvCredentialLookup` reads
// `DFCLI_CREDENTIALS_<ID>_{USERNAME,PASSWORD,ACCESS_TOKEN}` from an environment map.

use crate::error::ConfigurationError;
use crate::log_debug;
use crate::schemas::servers::{CredentialKind, Credentials, Secret, ServerProfile};
use std::collections::BTreeMap;

pub trait CredentialLookup: Send + Sync {
    /// Returns the credentials stored under `id`, or `None` if nothing is stored.
    fn lookup(&self, id: &str) -> Option<Credentials>;
}

/// Resolves credential ids from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialLookup {
    vars: BTreeMap<String, String>,
}

impl EnvCredentialLookup {
    /// Snapshot of the current process environment.
    pub fn from_process_env() -> Self {
        EnvCredentialLookup {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        EnvCredentialLookup { vars }
    }

    /// `DFCLI_CREDENTIALS_<ID>_<FIELD>` with the id upper-cased and non-alphanumerics
    /// replaced by `_`.
    pub fn variable_name(id: &str, field: &str) -> String {
        let id: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("DFCLI_CREDENTIALS_{}_{}", id, field)
    }

    fn secret(&self, id: &str, field: &str) -> Secret {
        self.vars
            .get(&Self::variable_name(id, field))
            .map(|v| Secret::new(v.as_str()))
            .unwrap_or_default()
    }
}

impl CredentialLookup for EnvCredentialLookup {
    fn lookup(&self, id: &str) -> Option<Credentials> {
        let credentials = Credentials {
            username: self.secret(id, "USERNAME"),
            password: self.secret(id, "PASSWORD"),
            access_token: self.secret(id, "ACCESS_TOKEN"),
        };
        match credentials.kind() {
            CredentialKind::None => None,
            _ => Some(credentials),
        }
    }
}

/// The credentials to use for `server`: inline ones if present, otherwise the ones
/// referenced by `credentials_id`.
pub fn resolve_credentials(
    server: &ServerProfile,
    lookup: &dyn CredentialLookup,
) -> Result<Credentials, ConfigurationError> {
    if server.credentials.kind() != CredentialKind::None {
        return Ok(server.credentials.clone());
    }
    match server.credentials_id.as_deref().filter(|id| !id.trim().is_empty()) {
        None => Ok(Credentials::default()),
        Some(id) => {
            log_debug!("[Credentials] Resolving '{}' for server '{}'", id, server.id);
            lookup.lookup(id).ok_or_else(|| {
                ConfigurationError::InvalidServer(format!(
                    "credentials '{}' of server '{}' could not be found",
                    id, server.id
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> EnvCredentialLookup {
        EnvCredentialLookup::from_map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn variable_names_are_sanitized() {
        assert_eq!(
            EnvCredentialLookup::variable_name("prod-eu.1", "PASSWORD"),
            "DFCLI_CREDENTIALS_PROD_EU_1_PASSWORD"
        );
    }

    #[test]
    fn env_lookup_reads_token() {
        let env = lookup(&[("DFCLI_CREDENTIALS_PROD_ACCESS_TOKEN", "tok")]);
        let creds = env.lookup("prod").unwrap();
        assert_eq!(creds.kind(), CredentialKind::AccessToken);
        assert_eq!(creds.access_token.expose(), "tok");
        assert!(env.lookup("other").is_none());
    }

    #[test]
    fn inline_credentials_win_over_reference() {
        let mut server =
            ServerProfile::new("prod", "https://df", Credentials::with_password("u", "p"));
        server.credentials_id = Some("prod".into());
        let env = lookup(&[("DFCLI_CREDENTIALS_PROD_ACCESS_TOKEN", "tok")]);
        let creds = resolve_credentials(&server, &env).unwrap();
        assert_eq!(creds.kind(), CredentialKind::UsernamePassword);
    }

    #[test]
    fn unknown_reference_is_a_configuration_error() {
        let mut server = ServerProfile::new("prod", "https://df", Credentials::default());
        server.credentials_id = Some("missing".into());
        let err = resolve_credentials(&server, &lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidServer(_)));
        assert!(resolve_credentials(
            &ServerProfile::new("anon", "https://df", Credentials::default()),
            &lookup(&[])
        )
        .is_ok());
    }
}
