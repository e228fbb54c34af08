//! # Server, credential and proxy schemas
//!
//! These types describe the platform servers dfcli gets configured against, the credentials
//! used for them and the proxy the build host sits behind. They are owned by the configuration
//! layer and are read-only to the rest of the orchestrator.
//!
//! Every secret value is held in a [`Secret`], whose `Debug` and `Display` implementations
//! print a fixed mask so that credentials can never end up in logs or error messages by accident.

use serde::Deserialize;
use std::fmt;

/// Mask printed in place of any secret value.
pub const MASK: &str = "******";

const DISTROFACE_SUFFIX: &str = "/distroface";
const DISTRIBUTION_SUFFIX: &str = "/distribution";
const XRAY_SUFFIX: &str = "/xray";

/// An opaque secret string. Only [`Secret::expose`] reveals the value.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// Returns the clear-text value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", MASK)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

/// Credentials for one server. At most one of `password` / `access_token` is meaningful;
/// an access token wins when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Secret,
    #[serde(default)]
    pub password: Secret,
    #[serde(default)]
    pub access_token: Secret,
}

/// Which authentication flavour a [`Credentials`] value carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    AccessToken,
    UsernamePassword,
    None,
}

impl Credentials {
    pub fn with_token(token: impl Into<String>) -> Self {
        Credentials {
            access_token: Secret::new(token),
            ..Default::default()
        }
    }

    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: Secret::new(username),
            password: Secret::new(password),
            ..Default::default()
        }
    }

    pub fn kind(&self) -> CredentialKind {
        if !self.access_token.is_blank() {
            CredentialKind::AccessToken
        } else if !self.username.is_blank() {
            CredentialKind::UsernamePassword
        } else {
            CredentialKind::None
        }
    }
}

/// A configured platform server.
///
/// The sub-service URLs are optional; when absent they are inferred from the base `url`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerProfile {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub distroface_url: Option<String>,
    #[serde(default)]
    pub distribution_url: Option<String>,
    #[serde(default)]
    pub xray_url: Option<String>,
    #[serde(default)]
    pub credentials: Credentials,
    /// Reference resolved through a [`crate::libs::credentials::CredentialLookup`].
    #[serde(default)]
    pub credentials_id: Option<String>,
}

impl ServerProfile {
    pub fn new(id: impl Into<String>, url: impl Into<String>, credentials: Credentials) -> Self {
        ServerProfile {
            id: id.into(),
            url: url.into(),
            distroface_url: None,
            distribution_url: None,
            xray_url: None,
            credentials,
            credentials_id: None,
        }
    }

    /// Trims the id and strips trailing slashes from every configured URL.
    pub fn normalized(mut self) -> Self {
        self.id = self.id.trim().to_string();
        self.url = trim_trailing_slash(&self.url);
        for url in [
            &mut self.distroface_url,
            &mut self.distribution_url,
            &mut self.xray_url,
        ] {
            *url = url.as_deref().map(trim_trailing_slash);
        }
        self
    }

    pub fn infer_distroface_url(&self) -> String {
        infer(&self.distroface_url, &self.url, DISTROFACE_SUFFIX)
    }

    pub fn infer_distribution_url(&self) -> String {
        infer(&self.distribution_url, &self.url, DISTRIBUTION_SUFFIX)
    }

    pub fn infer_xray_url(&self) -> String {
        infer(&self.xray_url, &self.url, XRAY_SUFFIX)
    }

    /// All URLs as configured (blank entries included), used for validation.
    pub fn configured_urls(&self) -> Vec<&str> {
        let mut urls = vec![self.url.as_str()];
        for url in [&self.distroface_url, &self.distribution_url, &self.xray_url] {
            urls.push(url.as_deref().unwrap_or(""));
        }
        urls
    }
}

fn trim_trailing_slash(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn infer(explicit: &Option<String>, base: &str, suffix: &str) -> String {
    match explicit {
        Some(url) if !url.trim().is_empty() => url.clone(),
        _ => format!("{}{}", trim_trailing_slash(base), suffix),
    }
}

/// HTTP proxy the build host is configured with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxySettings {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// Username and password, only when both are non-blank.
    pub fn credentials(&self) -> Option<(&str, &Secret)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) if !user.trim().is_empty() && !password.is_blank() => {
                Some((user.as_str(), password))
            }
            _ => None,
        }
    }

    /// `https` for port 443, `http` otherwise.
    pub fn scheme(&self) -> &'static str {
        if self.port == 443 { "https" } else { "http" }
    }

    /// `<scheme>://[user:password@]host:port`. Wrapped in a [`Secret`] since it may embed
    /// the proxy password.
    pub fn to_url(&self) -> Secret {
        let host = self.host.trim();
        match self.credentials() {
            Some((user, password)) => Secret::new(format!(
                "{}://{}:{}@{}:{}",
                self.scheme(),
                user,
                password.expose(),
                host,
                self.port
            )),
            None => Secret::new(format!("{}://{}:{}", self.scheme(), host, self.port)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_never_prints_its_value() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{}", secret), MASK);
        assert!(!format!("{:?}", secret).contains("hunter2"));
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn access_token_takes_precedence() {
        let mut creds = Credentials::with_password("admin", "pw");
        assert_eq!(creds.kind(), CredentialKind::UsernamePassword);
        creds.access_token = Secret::new("tok");
        assert_eq!(creds.kind(), CredentialKind::AccessToken);
        assert_eq!(Credentials::default().kind(), CredentialKind::None);
    }

    #[test]
    fn sub_urls_are_inferred_from_base() {
        let server =
            ServerProfile::new("prod", "https://df.example.com/", Credentials::default()).normalized();
        assert_eq!(server.url, "https://df.example.com");
        assert_eq!(
            server.infer_distroface_url(),
            "https://df.example.com/distroface"
        );
        assert_eq!(
            server.infer_distribution_url(),
            "https://df.example.com/distribution"
        );
        assert_eq!(server.infer_xray_url(), "https://df.example.com/xray");
    }

    #[test]
    fn explicit_sub_url_wins() {
        let mut server = ServerProfile::new("prod", "https://df.example.com", Credentials::default());
        server.xray_url = Some("https://xray.example.com/".to_string());
        let server = server.normalized();
        assert_eq!(server.infer_xray_url(), "https://xray.example.com");
    }

    #[test]
    fn proxy_credentials_require_both_parts() {
        let mut proxy = ProxySettings {
            host: "proxy.local".into(),
            port: 8080,
            username: Some("bob".into()),
            ..Default::default()
        };
        assert!(proxy.credentials().is_none());
        assert_eq!(proxy.to_url().expose(), "http://proxy.local:8080");
        proxy.password = Some(Secret::new("pw"));
        assert!(proxy.credentials().is_some());
        assert_eq!(proxy.to_url().expose(), "http://bob:pw@proxy.local:8080");
    }

    #[test]
    fn proxy_on_port_443_uses_https() {
        let proxy = ProxySettings {
            host: "proxy.local".into(),
            port: 443,
            ..Default::default()
        };
        assert_eq!(proxy.to_url().expose(), "https://proxy.local:443");
    }
}
