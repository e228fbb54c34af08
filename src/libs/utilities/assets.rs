// Remote release access: where a release archive lives, what its published fingerprint is,
// and how its bytes get onto disk.
//
// The provisioner only talks to the `ReleaseSource` trait so that tests (and hosts with
// their own artifact mirrors) can swap the HTTP implementation out.

use crate::error::ProvisionError;
use crate::schemas::servers::ProxySettings;
use crate::{log_debug, log_error, log_warn};
use colored::Colorize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

/// Version placeholder meaning "latest release".
pub const LATEST_VERSION: &str = "[RELEASE]";

/// Access to published release archives.
pub trait ReleaseSource: Send + Sync {
    /// Returns the fingerprint the server publishes for `url`, or `None` when it exposes none.
    fn fetch_checksum(&self, url: &str) -> Result<Option<String>, ProvisionError>;

    /// Downloads `url` into the file at `dest`, overwriting it.
    fn download(&self, url: &str, dest: &Path) -> Result<(), ProvisionError>;
}

/// `true` for an absent, blank or `[RELEASE]` version.
pub fn is_latest(version: Option<&str>) -> bool {
    match version.map(str::trim) {
        None | Some("") => true,
        Some(v) => v == LATEST_VERSION,
    }
}

/// Builds the download URL for `asset_name`.
///
/// * latest: `<base>/latest/download/<asset>`
/// * pinned: `<base>/download/v<version>/<asset>`
pub fn release_url(base_url: &str, version: Option<&str>, asset_name: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    match version.map(str::trim) {
        Some(v) if !is_latest(Some(v)) => {
            format!("{}/download/v{}/{}", base, v.trim_start_matches('v'), asset_name)
        }
        _ => format!("{}/latest/download/{}", base, asset_name),
    }
}

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// `true` when `value` looks like a hex SHA-256 digest.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Release source backed by `ureq`.
pub struct HttpReleaseSource {
    agent: ureq::Agent,
    checksum_header: String,
}

impl HttpReleaseSource {
    /// # Arguments
    /// * `checksum_header`: response header carrying the published fingerprint.
    /// * `proxy`: optional proxy every request is routed through.
    pub fn new(
        checksum_header: impl Into<String>,
        proxy: Option<&ProxySettings>,
    ) -> Result<Self, ProvisionError> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .user_agent(&format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ));
        if let Some(proxy) = proxy.filter(|p| p.is_configured()) {
            let proxy_url = proxy.to_url();
            let ureq_proxy =
                ureq::Proxy::new(proxy_url.expose()).map_err(|e| ProvisionError::Network {
                    url: format!("{}://{}:{}", proxy.scheme(), proxy.host, proxy.port),
                    message: format!("invalid proxy: {}", e.kind()),
                })?;
            builder = builder.proxy(ureq_proxy);
        }
        Ok(HttpReleaseSource {
            agent: builder.build(),
            checksum_header: checksum_header.into(),
        })
    }
}

impl ReleaseSource for HttpReleaseSource {
    fn fetch_checksum(&self, url: &str) -> Result<Option<String>, ProvisionError> {
        log_debug!("[Assets] HEAD {}", url.blue());
        let response = self.agent.head(url).call().map_err(|e| map_ureq_error(url, e))?;
        let checksum = response
            .header(&self.checksum_header)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if checksum.is_none() {
            log_warn!(
                "[Assets] {} did not expose a '{}' header; the tool will always be downloaded.",
                url,
                self.checksum_header.yellow()
            );
        }
        Ok(checksum)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), ProvisionError> {
        log_debug!("[Assets] GET {}", url.blue());
        let response = self.agent.get(url).call().map_err(|e| map_ureq_error(url, e))?;
        let mut file = File::create(dest).map_err(|e| {
            ProvisionError::io(format!("failed to create {}", dest.display()), e)
        })?;
        io::copy(&mut response.into_reader(), &mut file).map_err(|e| ProvisionError::Network {
            url: url.to_string(),
            message: format!("download interrupted: {}", e),
        })?;
        log_debug!(
            "[Assets] Downloaded {} to {}",
            url,
            dest.display().to_string().green()
        );
        Ok(())
    }
}

fn map_ureq_error(url: &str, error: ureq::Error) -> ProvisionError {
    match error {
        ureq::Error::Status(status, _) => {
            log_error!("[Assets] {} answered with HTTP {}", url.red(), status);
            ProvisionError::HttpStatus {
                url: url.to_string(),
                status,
            }
        }
        ureq::Error::Transport(transport) => {
            log_error!("[Assets] Request to {} failed: {}", url.red(), transport);
            ProvisionError::Network {
                url: url.to_string(),
                message: transport.to_string(),
            }
        }
    }
}
