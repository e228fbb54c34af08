// This module makes sure a versioned dfcli binary is installed, executable and current
// before anything tries to run it.
//
// An installation directory holds the binary and a `sha256` marker with the fingerprint of
// the release it came from. The remote fingerprint is compared against that marker and the
// archive is only downloaded when they differ. Installing into a directory is a critical
// section guarded by a `DirLock`, and the marker is removed before and written after the
// binary, so an interrupted install is never mistaken for a good one.

use crate::error::{FormatError, ProvisionError, Result};
use crate::libs::utilities::assets::{self, ReleaseSource};
use crate::libs::utilities::binary;
use crate::libs::utilities::compression::extract_binary;
use crate::libs::utilities::locking::DirLock;
use crate::libs::utilities::platform::PlatformIdentifier;
use crate::libs::utilities::version::Version;
use crate::{log_debug, log_info, log_warn};
use colored::Colorize;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// Oldest dfcli release the orchestrator can drive.
pub const MIN_CLI_VERSION: &str = "2.6.1";

pub const ENV_BINARY_PATH: &str = "DFCLI_BINARY_PATH";
pub const ENV_DEPENDENCIES_DIR: &str = "DFCLI_CLI_DEPENDENCIES_DIR";
pub const ENV_USER_AGENT: &str = "DFCLI_CLI_USER_AGENT";
/// Sibling of the installation directory shared by every run for downloaded dependencies.
pub const DEPENDENCIES_DIR_NAME: &str = "dependencies";

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("version pattern is valid"))
}

/// Checks a requested version. Blank and `[RELEASE]` mean latest and are always accepted;
/// anything else must be `X.Y.Z` and at least [`MIN_CLI_VERSION`].
pub fn validate_cli_version(version: Option<&str>) -> std::result::Result<(), FormatError> {
    let Some(version) = version.map(str::trim).filter(|v| !assets::is_latest(Some(v))) else {
        return Ok(());
    };
    if !version_pattern().is_match(version) {
        return Err(FormatError::VersionPattern(version.to_string()));
    }
    if !Version::parse(version)?.is_at_least(&Version::parse(MIN_CLI_VERSION)?) {
        return Err(FormatError::VersionTooLow {
            requested: version.to_string(),
            minimum: MIN_CLI_VERSION.to_string(),
        });
    }
    Ok(())
}

/// What a provisioning call had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Verified earlier by this provisioner; nothing was checked.
    AlreadyVerified,
    /// The stored fingerprint matched the remote one.
    UpToDate,
    /// The archive was downloaded and the binary replaced.
    Downloaded,
}

/// A binary resolved to a location on disk.
#[derive(Debug, Clone)]
pub struct ProvisionedInstallation {
    pub name: String,
    pub home_directory: PathBuf,
    pub binary_path: PathBuf,
    /// Requested version; `None` means latest.
    pub version: Option<String>,
    pub fingerprint: Option<String>,
    pub outcome: ProvisionOutcome,
}

impl ProvisionedInstallation {
    /// Adds the installation's variables to `env`.
    ///
    /// `DFCLI_BINARY_PATH` is always set; the dependencies directory and user agent are
    /// only filled in when absent.
    pub fn build_env_vars(&self, env: &mut BTreeMap<String, String>) {
        env.insert(
            ENV_BINARY_PATH.to_string(),
            self.home_directory.display().to_string(),
        );
        if !env.contains_key(ENV_DEPENDENCIES_DIR) {
            if let Some(parent) = self.home_directory.parent() {
                env.insert(
                    ENV_DEPENDENCIES_DIR.to_string(),
                    parent.join(DEPENDENCIES_DIR_NAME).display().to_string(),
                );
            }
        }
        env.entry(ENV_USER_AGENT.to_string()).or_insert_with(|| {
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        });
    }
}

/// Installs release binaries for one platform.
///
/// One provisioner is one execution context: directories it has verified are remembered
/// and return immediately on later calls.
pub struct BinaryProvisioner {
    source: Arc<dyn ReleaseSource>,
    release_base_url: String,
    platform: PlatformIdentifier,
    verified: Mutex<HashSet<PathBuf>>,
}

impl BinaryProvisioner {
    pub fn new(
        source: Arc<dyn ReleaseSource>,
        release_base_url: impl Into<String>,
        platform: PlatformIdentifier,
    ) -> Self {
        BinaryProvisioner {
            source,
            release_base_url: release_base_url.into(),
            platform,
            verified: Mutex::new(HashSet::new()),
        }
    }

    pub fn platform(&self) -> &PlatformIdentifier {
        &self.platform
    }

    /// Ensures `name` at `version` is installed in `install_dir`.
    ///
    /// # Arguments
    /// * `name`: tool name without extension (`dfcli`).
    /// * `version`: requested version; `None`, blank or `[RELEASE]` mean latest.
    /// * `install_dir`: directory that holds the binary and its marker.
    ///
    /// # Returns
    /// * `Ok(ProvisionedInstallation)` describing the installed binary.
    /// * `Error::Format` for an invalid version, `Error::Provision` for download, extraction
    ///   or permission failures. On failure the marker is absent.
    pub fn provision(
        &self,
        name: &str,
        version: Option<&str>,
        install_dir: &Path,
    ) -> Result<ProvisionedInstallation> {
        validate_cli_version(version)?;
        let version = version
            .map(str::trim)
            .filter(|v| !assets::is_latest(Some(v)))
            .map(str::to_string);
        let binary_name = self.platform.binary_name(name);
        let binary_path = install_dir.join(&binary_name);
        let installation = |fingerprint, outcome| ProvisionedInstallation {
            name: name.to_string(),
            home_directory: install_dir.to_path_buf(),
            binary_path: binary_path.clone(),
            version: version.clone(),
            fingerprint,
            outcome,
        };

        if self.is_verified(install_dir) && binary::is_installed(install_dir, &binary_name) {
            log_debug!(
                "[Provisioner] {} already verified in {}",
                binary_name,
                install_dir.display()
            );
            return Ok(installation(
                binary::read_marker(install_dir)?,
                ProvisionOutcome::AlreadyVerified,
            ));
        }

        let _lock = DirLock::acquire(install_dir).map_err(|e| {
            ProvisionError::io(format!("failed to lock {}", install_dir.display()), e)
        })?;

        let asset_name = self.platform.archive_name(name);
        let url = assets::release_url(&self.release_base_url, version.as_deref(), &asset_name);
        let remote = self.source.fetch_checksum(&url)?;
        let local = binary::read_marker(install_dir)?;

        if let Some(remote) = remote.as_deref() {
            if local.as_deref() == Some(remote) && binary_path.is_file() {
                log_info!(
                    "[Provisioner] {} in {} is up to date",
                    binary_name.green(),
                    install_dir.display()
                );
                self.mark_verified(install_dir);
                return Ok(installation(local, ProvisionOutcome::UpToDate));
            }
        }

        match version.as_deref() {
            Some(v) => log_info!(
                "[Provisioner] Downloading '{}' version {} from {}",
                name.bold(),
                v.cyan(),
                url.blue()
            ),
            None => log_info!(
                "[Provisioner] Downloading '{}' latest version from {}",
                name.bold(),
                url.blue()
            ),
        }
        let fingerprint =
            self.download_and_install(&url, &asset_name, &binary_name, install_dir, remote)?;
        self.mark_verified(install_dir);
        Ok(installation(Some(fingerprint), ProvisionOutcome::Downloaded))
    }

    /// Downloads, verifies and installs the archive. Returns the fingerprint written to
    /// the marker. Must be called with the directory lock held.
    fn download_and_install(
        &self,
        url: &str,
        asset_name: &str,
        binary_name: &str,
        install_dir: &Path,
        remote: Option<String>,
    ) -> std::result::Result<String, ProvisionError> {
        binary::remove_marker(install_dir)?;

        let staging = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(install_dir)
            .map_err(|e| ProvisionError::io("failed to create download directory", e))?;
        let archive = staging.path().join(asset_name);
        self.source.download(url, &archive)?;

        let digest = assets::file_sha256(&archive)
            .map_err(|e| ProvisionError::io(format!("failed to hash {}", archive.display()), e))?;
        if let Some(expected) = remote.as_deref().filter(|r| assets::is_sha256_hex(r)) {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(ProvisionError::ChecksumMismatch {
                    url: url.to_string(),
                    expected: expected.to_string(),
                    actual: digest,
                });
            }
        }

        let installed = extract_binary(
            &archive,
            self.platform.archive_kind(),
            binary_name,
            install_dir,
        )?;
        if !self.platform.is_windows() {
            binary::make_executable(&installed)?;
        }

        let fingerprint = match remote {
            Some(remote) => remote,
            None => {
                log_warn!("[Provisioner] No remote fingerprint, storing the local SHA-256");
                digest
            }
        };
        binary::write_marker(install_dir, &fingerprint)?;
        if let Err(e) = staging.close() {
            log_debug!("[Provisioner] Could not remove download directory: {}", e);
        }
        log_info!(
            "[Provisioner] Installed {}",
            installed.display().to_string().green()
        );
        Ok(fingerprint)
    }

    fn is_verified(&self, install_dir: &Path) -> bool {
        self.verified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(install_dir)
    }

    fn mark_verified(&self, install_dir: &Path) {
        self.verified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(install_dir.to_path_buf());
    }
}
