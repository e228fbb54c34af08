// File-system helpers for an installed binary and the fingerprint marker that sits next to it.
//
// The marker is a plain-text file holding the last installed content fingerprint. It is the
// only thing that says "this directory holds a good install", so it is removed before a
// download starts and written (atomically) only after the binary is fully in place.

use crate::error::ProvisionError;
use crate::log_debug;
use colored::Colorize;
use std::fs;
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Name of the fingerprint marker file inside an installation directory.
pub const MARKER_FILE_NAME: &str = "sha256";

pub fn marker_path(install_dir: &Path) -> PathBuf {
    install_dir.join(MARKER_FILE_NAME)
}

/// `true` when both the binary and the marker exist in `install_dir`.
pub fn is_installed(install_dir: &Path, binary_name: &str) -> bool {
    install_dir.join(binary_name).is_file() && marker_path(install_dir).is_file()
}

/// Reads the stored fingerprint. A missing marker is `Ok(None)`.
pub fn read_marker(install_dir: &Path) -> Result<Option<String>, ProvisionError> {
    let path = marker_path(install_dir);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ProvisionError::io(
            format!("failed to read marker {}", path.display()),
            e,
        )),
    }
}

/// Writes `fingerprint` to the marker through a temporary file and a rename, so readers
/// see either the old marker, no marker, or the complete new one.
pub fn write_marker(install_dir: &Path, fingerprint: &str) -> Result<(), ProvisionError> {
    let path = marker_path(install_dir);
    let mut staged = NamedTempFile::new_in(install_dir)
        .map_err(|e| ProvisionError::io("failed to stage marker file", e))?;
    staged
        .write_all(fingerprint.as_bytes())
        .map_err(|e| ProvisionError::io("failed to write marker file", e))?;
    staged
        .persist(&path)
        .map_err(|e| ProvisionError::io(format!("failed to write {}", path.display()), e.error))?;
    log_debug!(
        "[Binary] Stored fingerprint in {}",
        path.display().to_string().green()
    );
    Ok(())
}

/// Removes the marker if present.
pub fn remove_marker(install_dir: &Path) -> Result<(), ProvisionError> {
    let path = marker_path(install_dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProvisionError::io(
            format!("failed to remove marker {}", path.display()),
            e,
        )),
    }
}

/// Makes a file executable (`chmod 0755`). A no-op on non-Unix targets.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), ProvisionError> {
    log_debug!(
        "[Binary] Making {} executable",
        path.display().to_string().yellow()
    );
    let permission_error = |source| ProvisionError::Permission {
        path: path.to_path_buf(),
        source,
    };
    let mut perms = fs::metadata(path).map_err(permission_error)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).map_err(permission_error)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}
