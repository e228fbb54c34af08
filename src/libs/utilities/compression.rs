// This module extracts the single executable we care about out of a release archive.
// Release archives may nest the binary under arbitrary directories; only the entry
// whose file name equals the expected binary name is written out, everything else
// in the archive is ignored.

use crate::error::ProvisionError;
use crate::libs::utilities::platform::ArchiveKind;
use crate::{log_debug, log_error};
use colored::Colorize;
use flate2::read::GzDecoder;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::NamedTempFile;
use zip::ZipArchive;

/// Extracts the entry named `binary_name` from `archive` into `dest_dir/binary_name`.
///
/// The entry is first written to a temporary file inside `dest_dir` and then renamed into
/// place, so a failed extraction never leaves a truncated binary behind.
///
/// # Returns
/// * `Ok(PathBuf)` with the path of the extracted binary.
/// * `ProvisionError::BinaryMissing` if no entry matches.
/// * `ProvisionError::Io` on read/decompression/write failures.
pub fn extract_binary(
    archive: &Path,
    kind: ArchiveKind,
    binary_name: &str,
    dest_dir: &Path,
) -> Result<PathBuf, ProvisionError> {
    log_debug!(
        "[Archive] Looking for '{}' in {}",
        binary_name.cyan(),
        archive.display().to_string().blue()
    );

    let mut staged = NamedTempFile::new_in(dest_dir).map_err(|e| {
        ProvisionError::io(
            format!("failed to create staging file in {}", dest_dir.display()),
            e,
        )
    })?;

    let found = match kind {
        ArchiveKind::TarGz => copy_tar_gz_entry(archive, binary_name, staged.as_file_mut()),
        ArchiveKind::Zip => copy_zip_entry(archive, binary_name, staged.as_file_mut()),
    }
    .map_err(|e| ProvisionError::io(format!("failed to extract {}", archive.display()), e))?;

    if !found {
        log_error!(
            "[Archive] '{}' not found in {}",
            binary_name.red(),
            archive.display()
        );
        return Err(ProvisionError::BinaryMissing {
            binary: binary_name.to_string(),
            archive: archive.to_path_buf(),
        });
    }

    staged
        .as_file_mut()
        .flush()
        .map_err(|e| ProvisionError::io("failed to flush extracted binary", e))?;
    let target = dest_dir.join(binary_name);
    staged
        .persist(&target)
        .map_err(|e| ProvisionError::io(format!("failed to write {}", target.display()), e.error))?;

    log_debug!(
        "[Archive] Extracted binary to {}",
        target.display().to_string().green()
    );
    Ok(target)
}

/// Copies the first regular tar entry whose file name is `binary_name` into `out`.
fn copy_tar_gz_entry(archive: &Path, binary_name: &str, out: &mut File) -> io::Result<bool> {
    let mut tar = Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in tar.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let matches = entry
            .path()?
            .file_name()
            .is_some_and(|name| name == OsStr::new(binary_name));
        if matches {
            io::copy(&mut entry, out)?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Copies the first zip entry whose base name is `binary_name` into `out`.
fn copy_zip_entry(archive: &Path, binary_name: &str, out: &mut File) -> io::Result<bool> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let matches = entry
            .name()
            .rsplit(['/', '\\'])
            .next()
            .is_some_and(|base| base == binary_name);
        if matches {
            io::copy(&mut entry, out)?;
            return Ok(true);
        }
    }
    Ok(false)
}
