// Directory-scoped exclusive lock.
//
// Provisioning and bootstrapping both mutate a directory whose state is described by a
// marker file. Two writers racing on the marker check could leave a binary that does not
// match its fingerprint, so every writer holds a `DirLock` on the directory first. The lock
// is an OS file lock on `<dir>/.lock`, which serializes threads and processes alike, and
// is released when the guard is dropped.

use crate::log_debug;
use colored::Colorize;
use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = ".lock";

/// Guard for an exclusively locked directory.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Creates `dir` if needed and blocks until its lock is acquired.
    pub fn acquire(dir: &Path) -> io::Result<DirLock> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        log_debug!(
            "[Lock] Waiting for {}",
            path.display().to_string().yellow()
        );
        file.lock_exclusive()?;
        log_debug!("[Lock] Acquired {}", path.display().to_string().green());
        Ok(DirLock { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log_debug!("[Lock] Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
