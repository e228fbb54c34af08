// Our custom logging macros to give us nicely formatted (and colored!) output
// for debugging, general information, and errors.
use crate::{log_debug, log_warn};
// The 'colored' crate helps us make our console output look pretty and readable.
use colored::Colorize;
use std::fmt;

/// Operating systems dfcli is released for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archive formats release assets are published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::TarGz => ".tar.gz",
            ArchiveKind::Zip => ".zip",
        }
    }
}

/// The canonical platform a binary is provisioned for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIdentifier {
    pub os: Os,
    /// Canonical architecture (`amd64`, `arm64`, or the lowercased raw value).
    pub arch: String,
}

impl PlatformIdentifier {
    /// `linux-amd64`, `darwin-arm64`, ...
    pub fn platform(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    pub fn archive_kind(&self) -> ArchiveKind {
        match self.os {
            Os::Windows => ArchiveKind::Zip,
            _ => ArchiveKind::TarGz,
        }
    }

    pub fn archive_extension(&self) -> &'static str {
        self.archive_kind().extension()
    }

    /// `dfcli.exe` on Windows, `dfcli` elsewhere.
    pub fn binary_name(&self, name: &str) -> String {
        binary_file_name(name, self.os == Os::Windows)
    }

    /// Release asset name, e.g. `dfcli-linux-amd64.tar.gz`.
    pub fn archive_name(&self, name: &str) -> String {
        format!("{}-{}{}", name, self.platform(), self.archive_extension())
    }

    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }
}

/// Maps raw OS and architecture names to a [`PlatformIdentifier`].
///
/// The OS is classified by substring: anything containing "windows" is Windows, anything
/// containing "mac" or "darwin" is Darwin, everything else is Linux. Pure function.
pub fn resolve(raw_os: &str, raw_arch: &str) -> PlatformIdentifier {
    let os_lower = raw_os.to_lowercase();
    let os = if os_lower.contains("windows") {
        Os::Windows
    } else if os_lower.contains("mac") || os_lower.contains("darwin") {
        Os::Darwin
    } else {
        Os::Linux
    };
    let platform = PlatformIdentifier {
        os,
        arch: normalize_arch(raw_arch),
    };
    log_debug!(
        "[Platform] Resolved '{}'/'{}' to {}",
        raw_os,
        raw_arch,
        platform.platform().cyan()
    );
    platform
}

/// Resolves the platform this process was compiled for.
pub fn detect() -> PlatformIdentifier {
    resolve(std::env::consts::OS, std::env::consts::ARCH)
}

/// Normalizes architecture aliases into the names used by release assets.
pub fn normalize_arch(arch: &str) -> String {
    match arch.trim().to_lowercase().as_str() {
        "x86_64" | "amd64" => "amd64".to_string(),
        "aarch64" | "arm64" => "arm64".to_string(),
        other => {
            log_warn!(
                "[Platform] Unknown ARCH variant '{}', using as-is. The release asset may not exist.",
                other.purple()
            );
            other.to_string()
        }
    }
}

/// Executable file name for `name`, with `.exe` on Windows.
pub fn binary_file_name(name: &str, windows: bool) -> String {
    if windows {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn architecture_aliases_are_normalized() {
        assert_eq!(resolve("Linux", "x86_64").arch, "amd64");
        assert_eq!(resolve("Linux", "aarch64").arch, "arm64");
        assert_eq!(resolve("Linux", "riscv64").arch, "riscv64");
    }

    #[test]
    fn os_is_classified_by_substring() {
        assert_eq!(resolve("Windows 11", "amd64").os, Os::Windows);
        assert_eq!(resolve("Mac OS X", "arm64").os, Os::Darwin);
        assert_eq!(resolve("macos", "arm64").os, Os::Darwin);
        assert_eq!(resolve("FreeBSD", "amd64").os, Os::Linux);
    }

    #[test]
    fn windows_uses_zip_and_exe() {
        let platform = resolve("windows", "x86_64");
        assert_eq!(platform.archive_extension(), ".zip");
        assert_eq!(platform.binary_name("dfcli"), "dfcli.exe");
        assert_eq!(platform.archive_name("dfcli"), "dfcli-windows-amd64.zip");
    }

    #[test]
    fn unix_uses_tar_gz_and_bare_name() {
        let platform = resolve("Mac OS X", "aarch64");
        assert_eq!(platform.archive_kind(), ArchiveKind::TarGz);
        assert_eq!(platform.binary_name("dfcli"), "dfcli");
        assert_eq!(platform.archive_name("dfcli"), "dfcli-darwin-arm64.tar.gz");
    }
}
