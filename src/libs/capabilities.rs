// Decides which optional dfcli features can be used for a given installation and launcher.
//
// Today that is a single feature: passing a password on stdin (`--password-stdin`) instead
// of as a masked command-line argument. It needs a direct launcher, since wrapping launchers
// may drop stdin, and a dfcli release that understands the flag.

use crate::error::{ConfigurationError, Error, FormatError};
use crate::libs::utilities::process::{LauncherKind, ProcessLauncher};
use crate::libs::utilities::version;
use crate::schemas::execution::{CommandLine, ExecutionRequest};
use crate::{log_debug, log_info};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// First dfcli release that accepts `--password-stdin`.
pub const MIN_VERSION_PASSWORD_STDIN: &str = "2.31.3";

/// `true` when a password may be sent on stdin.
///
/// Only a [`LauncherKind::Direct`] launcher qualifies, and only for `installed_version`
/// at least [`MIN_VERSION_PASSWORD_STDIN`]. The version is not parsed for other launchers.
pub fn supports_secure_credential_input(
    installed_version: &str,
    launcher: LauncherKind,
) -> Result<bool, FormatError> {
    if launcher != LauncherKind::Direct {
        return Ok(false);
    }
    version::is_at_least(installed_version, MIN_VERSION_PASSWORD_STDIN)
}

/// The trailing whitespace-separated token of `--version` output.
///
/// `"dfcli version 2.31.3\n"` yields `"2.31.3"`.
pub fn parse_version_output(stdout: &str) -> Option<&str> {
    stdout.split_whitespace().last()
}

/// Runs `<executable> --version` and returns the reported version.
///
/// # Arguments
/// * `timeout`: the query is killed once it runs longer than this.
///
/// # Returns
/// * `ConfigurationError::VersionQuery` when the process cannot be run, exits non-zero,
///   times out, or prints nothing.
pub fn query_installed_version(
    launcher: &dyn ProcessLauncher,
    executable: &str,
    environment: &BTreeMap<String, String>,
    working_directory: &Path,
    timeout: Option<Duration>,
) -> Result<String, ConfigurationError> {
    let mut line = CommandLine::new(executable);
    line.add("--version");
    let mut request = ExecutionRequest::new(line, working_directory);
    request.environment = environment.clone();
    request.timeout = timeout;

    let output = launcher
        .launch(&request)
        .map_err(|e| ConfigurationError::VersionQuery(e.to_string()))?;
    if output.exit_code != Some(0) {
        return Err(ConfigurationError::VersionQuery(format!(
            "'{} --version' exited with {:?}: {}",
            executable,
            output.exit_code,
            output.stderr.trim()
        )));
    }
    let installed = parse_version_output(&output.stdout)
        .ok_or_else(|| ConfigurationError::VersionQuery("empty version output".to_string()))?;
    log_debug!("[Capabilities] Installed dfcli version is {}", installed.cyan());
    Ok(installed.to_string())
}

/// Full negotiation: skips the version query entirely for non-direct launchers.
pub fn negotiate_password_stdin(
    launcher: &dyn ProcessLauncher,
    executable: &str,
    environment: &BTreeMap<String, String>,
    working_directory: &Path,
    timeout: Option<Duration>,
) -> Result<bool, Error> {
    if launcher.kind() != LauncherKind::Direct {
        log_info!(
            "[Capabilities] {:?} launcher, passing the password as a masked argument",
            launcher.kind()
        );
        return Ok(false);
    }
    let installed =
        query_installed_version(launcher, executable, environment, working_directory, timeout)?;
    let supported = supports_secure_credential_input(&installed, launcher.kind())?;
    if !supported {
        log_info!(
            "[Capabilities] dfcli {} predates {}, passing the password as a masked argument",
            installed.yellow(),
            MIN_VERSION_PASSWORD_STDIN
        );
    }
    Ok(supported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionError;
    use crate::schemas::execution::ProcessOutput;

    struct StubLauncher {
        kind: LauncherKind,
        output: ProcessOutput,
        hangs: bool,
    }

    impl ProcessLauncher for StubLauncher {
        fn kind(&self) -> LauncherKind {
            self.kind
        }

        fn launch(&self, request: &ExecutionRequest) -> Result<ProcessOutput, ExecutionError> {
            assert_eq!(request.command_line.arguments().collect::<Vec<_>>(), vec!["--version"]);
            match request.timeout {
                Some(timeout) if self.hangs => Err(ExecutionError::TimedOut(timeout)),
                _ => Ok(self.output.clone()),
            }
        }
    }

    fn stub(kind: LauncherKind, code: i32, stdout: &str) -> StubLauncher {
        StubLauncher {
            kind,
            output: ProcessOutput {
                exit_code: Some(code),
                stdout: stdout.to_string(),
                stderr: "boom".to_string(),
            },
            hangs: false,
        }
    }

    #[test]
    fn plugin_launcher_never_supports_stdin() {
        assert!(!supports_secure_credential_input("99.0.0", LauncherKind::Plugin).unwrap());
        assert!(!supports_secure_credential_input("not-a-version", LauncherKind::Plugin).unwrap());
        assert!(!supports_secure_credential_input("99.0.0", LauncherKind::Container).unwrap());
    }

    #[test]
    fn direct_launcher_depends_on_version() {
        assert!(!supports_secure_credential_input("2.6.1", LauncherKind::Direct).unwrap());
        assert!(supports_secure_credential_input("2.31.3", LauncherKind::Direct).unwrap());
        assert!(supports_secure_credential_input("3.0", LauncherKind::Direct).unwrap());
    }

    #[test]
    fn version_is_the_trailing_token() {
        assert_eq!(parse_version_output("dfcli version 2.31.3\n"), Some("2.31.3"));
        assert_eq!(parse_version_output("   "), None);
    }

    #[test]
    fn non_zero_version_query_is_fatal() {
        let launcher = stub(LauncherKind::Direct, 1, "");
        let err =
            query_installed_version(&launcher, "dfcli", &BTreeMap::new(), Path::new("."), None)
                .unwrap_err();
        assert!(matches!(err, ConfigurationError::VersionQuery(_)));
    }

    #[test]
    fn hanging_version_query_is_killed_after_the_timeout() {
        let launcher = StubLauncher {
            hangs: true,
            ..stub(LauncherKind::Direct, 0, "dfcli version 2.40.0")
        };
        let err = query_installed_version(
            &launcher,
            "dfcli",
            &BTreeMap::new(),
            Path::new("."),
            Some(Duration::from_secs(5)),
        )
        .unwrap_err();
        match err {
            ConfigurationError::VersionQuery(message) => assert!(message.contains("timed out")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(negotiate_password_stdin(
            &launcher,
            "dfcli",
            &BTreeMap::new(),
            Path::new("."),
            Some(Duration::from_secs(5))
        )
        .is_err());
    }

    #[test]
    fn negotiation_queries_only_direct_launchers() {
        let direct = stub(LauncherKind::Direct, 0, "dfcli version 2.40.0");
        assert!(negotiate_password_stdin(&direct, "dfcli", &BTreeMap::new(), Path::new("."), None).unwrap());

        // A failing query would error if it ran.
        let plugin = stub(LauncherKind::Plugin, 1, "");
        assert!(!negotiate_password_stdin(&plugin, "dfcli", &BTreeMap::new(), Path::new("."), None).unwrap());
    }
}
