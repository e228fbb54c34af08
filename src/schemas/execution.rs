//! # Execution schemas
//!
//! Plain data passed between the command executor, the process launcher and the batch runner:
//! the command line (with masked arguments), the immutable request for one invocation, the raw
//! process output and the classified result.

use crate::schemas::servers::{MASK, Secret};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One argument of a command line. Masked arguments are rendered as [`MASK`].
#[derive(Clone, PartialEq, Eq)]
struct Arg {
    value: String,
    masked: bool,
}

/// An argument vector whose first entry is the program.
///
/// Displaying a `CommandLine` never reveals masked arguments, so it is safe to log.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    args: Vec<Arg>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        let mut line = CommandLine::default();
        line.add(program);
        line
    }

    pub fn add(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg {
            value: value.into(),
            masked: false,
        });
        self
    }

    /// Adds an argument that must never be displayed.
    pub fn add_masked(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg {
            value: value.into(),
            masked: true,
        });
        self
    }

    pub fn program(&self) -> &str {
        self.args.first().map(|a| a.value.as_str()).unwrap_or("")
    }

    /// Arguments after the program, in clear text, for handing to the OS.
    pub fn arguments(&self) -> impl Iterator<Item = &str> {
        self.args.iter().skip(1).map(|a| a.value.as_str())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<&str> = self
            .args
            .iter()
            .map(|a| if a.masked { MASK } else { a.value.as_str() })
            .collect();
        f.write_str(&rendered.join(" "))
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandLine({})", self)
    }
}

/// Everything needed to run one tool process. Immutable once built.
#[derive(Clone)]
pub struct ExecutionRequest {
    pub command_line: CommandLine,
    /// Case-sensitive variable name to value.
    pub environment: BTreeMap<String, String>,
    pub working_directory: PathBuf,
    pub timeout: Option<Duration>,
    /// Written once to the child's stdin, then closed.
    pub stdin: Option<Secret>,
}

impl ExecutionRequest {
    pub fn new(command_line: CommandLine, working_directory: impl Into<PathBuf>) -> Self {
        ExecutionRequest {
            command_line,
            environment: BTreeMap::new(),
            working_directory: working_directory.into(),
            timeout: None,
            stdin: None,
        }
    }
}

impl fmt::Debug for ExecutionRequest {
    // Environment values may hold proxy credentials or the encryption key: only names are shown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("command_line", &self.command_line)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .field("working_directory", &self.working_directory)
            .field("timeout", &self.timeout)
            .field("stdin", &self.stdin)
            .finish()
    }
}

/// Raw result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Classification of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure {
        exit_code: Option<i32>,
        message: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// The classified result of one invocation, with its captured output.
///
/// A failed invocation still carries whatever stdout and stderr the process produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub request: ExecutionRequest,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// `Some(0)` on success, the tool's code on failure, `None` when it never exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match &self.outcome {
            Outcome::Success => Some(0),
            Outcome::Failure { exit_code, .. } => *exit_code,
        }
    }

    /// Why the invocation failed, including the exit code and stderr.
    pub fn failure_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failure { message, .. } => Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_masks_secret_arguments() {
        let mut line = CommandLine::new("dfcli");
        line.add("c")
            .add("add")
            .add("prod")
            .add_masked("--password=hunter2");
        assert_eq!(line.to_string(), "dfcli c add prod ******");
        assert_eq!(
            line.arguments().collect::<Vec<_>>(),
            vec!["c", "add", "prod", "--password=hunter2"]
        );
    }

    #[test]
    fn failed_result_reports_code_and_message() {
        let result = ExecutionResult {
            request: ExecutionRequest::new(CommandLine::new("dfcli"), "/tmp"),
            stdout: "partial\n".into(),
            stderr: "denied".into(),
            duration: Duration::from_millis(12),
            outcome: Outcome::Failure {
                exit_code: Some(3),
                message: "dfcli command failed with exit code 3: denied".into(),
            },
        };
        assert!(!result.is_success());
        assert_eq!(result.exit_code(), Some(3));
        assert_eq!(
            result.failure_message(),
            Some("dfcli command failed with exit code 3: denied")
        );
        assert_eq!(result.duration_ms(), 12);
    }

    #[test]
    fn request_debug_hides_environment_values() {
        let mut request = ExecutionRequest::new(CommandLine::new("dfcli"), "/tmp");
        request
            .environment
            .insert("DFCLI_CLI_ENCRYPTION_KEY".into(), "abcdef".into());
        let rendered = format!("{:?}", request);
        assert!(rendered.contains("DFCLI_CLI_ENCRYPTION_KEY"));
        assert!(!rendered.contains("abcdef"));
    }
}
