//! Error taxonomy for the orchestrator.
//!
//! Every component reports failures through one of the enums below. Validation problems
//! (`FormatError`) are raised before any process or network call; I/O and process problems are
//! wrapped with what was being attempted. None of the messages ever contain secret material:
//! credentials only travel inside [`crate::schemas::servers::Secret`], which masks itself.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Malformed input detected at the boundary, before any side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid version '{input}': component '{component}' is not a non-negative integer")]
    InvalidVersion { input: String, component: String },

    #[error("version must be in the form of X.X.X, got '{0}'")]
    VersionPattern(String),

    #[error("the provided dfcli version must be at least {minimum}, got '{requested}'")]
    VersionTooLow { requested: String, minimum: String },

    #[error("command '{0}' contains disallowed characters")]
    DisallowedCommand(String),

    #[error("argument '{0}' contains disallowed characters")]
    DisallowedArgument(String),

    #[error("no command specified")]
    EmptyCommand,

    #[error("invalid property '{0}', expected KEY=VALUE")]
    InvalidProperty(String),
}

/// Failures while making the binary available on disk.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("network request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} answered with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("checksum mismatch for {url}: expected {expected}, downloaded {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("binary '{binary}' not found in archive {archive}")]
    BinaryMissing { binary: String, archive: PathBuf },

    #[error("no permission to make {path} executable: {source}")]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    /// Wraps an `io::Error` with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ProvisionError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Problems with the orchestrator configuration or the one-time server setup.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid server configuration: {0}")]
    InvalidServer(String),

    #[error("configuring server '{server_id}' failed with exit code {exit_code:?}: {stderr}")]
    ServerCommand {
        server_id: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("querying the installed dfcli version failed: {0}")]
    VersionQuery(String),

    #[error("failed to prepare home directory {path}: {source}")]
    HomeDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures launching or running a tool process.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("dfcli command failed with exit code {exit_code}: {stderr}")]
    NonZeroExit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("process was terminated by a signal: {stderr}")]
    Terminated { stdout: String, stderr: String },

    #[error("process timed out after {0:?} and was killed")]
    TimedOut(Duration),

    #[error("execution was cancelled")]
    Cancelled,
}

/// Outcome of a [`crate::libs::retry::RetryPolicy`] that did not succeed.
#[derive(Error, Debug)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("failed after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    #[error("retry interrupted after {attempts} attempts")]
    Interrupted {
        attempts: u32,
        #[source]
        last: Option<E>,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// Converts the carried cause.
    pub fn map<F, E2>(self, f: F) -> RetryError<E2>
    where
        E2: std::error::Error + 'static,
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted { attempts, last } => RetryError::Exhausted {
                attempts,
                last: f(last),
            },
            RetryError::Interrupted { attempts, last } => RetryError::Interrupted {
                attempts,
                last: last.map(f),
            },
        }
    }

    /// The underlying cause, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Interrupted { last, .. } => last.as_ref(),
        }
    }
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Retry(#[from] RetryError<Box<Error>>),
}

impl From<RetryError<ExecutionError>> for Error {
    fn from(error: RetryError<ExecutionError>) -> Self {
        Error::Retry(error.map(|e| Box::new(Error::Execution(e))))
    }
}

impl Error {
    /// Exit code of the tool process behind this error, looking through retries.
    pub fn tool_exit_code(&self) -> Option<i32> {
        match self {
            Error::Execution(ExecutionError::NonZeroExit { exit_code, .. }) => Some(*exit_code),
            Error::Retry(retry) => retry.last_error().and_then(|e| e.tool_exit_code()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_exit_message_embeds_exit_code() {
        let err = ExecutionError::NonZeroExit {
            exit_code: 3,
            stdout: String::new(),
            stderr: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "dfcli command failed with exit code 3: boom"
        );
    }

    #[test]
    fn format_errors_convert_into_crate_error() {
        let err: Error = FormatError::EmptyCommand.into();
        assert!(matches!(err, Error::Format(FormatError::EmptyCommand)));
    }

    #[test]
    fn exit_code_is_found_behind_retries() {
        let retry = RetryError::Exhausted {
            attempts: 3,
            last: ExecutionError::NonZeroExit {
                exit_code: 4,
                stdout: String::new(),
                stderr: String::new(),
            },
        };
        let err: Error = retry.into();
        assert_eq!(err.tool_exit_code(), Some(4));
        assert!(err.to_string().contains("failed after 3 attempts"));
        assert_eq!(Error::from(ExecutionError::Cancelled).tool_exit_code(), None);
    }
}
