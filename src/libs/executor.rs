// Builds and runs a single dfcli command.
//
// Every token is validated before anything is spawned. The executable is resolved from the
// installation directory (or, inside a container, found through `PATH`), the cache key is
// appended, and the process output is streamed to a `LogSink` and classified.

use crate::error::{ExecutionError, FormatError};
use crate::libs::cache_key;
use crate::libs::utilities::platform::PlatformIdentifier;
use crate::libs::utilities::process::{LauncherKind, ProcessLauncher};
use crate::schemas::config::BatchTask;
use crate::schemas::execution::{
    CommandLine, ExecutionRequest, ExecutionResult, Outcome, ProcessOutput,
};
use crate::{log_debug, log_error, log_info, log_warn};
use colored::Colorize;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

fn command_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-\s]+$").expect("command pattern is valid"))
}

fn argument_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w/\\.:@=\-]+$").expect("argument pattern is valid"))
}

fn cache_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w/\\.:@=,\-]+$").expect("cache key pattern is valid"))
}

/// A dfcli command as a user or batch file states it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCommand {
    /// Everything after the binary name, e.g. `rt upload a.tgz repo/`.
    pub command: String,
    pub version: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub cache_key: Option<String>,
}

impl ToolCommand {
    pub fn new(command: impl Into<String>) -> Self {
        ToolCommand {
            command: command.into(),
            ..Default::default()
        }
    }
}

impl From<BatchTask> for ToolCommand {
    fn from(task: BatchTask) -> Self {
        ToolCommand {
            command: task.command,
            version: task.version,
            properties: task.properties,
            cache_key: task.cache_key,
        }
    }
}

/// Splits and validates a command. The first token must be a plain word
/// (letters, digits, `-`, `_`); the rest may also contain `/ \ . : @ =`.
pub fn validate_command(command: &str) -> Result<Vec<String>, FormatError> {
    let tokens: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    let Some((first, rest)) = tokens.split_first() else {
        return Err(FormatError::EmptyCommand);
    };
    if !command_pattern().is_match(first) {
        return Err(FormatError::DisallowedCommand(first.clone()));
    }
    if let Some(bad) = rest.iter().find(|arg| !argument_pattern().is_match(arg)) {
        return Err(FormatError::DisallowedArgument(bad.clone()));
    }
    Ok(tokens)
}

/// Splits and validates a cache key. Tokens may additionally contain commas.
pub fn validate_cache_key(key: &str) -> Result<Vec<String>, FormatError> {
    key.split_whitespace()
        .map(|token| {
            if cache_key_pattern().is_match(token) {
                Ok(token.to_string())
            } else {
                Err(FormatError::DisallowedArgument(token.to_string()))
            }
        })
        .collect()
}

/// Parses `KEY=VALUE` command-line properties.
pub fn parse_property(raw: &str) -> Result<(String, String), FormatError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(FormatError::InvalidProperty(raw.to_string())),
    }
}

/// Resolves what to put in argv[0].
///
/// A container launcher gets the bare binary name and `home` is prepended to `PATH` in
/// `environment`; every other launcher gets the absolute path inside `home`.
pub fn resolve_executable(
    name: &str,
    home: &Path,
    platform: &PlatformIdentifier,
    launcher: LauncherKind,
    environment: &mut BTreeMap<String, String>,
) -> String {
    let binary_name = platform.binary_name(name);
    if launcher != LauncherKind::Container {
        return home.join(binary_name).display().to_string();
    }
    let separator = if platform.is_windows() { ";" } else { ":" };
    let current = environment
        .get("PATH")
        .cloned()
        .or_else(|| std::env::var("PATH").ok())
        .unwrap_or_default();
    let path = if current.is_empty() {
        home.display().to_string()
    } else {
        format!("{}{}{}", home.display(), separator, current)
    };
    log_debug!("[Executor] Updated PATH to include {}", home.display());
    environment.insert("PATH".to_string(), path);
    binary_name
}

/// Receives the output of finished commands.
pub trait LogSink: Send + Sync {
    fn stdout_line(&self, line: &str);
    fn stderr_line(&self, line: &str);
}

/// Writes stdout lines to the console verbatim and stderr lines as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn stdout_line(&self, line: &str) {
        println!("{}", line);
    }

    fn stderr_line(&self, line: &str) {
        log_warn!("{}", line);
    }
}

/// Discards output. Used when the caller prints results itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn stdout_line(&self, _line: &str) {}
    fn stderr_line(&self, _line: &str) {}
}

/// Where and how a command runs.
#[derive(Debug, Clone)]
pub struct InvocationContext<'a> {
    pub name: &'a str,
    pub home: &'a Path,
    pub platform: &'a PlatformIdentifier,
    pub environment: &'a BTreeMap<String, String>,
    pub working_directory: &'a Path,
    pub timeout: Option<Duration>,
}

pub struct CommandExecutor {
    launcher: Arc<dyn ProcessLauncher>,
    sink: Arc<dyn LogSink>,
}

impl CommandExecutor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, sink: Arc<dyn LogSink>) -> Self {
        CommandExecutor { launcher, sink }
    }

    pub fn launcher(&self) -> &Arc<dyn ProcessLauncher> {
        &self.launcher
    }

    /// Validates `command` and assembles the request. Nothing is spawned.
    pub fn build_request(
        &self,
        command: &ToolCommand,
        context: &InvocationContext<'_>,
    ) -> Result<ExecutionRequest, FormatError> {
        let tokens = validate_command(&command.command)?;
        let key = cache_key::resolve(
            command.cache_key.as_deref(),
            command.version.as_deref(),
            &command.properties,
        );
        let key_tokens = match key.as_deref() {
            Some(key) => validate_cache_key(key)?,
            None => Vec::new(),
        };

        let mut environment = context.environment.clone();
        let executable = resolve_executable(
            context.name,
            context.home,
            context.platform,
            self.launcher.kind(),
            &mut environment,
        );
        let mut line = CommandLine::new(executable);
        for token in tokens.into_iter().chain(key_tokens) {
            line.add(token);
        }

        let mut request = ExecutionRequest::new(line, context.working_directory);
        request.environment = environment;
        request.timeout = context.timeout;
        Ok(request)
    }

    /// Runs `request` and classifies the result. Never fails: launch errors, timeouts and
    /// non-zero exits all become [`Outcome::Failure`]. Captured stdout is kept either way.
    pub fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let (launched, duration) = self.launch(&request);
        match launched {
            Ok(output) => {
                let outcome = match output.exit_code {
                    Some(0) => Outcome::Success,
                    code => Outcome::Failure {
                        exit_code: code,
                        message: failure_message(code, &output.stderr),
                    },
                };
                ExecutionResult {
                    request,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    duration,
                    outcome,
                }
            }
            Err(e) => ExecutionResult {
                request,
                stdout: String::new(),
                stderr: String::new(),
                duration,
                outcome: Outcome::Failure {
                    exit_code: None,
                    message: e.to_string(),
                },
            },
        }
    }

    /// Like [`execute`](Self::execute) but treats any failure as an error.
    pub fn execute_checked(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, ExecutionError> {
        let (launched, duration) = self.launch(&request);
        let output = launched?;
        match output.exit_code {
            Some(0) => Ok(ExecutionResult {
                request,
                stdout: output.stdout,
                stderr: output.stderr,
                duration,
                outcome: Outcome::Success,
            }),
            Some(exit_code) => Err(ExecutionError::NonZeroExit {
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr.trim().to_string(),
            }),
            None => Err(ExecutionError::Terminated {
                stdout: output.stdout,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }

    fn launch(
        &self,
        request: &ExecutionRequest,
    ) -> (Result<ProcessOutput, ExecutionError>, Duration) {
        log_info!("[Executor] Running {}", request.command_line.to_string().cyan());
        let started = Instant::now();
        let launched = self.launcher.launch(request);
        let duration = started.elapsed();
        match &launched {
            Ok(output) => {
                self.stream(output);
                if output.exit_code != Some(0) {
                    log_error!(
                        "[Executor] {}",
                        failure_message(output.exit_code, "").red()
                    );
                }
            }
            Err(e) => log_error!("[Executor] {}", e.to_string().red()),
        }
        (launched, duration)
    }

    fn stream(&self, output: &ProcessOutput) {
        for line in output.stdout.trim().lines() {
            self.sink.stdout_line(line);
        }
        for line in output.stderr.trim().lines() {
            self.sink.stderr_line(line);
        }
    }
}

fn failure_message(exit_code: Option<i32>, stderr: &str) -> String {
    let summary = match exit_code {
        Some(code) => format!("dfcli command failed with exit code {}", code),
        None => "dfcli command was terminated by a signal".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        summary
    } else {
        format!("{}: {}", summary, stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::utilities::platform::resolve;
    use std::sync::Mutex;

    struct RecordingLauncher {
        kind: LauncherKind,
        output: ProcessOutput,
        launched: Mutex<Vec<ExecutionRequest>>,
    }

    impl RecordingLauncher {
        fn new(kind: LauncherKind, exit_code: i32) -> Arc<Self> {
            Arc::new(RecordingLauncher {
                kind,
                output: ProcessOutput {
                    exit_code: Some(exit_code),
                    stdout: "line one\nline two\n".to_string(),
                    stderr: if exit_code == 0 { String::new() } else { "bad thing".to_string() },
                },
                launched: Mutex::new(Vec::new()),
            })
        }
    }

    impl ProcessLauncher for RecordingLauncher {
        fn kind(&self) -> LauncherKind {
            self.kind
        }

        fn launch(&self, request: &ExecutionRequest) -> Result<ProcessOutput, ExecutionError> {
            self.launched.lock().unwrap().push(request.clone());
            Ok(self.output.clone())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        stdout: Mutex<Vec<String>>,
        stderr: Mutex<Vec<String>>,
    }

    impl LogSink for CollectingSink {
        fn stdout_line(&self, line: &str) {
            self.stdout.lock().unwrap().push(line.to_string());
        }

        fn stderr_line(&self, line: &str) {
            self.stderr.lock().unwrap().push(line.to_string());
        }
    }

    fn context<'a>(
        platform: &'a PlatformIdentifier,
        env: &'a BTreeMap<String, String>,
    ) -> InvocationContext<'a> {
        InvocationContext {
            name: "dfcli",
            home: Path::new("/opt/tools/dfcli"),
            platform,
            environment: env,
            working_directory: Path::new("/work"),
            timeout: None,
        }
    }

    #[test]
    fn shell_metacharacters_are_rejected() {
        assert!(matches!(
            validate_command("rt ping;rm"),
            Err(FormatError::DisallowedArgument(_))
        ));
        assert!(matches!(
            validate_command("rt ping & whoami"),
            Err(FormatError::DisallowedArgument(_))
        ));
        assert!(matches!(
            validate_command("rt;ls ping"),
            Err(FormatError::DisallowedCommand(_))
        ));
        assert_eq!(validate_command("   "), Err(FormatError::EmptyCommand));
        assert_eq!(
            validate_command("rt upload build/app.tgz generic-local/ --flat=true").unwrap(),
            vec!["rt", "upload", "build/app.tgz", "generic-local/", "--flat=true"]
        );
    }

    #[test]
    fn rejected_command_never_launches() {
        let launcher = RecordingLauncher::new(LauncherKind::Direct, 0);
        let executor = CommandExecutor::new(launcher.clone(), Arc::new(NullSink));
        let platform = resolve("linux", "amd64");
        let env = BTreeMap::new();
        assert!(executor
            .build_request(&ToolCommand::new("rt ping && curl evil"), &context(&platform, &env))
            .is_err());
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn direct_launcher_uses_absolute_path_and_cache_key() {
        let launcher = RecordingLauncher::new(LauncherKind::Direct, 0);
        let executor = CommandExecutor::new(launcher, Arc::new(NullSink));
        let platform = resolve("linux", "amd64");
        let env = BTreeMap::new();
        let mut command = ToolCommand::new("rt build-publish");
        command.version = Some("1.0.0".into());
        command.properties.insert("KEY1".into(), "VAL1".into());
        command.properties.insert("KEY2".into(), "VAL2".into());

        let request = executor.build_request(&command, &context(&platform, &env)).unwrap();
        assert_eq!(
            request.command_line.to_string(),
            "/opt/tools/dfcli/dfcli rt build-publish --version 1.0.0 --property KEY1=VAL1,KEY2=VAL2"
        );
        assert_eq!(request.working_directory, Path::new("/work"));
    }

    #[test]
    fn container_launcher_uses_path() {
        let launcher = RecordingLauncher::new(LauncherKind::Container, 0);
        let executor = CommandExecutor::new(launcher, Arc::new(NullSink));
        let platform = resolve("linux", "amd64");
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        let request = executor
            .build_request(&ToolCommand::new("rt ping"), &context(&platform, &env))
            .unwrap();
        assert_eq!(request.command_line.program(), "dfcli");
        assert_eq!(request.environment["PATH"], "/opt/tools/dfcli:/usr/bin");
    }

    #[test]
    fn non_zero_exit_is_a_failure_with_stdout_kept() {
        let launcher = RecordingLauncher::new(LauncherKind::Direct, 2);
        let sink = Arc::new(CollectingSink::default());
        let executor = CommandExecutor::new(launcher, sink.clone());
        let request = ExecutionRequest::new(CommandLine::new("dfcli"), "/work");

        let result = executor.execute(request.clone());
        assert_eq!(result.stdout, "line one\nline two\n");
        match &result.outcome {
            Outcome::Failure { exit_code, message } => {
                assert_eq!(*exit_code, Some(2));
                assert!(message.contains("exit code 2"));
            }
            Outcome::Success => panic!("expected failure"),
        }
        assert_eq!(*sink.stdout.lock().unwrap(), vec!["line one", "line two"]);
        assert_eq!(*sink.stderr.lock().unwrap(), vec!["bad thing"]);

        let err = executor.execute_checked(request).unwrap_err();
        assert_eq!(err.to_string(), "dfcli command failed with exit code 2: bad thing");
    }

    #[test]
    fn properties_parse() {
        assert_eq!(
            parse_property("arch=amd64").unwrap(),
            ("arch".to_string(), "amd64".to_string())
        );
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=x").is_err());
    }
}
