// The capability interface a host binds to: provision the tool, configure a run, execute
// commands. `Orchestrator` wires the provisioner, bootstrapper, executor, retry policy and
// task runner together behind it.

use crate::error::{Error, Result};
use crate::libs::bootstrap::{self, EnvironmentBootstrapper, PreparedRun, RunContext};
use crate::libs::cache_key;
use crate::libs::credentials::{CredentialLookup, EnvCredentialLookup};
use crate::libs::executor::{self, CommandExecutor, InvocationContext, LogSink, ToolCommand};
use crate::libs::paths;
use crate::libs::provisioner::{BinaryProvisioner, ProvisionedInstallation};
use crate::libs::retry::RetryPolicy;
use crate::libs::task_runner::{ConcurrentTaskRunner, TaskError, TaskResult};
use crate::libs::utilities::assets::{HttpReleaseSource, ReleaseSource};
use crate::libs::utilities::cancel::CancellationToken;
use crate::libs::utilities::platform::{self, PlatformIdentifier};
use crate::libs::utilities::process::{LocalLauncher, ProcessLauncher};
use crate::schemas::config::OrchestratorConfig;
use crate::schemas::execution::{ExecutionRequest, ExecutionResult};
use crate::{log_debug, log_info};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// What a host needs from the orchestrator.
pub trait Orchestration {
    /// Makes the tool binary available and returns where it lives.
    fn provision(&self) -> Result<ProvisionedInstallation>;

    /// Builds the run environment and configures servers once per home directory.
    fn configure(&self, run: &RunContext) -> Result<PreparedRun>;

    /// Runs one command in the run's environment, retrying failed attempts.
    fn execute(&self, run: &RunContext, command: &ToolCommand) -> Result<ExecutionResult>;
}

/// The pluggable parts of an [`Orchestrator`].
pub struct Collaborators {
    pub source: Arc<dyn ReleaseSource>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub credentials: Arc<dyn CredentialLookup>,
    pub sink: Arc<dyn LogSink>,
}

pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    bootstrapper: EnvironmentBootstrapper,
    executor: CommandExecutor,
    platform: PlatformIdentifier,
    retry: RetryPolicy,
    cancel: CancellationToken,
    base_env: BTreeMap<String, String>,
}

impl Orchestrator {
    /// # Arguments
    /// * `config`: validated orchestrator configuration.
    /// * `install_dir`: directory the binary is provisioned into.
    /// * `platform`: platform whose release asset is installed.
    /// * `parts`: release source, process launcher, credential lookup and output sink.
    /// * `cancel`: aborts retries and stops unstarted batch tasks once fired.
    pub fn new(
        config: OrchestratorConfig,
        install_dir: PathBuf,
        platform: PlatformIdentifier,
        parts: Collaborators,
        cancel: CancellationToken,
    ) -> Self {
        let config = Arc::new(config);
        let provisioner = Arc::new(BinaryProvisioner::new(
            parts.source,
            config.cli.release_base_url.clone(),
            platform.clone(),
        ));
        let bootstrapper = EnvironmentBootstrapper::new(
            Arc::clone(&config),
            install_dir,
            provisioner,
            Arc::clone(&parts.launcher),
            parts.credentials,
        );
        let retry = RetryPolicy::new(
            config.execution.retry_attempts,
            Duration::from_millis(config.execution.retry_delay_ms),
        )
        .with_pause(Arc::new(cancel.clone()));
        Orchestrator {
            config,
            bootstrapper,
            executor: CommandExecutor::new(parts.launcher, parts.sink),
            platform,
            retry,
            cancel,
            base_env: BTreeMap::new(),
        }
    }

    /// Production wiring: HTTP release source, local launcher, credentials and base
    /// environment from the process environment.
    pub fn from_config(
        config: OrchestratorConfig,
        sink: Arc<dyn LogSink>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let source = HttpReleaseSource::new(config.cli.checksum_header.clone(), config.proxy.as_ref())?;
        let install_dir = paths::resolve_install_dir(&config.cli);
        let parts = Collaborators {
            source: Arc::new(source),
            launcher: Arc::new(LocalLauncher::with_cancellation(cancel.clone())),
            credentials: Arc::new(EnvCredentialLookup::from_process_env()),
            sink,
        };
        let orchestrator = Orchestrator::new(config, install_dir, platform::detect(), parts, cancel)
            .with_base_env(std::env::vars().collect());
        Ok(orchestrator)
    }

    /// Environment every run starts from.
    pub fn with_base_env(mut self, base_env: BTreeMap<String, String>) -> Self {
        self.base_env = base_env;
        self
    }

    /// Overrides the configured number of attempts per command.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry = RetryPolicy::new(
            attempts,
            Duration::from_millis(self.config.execution.retry_delay_ms),
        )
        .with_pause(Arc::new(self.cancel.clone()));
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn install_dir(&self) -> &std::path::Path {
        self.bootstrapper.install_dir()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Key that would be appended for `version` and `properties`, without running anything.
    pub fn cache_key(&self, version: Option<&str>, properties: &BTreeMap<String, String>) -> Option<String> {
        cache_key::build(version, properties)
    }

    /// Deletes the per-run home directory of `run`. Never fails.
    pub fn cleanup(&self, run: &RunContext) -> bool {
        bootstrap::cleanup_run_home(&run.workspace, &run.run_id)
    }

    /// Runs `commands` concurrently in one prepared run.
    ///
    /// Preparing the run (provisioning and server configuration) is fatal; after that every
    /// command succeeds or fails on its own.
    ///
    /// # Arguments
    /// * `max_concurrency`: overrides `execution.max_concurrency` when given.
    ///
    /// # Returns
    /// One result per command, in input order. A command that ran and failed keeps its
    /// [`ExecutionResult`] (stdout, stderr, exit code) next to the error.
    pub fn run_batch(
        &self,
        run: &RunContext,
        commands: Vec<ToolCommand>,
        max_concurrency: Option<usize>,
    ) -> Result<Vec<TaskResult<ToolCommand, ExecutionResult>>> {
        let prepared = self.configure(run)?;
        let runner = ConcurrentTaskRunner::new(
            max_concurrency.unwrap_or(self.config.execution.max_concurrency),
        )
        .with_cancellation(self.cancel.clone());
        log_info!(
            "[Orchestrator] Running {} command(s) with up to {} at a time",
            commands.len().to_string().bold(),
            runner.max_concurrency()
        );
        let results = runner.run(commands, |command| {
            let request = self.build_request(command, run, &prepared)?;
            Ok::<_, Error>(self.execute_attempts(request))
        });
        Ok(results.into_iter().map(flag_failed_outcome).collect())
    }

    fn build_request(
        &self,
        command: &ToolCommand,
        run: &RunContext,
        prepared: &PreparedRun,
    ) -> Result<ExecutionRequest> {
        let context = InvocationContext {
            name: &self.config.cli.name,
            home: &prepared.installation.home_directory,
            platform: &self.platform,
            environment: &prepared.environment,
            working_directory: &run.workspace,
            timeout: self.config.execution.timeout_secs.map(Duration::from_secs),
        };
        Ok(self.executor.build_request(command, &context)?)
    }

    fn execute_with_retry(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let result = self.retry.run(|attempt| {
            if attempt > 1 {
                log_info!(
                    "[Orchestrator] Attempt {}/{} for {}",
                    attempt,
                    self.retry.max_attempts(),
                    request.command_line
                );
            }
            self.executor.execute_checked(request.clone())
        });
        result.map_err(Error::from)
    }

    /// Retries like [`execute_with_retry`](Self::execute_with_retry) but keeps the last
    /// attempt's result instead of turning a failure into an error.
    fn execute_attempts(&self, request: ExecutionRequest) -> ExecutionResult {
        self.retry.run_until(
            |attempt| {
                if attempt > 1 {
                    log_info!(
                        "[Orchestrator] Attempt {}/{} for {}",
                        attempt,
                        self.retry.max_attempts(),
                        request.command_line
                    );
                }
                self.executor.execute(request.clone())
            },
            ExecutionResult::is_success,
        )
    }
}

/// Marks a task whose command ran but failed, keeping its output.
fn flag_failed_outcome(
    mut result: TaskResult<ToolCommand, ExecutionResult>,
) -> TaskResult<ToolCommand, ExecutionResult> {
    if result.error.is_none() {
        if let Some(message) = result.output.as_ref().and_then(ExecutionResult::failure_message) {
            result.error = Some(TaskError::Failed(message.to_string()));
        }
    }
    result
}

impl Orchestration for Orchestrator {
    fn provision(&self) -> Result<ProvisionedInstallation> {
        self.bootstrapper.provision()
    }

    fn configure(&self, run: &RunContext) -> Result<PreparedRun> {
        self.bootstrapper.prepare(run, &self.base_env)
    }

    fn execute(&self, run: &RunContext, command: &ToolCommand) -> Result<ExecutionResult> {
        // Malformed input is rejected before anything is downloaded or spawned.
        executor::validate_command(&command.command)?;
        if let Some(key) = cache_key::resolve(
            command.cache_key.as_deref(),
            command.version.as_deref(),
            &command.properties,
        ) {
            executor::validate_cache_key(&key)?;
        }
        let prepared = self.configure(run)?;
        let request = self.build_request(command, run, &prepared)?;
        log_debug!("[Orchestrator] Prepared {:?}", request);
        self.execute_with_retry(request)
    }
}
