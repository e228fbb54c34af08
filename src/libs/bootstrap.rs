// Prepares everything a run needs before dfcli is invoked: the provisioned binary, the
// per-run home directory, the environment (build metadata, proxy, exclusions, encryption
// key) and, the first time a home directory is used, one `c add` per configured server.

use crate::error::{ConfigurationError, Result};
use crate::libs::capabilities;
use crate::libs::credentials::{CredentialLookup, resolve_credentials};
use crate::libs::executor::resolve_executable;
use crate::libs::provisioner::{BinaryProvisioner, ProvisionedInstallation};
use crate::libs::utilities::locking::DirLock;
use crate::libs::utilities::process::ProcessLauncher;
use crate::schemas::config::OrchestratorConfig;
use crate::schemas::execution::{CommandLine, ExecutionRequest};
use crate::schemas::servers::{CredentialKind, Credentials, ProxySettings, Secret, ServerProfile};
use crate::{log_debug, log_info, log_warn};
use colored::Colorize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub const ENV_BUILD_NAME: &str = "DFCLI_CLI_BUILD_NAME";
pub const ENV_BUILD_NUMBER: &str = "DFCLI_CLI_BUILD_NUMBER";
pub const ENV_BUILD_URL: &str = "DFCLI_CLI_BUILD_URL";
pub const ENV_HOME_DIR: &str = "DFCLI_CLI_HOME_DIR";
pub const ENV_EXCLUDE: &str = "DFCLI_CLI_ENV_EXCLUDE";
pub const ENV_ENCRYPTION_KEY: &str = "DFCLI_CLI_ENCRYPTION_KEY";
pub const HTTP_PROXY: &str = "HTTP_PROXY";
pub const HTTPS_PROXY: &str = "HTTPS_PROXY";
pub const NO_PROXY: &str = "NO_PROXY";

/// Variable name patterns dfcli leaves out of published build metadata.
pub const DEFAULT_EXCLUSIONS: &str = "*password*;*psw*;*secret*;*key*;*token*;*auth*";

/// File dfcli writes into its home once servers are configured.
pub const CONFIGURED_MARKER_FILE: &str = "dfcli-cli.conf.v6";

/// Shared temporary directory of a workspace: `<parent>/<workspace name>@tmp/dfcli`.
pub fn workspace_temp_dir(workspace: &Path) -> PathBuf {
    let name = workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    let parent = workspace.parent().unwrap_or(workspace);
    parent.join(format!("{}@tmp", name)).join("dfcli")
}

/// Per-run dfcli home: `<parent>/<workspace name>@tmp/dfcli/<run id>/.dfcli`.
pub fn run_home_dir(workspace: &Path, run_id: &str) -> PathBuf {
    workspace_temp_dir(workspace).join(run_id).join(".dfcli")
}

/// Deletes the per-run home directory of `run_id`. Failures are logged, never raised.
///
/// # Returns
/// `true` when the directory is gone afterwards.
pub fn cleanup_run_home(workspace: &Path, run_id: &str) -> bool {
    let home = run_home_dir(workspace, run_id);
    match fs::remove_dir_all(&home) {
        Ok(()) => {
            log_info!("[Bootstrap] Removed {}", home.display().to_string().green());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            log_warn!(
                "[Bootstrap] Failed while attempting to delete the dfcli home dir {}: {}",
                home.display(),
                e
            );
            false
        }
    }
}

/// Normalizes a user supplied no-proxy host list to `a,b,c`.
///
/// Whitespace, `|` and `;` runs become a single comma, repeated commas collapse, and
/// leading or trailing commas are dropped.
pub fn create_no_proxy_value(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '|' || c == ';' || c == ',')
        .filter(|host| !host.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether the local dfcli configuration store gets encrypted for this run.
#[derive(Debug, Clone)]
pub struct ConfigEncryptionState {
    key: Option<Secret>,
}

impl ConfigEncryptionState {
    /// Enabled with a fresh 32-character key unless a persistent home is pinned, since
    /// tasks sharing a persistent home could disagree on the key.
    pub fn new(persistent_home: bool) -> Self {
        if persistent_home {
            return ConfigEncryptionState::disabled();
        }
        ConfigEncryptionState {
            key: Some(Secret::new(Uuid::new_v4().simple().to_string())),
        }
    }

    pub fn disabled() -> Self {
        ConfigEncryptionState { key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn key(&self) -> Option<&Secret> {
        self.key.as_ref()
    }
}

/// Fills in the dfcli variables of a run.
///
/// * build name, number and URL default from `JOB_NAME`, `BUILD_NUMBER`, `BUILD_URL`
/// * `DFCLI_CLI_HOME_DIR` is always set to `home`
/// * proxy variables are synthesized only when neither `HTTP_PROXY` nor `HTTPS_PROXY` is set
/// * the encryption key is added when enabled and not already present
pub fn configure_cli_env(
    env: &mut BTreeMap<String, String>,
    home: &Path,
    encryption: &ConfigEncryptionState,
    proxy: Option<&ProxySettings>,
) {
    for (target, source) in [
        (ENV_BUILD_NAME, "JOB_NAME"),
        (ENV_BUILD_NUMBER, "BUILD_NUMBER"),
        (ENV_BUILD_URL, "BUILD_URL"),
    ] {
        if env.contains_key(target) {
            continue;
        }
        if let Some(value) = env.get(source).cloned() {
            env.insert(target.to_string(), value);
        }
    }
    env.insert(ENV_HOME_DIR.to_string(), home.display().to_string());

    let proxy_unset = [HTTP_PROXY, HTTPS_PROXY]
        .iter()
        .all(|name| env.get(*name).is_none_or(|v| v.trim().is_empty()));
    if proxy_unset {
        if let Some(proxy) = proxy.filter(|p| p.is_configured()) {
            setup_proxy(env, proxy);
        }
    }

    if let Some(key) = encryption.key() {
        env.entry(ENV_ENCRYPTION_KEY.to_string())
            .or_insert_with(|| key.expose().to_string());
    }
}

fn setup_proxy(env: &mut BTreeMap<String, String>, proxy: &ProxySettings) {
    if proxy.credentials().is_some() {
        let exclusions = env
            .get(ENV_EXCLUDE)
            .cloned()
            .unwrap_or_else(|| DEFAULT_EXCLUSIONS.to_string());
        env.insert(
            ENV_EXCLUDE.to_string(),
            [exclusions.as_str(), HTTP_PROXY, HTTPS_PROXY].join(";"),
        );
    }
    let url = proxy.to_url();
    env.insert(HTTP_PROXY.to_string(), url.expose().to_string());
    env.insert(HTTPS_PROXY.to_string(), url.expose().to_string());
    if let Some(no_proxy) = proxy.no_proxy.as_deref().filter(|v| !v.trim().is_empty()) {
        env.insert(NO_PROXY.to_string(), create_no_proxy_value(no_proxy));
    }
    log_debug!(
        "[Bootstrap] Proxy configured through {}:{}",
        proxy.host,
        proxy.port
    );
}

/// Builds `<binary> c add <id> ...` for one server.
///
/// Secrets are added as masked arguments. With `password_stdin` the password is returned
/// separately, to be written to the child's stdin, and `--password-stdin` is passed instead.
pub fn server_config_command(
    executable: &str,
    server: &ServerProfile,
    credentials: &Credentials,
    password_stdin: bool,
) -> (CommandLine, Option<Secret>) {
    let mut line = CommandLine::new(executable);
    line.add("c").add("add").add(server.id.as_str());
    let mut stdin = None;
    match credentials.kind() {
        CredentialKind::AccessToken => {
            line.add_masked(format!("--access-token={}", credentials.access_token.expose()));
        }
        CredentialKind::UsernamePassword => {
            line.add_masked(format!("--user={}", credentials.username.expose()));
            if password_stdin {
                line.add("--password-stdin");
                stdin = Some(credentials.password.clone());
            } else {
                line.add_masked(format!("--password={}", credentials.password.expose()));
            }
        }
        CredentialKind::None => {}
    }
    line.add(format!("--url={}", server.url))
        .add(format!("--distroface-url={}", server.infer_distroface_url()))
        .add(format!("--distribution-url={}", server.infer_distribution_url()))
        .add(format!("--xray-url={}", server.infer_xray_url()))
        .add("--interactive=false")
        .add("--overwrite=true");
    (line, stdin)
}

/// Identity of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub workspace: PathBuf,
    /// A long-lived dfcli home to use instead of the per-run one.
    pub persistent_home: Option<PathBuf>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        RunContext {
            run_id: run_id.into(),
            workspace: workspace.into(),
            persistent_home: None,
        }
    }
}

/// A run ready for dfcli invocations.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub installation: ProvisionedInstallation,
    pub home_dir: PathBuf,
    pub environment: BTreeMap<String, String>,
    pub encryption: ConfigEncryptionState,
}

pub struct EnvironmentBootstrapper {
    config: Arc<OrchestratorConfig>,
    install_dir: PathBuf,
    provisioner: Arc<BinaryProvisioner>,
    launcher: Arc<dyn ProcessLauncher>,
    credentials: Arc<dyn CredentialLookup>,
    encryption: Mutex<HashMap<String, ConfigEncryptionState>>,
    configured: Mutex<HashSet<PathBuf>>,
}

impl EnvironmentBootstrapper {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        install_dir: PathBuf,
        provisioner: Arc<BinaryProvisioner>,
        launcher: Arc<dyn ProcessLauncher>,
        credentials: Arc<dyn CredentialLookup>,
    ) -> Self {
        EnvironmentBootstrapper {
            config,
            install_dir,
            provisioner,
            launcher,
            credentials,
            encryption: Mutex::new(HashMap::new()),
            configured: Mutex::new(HashSet::new()),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Provisions the binary into the installation directory.
    pub fn provision(&self) -> Result<ProvisionedInstallation> {
        self.provisioner.provision(
            &self.config.cli.name,
            self.config.cli.version.as_deref(),
            &self.install_dir,
        )
    }

    /// Provisions, builds the run environment from `base_env` and configures the servers
    /// if this home has not been configured yet.
    pub fn prepare(&self, run: &RunContext, base_env: &BTreeMap<String, String>) -> Result<PreparedRun> {
        let installation = self.provision()?;

        let pinned_home = run
            .persistent_home
            .clone()
            .or_else(|| base_env.get(ENV_HOME_DIR).filter(|v| !v.trim().is_empty()).map(PathBuf::from));
        let encryption = self.encryption_for(&run.run_id, pinned_home.is_some());
        let home_dir = pinned_home.unwrap_or_else(|| run_home_dir(&run.workspace, &run.run_id));
        fs::create_dir_all(&home_dir).map_err(|source| ConfigurationError::HomeDirectory {
            path: home_dir.clone(),
            source,
        })?;

        let mut environment = base_env.clone();
        installation.build_env_vars(&mut environment);
        configure_cli_env(
            &mut environment,
            &home_dir,
            &encryption,
            self.config.proxy.as_ref(),
        );
        log_debug!(
            "[Bootstrap] Run '{}' uses home {}",
            run.run_id,
            home_dir.display().to_string().cyan()
        );

        self.configure_servers(&home_dir, &installation, &environment, &run.workspace)?;
        Ok(PreparedRun {
            installation,
            home_dir,
            environment,
            encryption,
        })
    }

    /// One key per run id, generated on first use.
    fn encryption_for(&self, run_id: &str, persistent_home: bool) -> ConfigEncryptionState {
        if persistent_home {
            return ConfigEncryptionState::disabled();
        }
        lock(&self.encryption)
            .entry(run_id.to_string())
            .or_insert_with(|| ConfigEncryptionState::new(false))
            .clone()
    }

    fn configure_servers(
        &self,
        home_dir: &Path,
        installation: &ProvisionedInstallation,
        environment: &BTreeMap<String, String>,
        working_directory: &Path,
    ) -> Result<()> {
        if self.config.servers.is_empty() || lock(&self.configured).contains(home_dir) {
            return Ok(());
        }
        let _lock = DirLock::acquire(home_dir).map_err(|source| ConfigurationError::HomeDirectory {
            path: home_dir.to_path_buf(),
            source,
        })?;
        if home_dir.join(CONFIGURED_MARKER_FILE).is_file() {
            log_debug!("[Bootstrap] {} is already configured", home_dir.display());
            lock(&self.configured).insert(home_dir.to_path_buf());
            return Ok(());
        }

        let mut environment = environment.clone();
        let executable = resolve_executable(
            &installation.name,
            &installation.home_directory,
            self.provisioner.platform(),
            self.launcher.kind(),
            &mut environment,
        );
        let timeout = self.config.execution.timeout_secs.map(std::time::Duration::from_secs);
        let mut password_stdin: Option<bool> = None;

        for server in &self.config.servers {
            let credentials = resolve_credentials(server, self.credentials.as_ref())?;
            let use_stdin = if credentials.kind() == CredentialKind::UsernamePassword {
                match password_stdin {
                    Some(supported) => supported,
                    None => {
                        let supported = capabilities::negotiate_password_stdin(
                            self.launcher.as_ref(),
                            &executable,
                            &environment,
                            working_directory,
                            timeout,
                        )?;
                        password_stdin = Some(supported);
                        supported
                    }
                }
            } else {
                false
            };

            let (line, stdin) = server_config_command(&executable, server, &credentials, use_stdin);
            log_info!("[Bootstrap] Configuring server '{}'", server.id.bold());
            let mut request = ExecutionRequest::new(line, working_directory);
            request.environment = environment.clone();
            request.stdin = stdin;
            request.timeout = timeout;

            let output = self.launcher.launch(&request).map_err(|e| {
                ConfigurationError::ServerCommand {
                    server_id: server.id.clone(),
                    exit_code: None,
                    stderr: e.to_string(),
                }
            })?;
            if output.exit_code != Some(0) {
                return Err(ConfigurationError::ServerCommand {
                    server_id: server.id.clone(),
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                }
                .into());
            }
        }
        lock(&self.configured).insert(home_dir.to_path_buf());
        log_info!(
            "[Bootstrap] Configured {} server(s) in {}",
            self.config.servers.len(),
            home_dir.display().to_string().green()
        );
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
