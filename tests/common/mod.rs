//! Fakes shared by the integration tests: an in-memory release source, a scripted process
//! launcher and a configuration builder.
#![allow(dead_code)]

use dfcli_orchestrator::error::{ExecutionError, ProvisionError};
use dfcli_orchestrator::libs::credentials::EnvCredentialLookup;
use dfcli_orchestrator::libs::executor::NullSink;
use dfcli_orchestrator::libs::orchestrator::{Collaborators, Orchestrator};
use dfcli_orchestrator::libs::utilities::assets::ReleaseSource;
use dfcli_orchestrator::libs::utilities::cancel::CancellationToken;
use dfcli_orchestrator::libs::utilities::platform;
use dfcli_orchestrator::libs::utilities::process::{LauncherKind, ProcessLauncher};
use dfcli_orchestrator::schemas::config::OrchestratorConfig;
use dfcli_orchestrator::schemas::execution::{ExecutionRequest, ProcessOutput};
use dfcli_orchestrator::schemas::servers::{Credentials, ServerProfile};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Serves one archive and a settable fingerprint, counting requests.
pub struct FakeSource {
    pub checksum: Mutex<Option<String>>,
    pub archive: Vec<u8>,
    pub heads: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl FakeSource {
    pub fn new(checksum: Option<&str>) -> Arc<Self> {
        Arc::new(FakeSource {
            checksum: Mutex::new(checksum.map(str::to_string)),
            archive: tar_gz(&[("dfcli-linux-amd64/dfcli", b"#!/bin/sh\n")]),
            heads: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        })
    }

    pub fn requests(&self) -> usize {
        self.heads.load(Ordering::SeqCst) + self.downloads.load(Ordering::SeqCst)
    }
}

impl ReleaseSource for FakeSource {
    fn fetch_checksum(&self, _url: &str) -> Result<Option<String>, ProvisionError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        Ok(self.checksum.lock().unwrap().clone())
    }

    fn download(&self, _url: &str, dest: &Path) -> Result<(), ProvisionError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        std::fs::write(dest, &self.archive).unwrap();
        Ok(())
    }
}

/// Answers `--version` with a fixed version, `c add` with `config_exit`, and tool commands
/// with the queued exit codes (0 once the queue is empty). Every request is recorded.
pub struct ScriptedLauncher {
    pub kind: LauncherKind,
    pub installed_version: String,
    pub config_exit: i32,
    pub tool_exits: Mutex<VecDeque<i32>>,
    pub requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedLauncher {
            kind: LauncherKind::Direct,
            installed_version: "2.40.0".to_string(),
            config_exit: 0,
            tool_exits: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with(kind: LauncherKind, installed_version: &str, config_exit: i32) -> Arc<Self> {
        Arc::new(ScriptedLauncher {
            kind,
            installed_version: installed_version.to_string(),
            config_exit,
            tool_exits: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn queue_tool_exits(&self, codes: &[i32]) {
        self.tool_exits.lock().unwrap().extend(codes.iter().copied());
    }

    /// Requests whose first argument is `first`.
    pub fn calls(&self, first: &str) -> Vec<ExecutionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.command_line.arguments().next() == Some(first))
            .cloned()
            .collect()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn kind(&self) -> LauncherKind {
        self.kind
    }

    fn launch(&self, request: &ExecutionRequest) -> Result<ProcessOutput, ExecutionError> {
        self.requests.lock().unwrap().push(request.clone());
        let first = request.command_line.arguments().next().unwrap_or("");
        let (code, stdout) = match first {
            "--version" => (0, format!("dfcli version {}\n", self.installed_version)),
            "c" => (self.config_exit, String::new()),
            _ => {
                let code = self.tool_exits.lock().unwrap().pop_front().unwrap_or(0);
                (code, format!("ran {}\n", request.command_line))
            }
        };
        Ok(ProcessOutput {
            exit_code: Some(code),
            stdout,
            stderr: if code == 0 { String::new() } else { "tool error".to_string() },
        })
    }
}

pub fn config_with_servers(servers: Vec<ServerProfile>) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.execution.retry_attempts = 3;
    config.execution.retry_delay_ms = 0;
    config.servers = servers;
    config
}

pub fn password_server(id: &str) -> ServerProfile {
    ServerProfile::new(
        id,
        format!("https://{}.example.com", id),
        Credentials::with_password("admin", "hunter2"),
    )
}

pub fn token_server(id: &str) -> ServerProfile {
    ServerProfile::new(
        id,
        format!("https://{}.example.com", id),
        Credentials::with_token("tok-123"),
    )
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub launcher: Arc<ScriptedLauncher>,
    pub orchestrator: Orchestrator,
    pub install_dir: PathBuf,
    pub workspace: PathBuf,
    _scratch: tempfile::TempDir,
}

pub fn harness(config: OrchestratorConfig, launcher: Arc<ScriptedLauncher>) -> Harness {
    let scratch = tempfile::tempdir().unwrap();
    let install_dir = scratch.path().join("tools").join("dfcli");
    let workspace = scratch.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();
    let source = FakeSource::new(Some("fp-1"));

    let parts = Collaborators {
        source: Arc::clone(&source) as Arc<dyn ReleaseSource>,
        launcher: Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
        credentials: Arc::new(EnvCredentialLookup::from_map(BTreeMap::new())),
        sink: Arc::new(NullSink),
    };
    let mut base_env = BTreeMap::new();
    base_env.insert("JOB_NAME".to_string(), "nightly".to_string());
    base_env.insert("BUILD_NUMBER".to_string(), "17".to_string());
    base_env.insert("PATH".to_string(), "/usr/bin".to_string());

    let orchestrator = Orchestrator::new(
        config,
        install_dir.clone(),
        platform::resolve("linux", "x86_64"),
        parts,
        CancellationToken::new(),
    )
    .with_base_env(base_env);

    Harness {
        source,
        launcher,
        orchestrator,
        install_dir,
        workspace,
        _scratch: scratch,
    }
}

impl Harness {
    /// Same harness, but every command gets exactly one attempt.
    pub fn orchestrator_with_single_attempt(mut self) -> Self {
        self.orchestrator = self.orchestrator.with_retry_attempts(1);
        self
    }
}
