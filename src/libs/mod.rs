// The orchestrator components. Each module owns one responsibility; `orchestrator` ties them
// together behind the `Orchestration` interface a host binds to.

// Per-run environment and one-time server configuration.
pub mod bootstrap;
// Cache keys appended to dfcli commands.
pub mod cache_key;
// Optional dfcli features, negotiated per installation and launcher.
pub mod capabilities;
// Loading and validating the YAML configuration and batch files.
pub mod config_loading;
// Resolving server credentials.
pub mod credentials;
// Building, validating and running a single dfcli command.
pub mod executor;
// Provision / configure / execute facade.
pub mod orchestrator;
// Configuration and installation locations.
pub mod paths;
// Checksum-gated download and installation of the dfcli binary.
pub mod provisioner;
pub mod retry;
// Bounded concurrent execution of batches.
pub mod task_runner;
pub mod utilities;
