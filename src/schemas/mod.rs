// Data structures (schemas) shared across the orchestrator.

// Orchestrator configuration file and batch task files.
pub mod config;
// Command lines, execution requests and results.
pub mod execution;
// Server profiles, credentials, secrets and proxy settings.
pub mod servers;
