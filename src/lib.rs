//! # dfcli-orchestrator
//!
//! Provisions the `dfcli` command-line tool, prepares an isolated environment for each build
//! run (home directory, proxy, encryption key, server configuration) and executes dfcli
//! commands, singly with retries or as a bounded concurrent batch.
//!
//! The entry point for hosts is [`libs::orchestrator::Orchestration`], implemented by
//! [`libs::orchestrator::Orchestrator`].

pub mod logger;

pub mod error;
pub mod libs;
pub mod schemas;

pub use error::{Error, Result};
