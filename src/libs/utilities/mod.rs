// Small, mostly pure helpers used by the orchestrator components.

// Release URLs, remote fingerprints and downloads.
pub mod assets;
// Installed binary and fingerprint marker handling.
pub mod binary;
// Cooperative cancellation.
pub mod cancel;
// Single-entry extraction from release archives.
pub mod compression;
// Directory-scoped exclusive locks.
pub mod locking;
pub mod path_helpers;
pub mod platform;
// Process launchers.
pub mod process;
pub mod version;
