// Gantry Core - Domain Logic & Ports
//
// This crate contains:
// - Domain models (JobSpec, ResourceSpec, BackupSpec, Deployment, events)
// - Ports (traits) describing the stores, plugins, datastores and sinks
//   the application services depend on
// - Application services (resolution, priority, backup, deploy, notify)
//
// NO infrastructure dependencies allowed here. Adapters live in the
// infra crates and are wired together by the daemon.

pub mod application;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod port;

pub use error::{AppError, Entity, ErrorKind, Result};

/// Crate version, stamped into logs at daemon startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
