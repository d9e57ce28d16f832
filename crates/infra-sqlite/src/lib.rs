// Gantry Infrastructure - SQLite Adapter
// Implements the core store ports on one embedded database: job specs
// and their recorded sources, resources and backups, tenants, and the
// durable deploy queue.

mod connection;
mod deploy_store;
mod job_store;
mod migration;
mod project_store;
mod resource_store;
mod support;

pub use connection::create_pool;
pub use deploy_store::SqliteDeployStore;
pub use job_store::SqliteJobStore;
pub use migration::run_migrations;
pub use project_store::SqliteTenantStore;
pub use resource_store::SqliteResourceStore;

// Note: sqlx::Error conversion is handled by helper functions in
// support due to Rust's orphan rules (cannot implement
// From<sqlx::Error> for AppError here).
