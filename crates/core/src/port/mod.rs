// Port Layer - Interfaces for external dependencies

pub mod datastore;
pub mod deploy_store;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod notify_transport;
pub mod plugin;
pub mod project_store;
pub mod resource_manager;
pub mod resource_store;
pub mod scheduler_sink;
pub mod time_provider;

// Re-exports
pub use datastore::{
    BackupResourceRequest, BackupResourceResult, Datastore, DatastoreRegistry,
};
pub use deploy_store::DeployRequestStore;
pub use id_provider::{IdProvider, UuidProvider};
pub use job_store::{JobSourceStore, JobSpecStore};
pub use notify_transport::NotifyTransport;
pub use plugin::{
    GeneratedDependencies, GeneratedDestination, JobPlugin, PluginQuery, PluginRegistry,
};
pub use project_store::{NamespaceStore, ProjectStore, SecretStore};
pub use resource_manager::{
    ExternalJob, JobSpecFilter, ResourceManager, ResourceManagerConfig,
};
pub use resource_store::{BackupStore, ResourceStore};
pub use scheduler_sink::SchedulerSink;
pub use time_provider::{SystemTimeProvider, TimeProvider};
