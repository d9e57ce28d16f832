// Application Layer - Use Cases and Business Logic

pub mod backup;
pub mod deploy;
pub mod destination;
pub mod job_service;
pub mod notify;
pub mod plugin;
pub mod resolver;
pub mod resource;
pub mod shutdown;

// Re-exports
pub use backup::{BackupConfig, BackupOutcome, BackupPlan, BackupService};
pub use deploy::{DeployConfig, DeploymentManager};
pub use destination::DestinationResolver;
pub use job_service::JobService;
pub use notify::{Notifier, NotifyConfig, NotifyError, REDACTED_TOKEN};
pub use plugin::PluginService;
pub use resolver::{DependencyResolver, ExternalResolver, PriorityResolver};
pub use resource::{BulkUpdateOutcome, ResourceService};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
