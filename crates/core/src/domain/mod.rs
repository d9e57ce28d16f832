// Domain Models

pub mod dependency;
pub mod deployment;
pub mod event;
pub mod job;
pub mod project;
pub mod resource;
pub mod template;

pub use dependency::{
    CompiledJob, DependencyType, ExternalDependency, JobRef, ResolvedDependency, ResolvedJobSpec,
    UnresolvedRef,
};
pub use deployment::{DeployStatus, Deployment};
pub use event::{BatchMessage, JobEvent, JobEventType, Receiver, Route};
pub use job::{
    DeclaredDependency, HookSpec, JobId, JobName, JobSchedule, JobSource, JobSpec, JobWindow,
    NotifyRule, TaskSpec,
};
pub use project::{NamespaceName, NamespaceSpec, ProjectName, ProjectSpec, Secret};
pub use resource::{
    BackupDetail, BackupRequest, BackupSpec, DatastoreName, ResourceSpec, ResourceUrn,
    CONFIG_IGNORE_DOWNSTREAM,
};
pub use template::TemplateContext;
