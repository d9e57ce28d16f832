// Central Error Type for the Application

use std::fmt;

use thiserror::Error;

/// Entity a failure is scoped to, surfaced to callers alongside the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Job,
    Resource,
    Backup,
    Project,
    Namespace,
    Secret,
    Deployment,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Job => "job",
            Entity::Resource => "resource",
            Entity::Backup => "backup",
            Entity::Project => "project",
            Entity::Namespace => "namespace",
            Entity::Secret => "secret",
            Entity::Deployment => "deployment",
        };
        write!(f, "{}", name)
    }
}

/// Classification of a failure, independent of the entity it is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    OwnershipConflict,
    UnresolvedDependency,
    UnsupportedResource,
    PluginFailure,
    ExternalResolverFailure,
    Timeout,
    Canceled,
    EmptyConfig,
    Internal,
}

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{entity} not found: {message}")]
    NotFound { entity: Entity, message: String },

    #[error("{entity} already exists: {message}")]
    AlreadyExists { entity: Entity, message: String },

    #[error("invalid argument for {entity}: {message}")]
    InvalidArgument { entity: Entity, message: String },

    #[error("{entity} ownership conflict: {message}")]
    OwnershipConflict { entity: Entity, message: String },

    #[error("unresolved dependency on {entity}: {message}")]
    UnresolvedDependency { entity: Entity, message: String },

    #[error("unsupported resource for {entity}: {message}")]
    UnsupportedResource { entity: Entity, message: String },

    #[error("plugin failure for {entity}: {message}")]
    PluginFailure { entity: Entity, message: String },

    #[error("external resolver failure for {entity}: {message}")]
    ExternalResolverFailure { entity: Entity, message: String },

    #[error("{entity} operation timed out: {message}")]
    Timeout { entity: Entity, message: String },

    #[error("{entity} operation canceled: {message}")]
    Canceled { entity: Entity, message: String },

    #[error("empty config for {entity}: {message}")]
    EmptyConfig { entity: Entity, message: String },

    #[error("internal error on {entity}: {message}")]
    Internal { entity: Entity, message: String },
}

impl AppError {
    pub fn not_found(entity: Entity, message: impl Into<String>) -> Self {
        AppError::NotFound { entity, message: message.into() }
    }

    pub fn already_exists(entity: Entity, message: impl Into<String>) -> Self {
        AppError::AlreadyExists { entity, message: message.into() }
    }

    pub fn invalid_argument(entity: Entity, message: impl Into<String>) -> Self {
        AppError::InvalidArgument { entity, message: message.into() }
    }

    pub fn ownership_conflict(entity: Entity, message: impl Into<String>) -> Self {
        AppError::OwnershipConflict { entity, message: message.into() }
    }

    pub fn unresolved_dependency(entity: Entity, message: impl Into<String>) -> Self {
        AppError::UnresolvedDependency { entity, message: message.into() }
    }

    pub fn unsupported_resource(entity: Entity, message: impl Into<String>) -> Self {
        AppError::UnsupportedResource { entity, message: message.into() }
    }

    pub fn plugin_failure(entity: Entity, message: impl Into<String>) -> Self {
        AppError::PluginFailure { entity, message: message.into() }
    }

    pub fn external_resolver_failure(entity: Entity, message: impl Into<String>) -> Self {
        AppError::ExternalResolverFailure { entity, message: message.into() }
    }

    pub fn timeout(entity: Entity, message: impl Into<String>) -> Self {
        AppError::Timeout { entity, message: message.into() }
    }

    pub fn canceled(entity: Entity, message: impl Into<String>) -> Self {
        AppError::Canceled { entity, message: message.into() }
    }

    pub fn empty_config(entity: Entity, message: impl Into<String>) -> Self {
        AppError::EmptyConfig { entity, message: message.into() }
    }

    pub fn internal(entity: Entity, message: impl Into<String>) -> Self {
        AppError::Internal { entity, message: message.into() }
    }

    /// Kind of the failure, for branching without matching every variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            AppError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            AppError::OwnershipConflict { .. } => ErrorKind::OwnershipConflict,
            AppError::UnresolvedDependency { .. } => ErrorKind::UnresolvedDependency,
            AppError::UnsupportedResource { .. } => ErrorKind::UnsupportedResource,
            AppError::PluginFailure { .. } => ErrorKind::PluginFailure,
            AppError::ExternalResolverFailure { .. } => ErrorKind::ExternalResolverFailure,
            AppError::Timeout { .. } => ErrorKind::Timeout,
            AppError::Canceled { .. } => ErrorKind::Canceled,
            AppError::EmptyConfig { .. } => ErrorKind::EmptyConfig,
            AppError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Entity the failure is scoped to.
    pub fn entity(&self) -> Entity {
        match self {
            AppError::NotFound { entity, .. }
            | AppError::AlreadyExists { entity, .. }
            | AppError::InvalidArgument { entity, .. }
            | AppError::OwnershipConflict { entity, .. }
            | AppError::UnresolvedDependency { entity, .. }
            | AppError::UnsupportedResource { entity, .. }
            | AppError::PluginFailure { entity, .. }
            | AppError::ExternalResolverFailure { entity, .. }
            | AppError::Timeout { entity, .. }
            | AppError::Canceled { entity, .. }
            | AppError::EmptyConfig { entity, .. }
            | AppError::Internal { entity, .. } => *entity,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite
// by mapping onto the matching kind and entity.
