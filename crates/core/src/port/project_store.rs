// Project, Namespace & Secret Store Ports (Interface)

use async_trait::async_trait;

use crate::domain::{NamespaceSpec, ProjectSpec, Secret};
use crate::error::Result;

/// Store interface for projects.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert or update a project by name.
    ///
    /// # Errors
    /// - EmptyConfig if the config map is empty
    async fn save(&self, project: &ProjectSpec) -> Result<()>;

    async fn get_by_name(&self, name: &str) -> Result<ProjectSpec>;

    async fn get_all(&self) -> Result<Vec<ProjectSpec>>;
}

/// Store interface for namespaces within a project.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Insert or update a namespace by (project, name).
    ///
    /// # Errors
    /// - EmptyConfig if the config map is empty
    /// - NotFound if the project does not exist
    async fn save(&self, namespace: &NamespaceSpec) -> Result<()>;

    async fn get_by_name(&self, project: &str, name: &str) -> Result<NamespaceSpec>;

    async fn get_all(&self, project: &str) -> Result<Vec<NamespaceSpec>>;
}

/// Store interface for project secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert or update a secret by (project, name).
    async fn save(&self, project: &str, secret: &Secret) -> Result<()>;

    /// All secrets of a project. Namespace visibility is enforced by
    /// the caller, not the store.
    async fn get_all(&self, project: &str) -> Result<Vec<Secret>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use super::*;
    use crate::error::{AppError, Entity};

    /// In-memory tenant store for unit tests. Backs projects,
    /// namespaces and secrets with one state block.
    #[derive(Default)]
    pub struct InMemoryTenantStore {
        projects: Mutex<Vec<ProjectSpec>>,
        namespaces: Mutex<Vec<NamespaceSpec>>,
        secrets: Mutex<Vec<(String, Secret)>>,
    }

    impl InMemoryTenantStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert_project(&self, project: ProjectSpec) {
            self.projects.lock().unwrap().push(project);
        }

        pub fn insert_namespace(&self, namespace: NamespaceSpec) {
            self.namespaces.lock().unwrap().push(namespace);
        }

        pub fn insert_secret(&self, project: &str, secret: Secret) {
            self.secrets.lock().unwrap().push((project.to_string(), secret));
        }
    }

    #[async_trait]
    impl ProjectStore for InMemoryTenantStore {
        async fn save(&self, project: &ProjectSpec) -> Result<()> {
            if project.config.is_empty() {
                return Err(AppError::empty_config(Entity::Project, project.name.clone()));
            }
            let mut projects = self.projects.lock().unwrap();
            match projects.iter_mut().find(|p| p.name == project.name) {
                Some(existing) => *existing = project.clone(),
                None => projects.push(project.clone()),
            }
            Ok(())
        }

        async fn get_by_name(&self, name: &str) -> Result<ProjectSpec> {
            self.projects
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.name == name)
                .cloned()
                .ok_or_else(|| AppError::not_found(Entity::Project, name.to_string()))
        }

        async fn get_all(&self) -> Result<Vec<ProjectSpec>> {
            Ok(self.projects.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl NamespaceStore for InMemoryTenantStore {
        async fn save(&self, namespace: &NamespaceSpec) -> Result<()> {
            if namespace.config.is_empty() {
                return Err(AppError::empty_config(Entity::Namespace, namespace.name.clone()));
            }
            let mut namespaces = self.namespaces.lock().unwrap();
            match namespaces
                .iter_mut()
                .find(|n| n.project == namespace.project && n.name == namespace.name)
            {
                Some(existing) => *existing = namespace.clone(),
                None => namespaces.push(namespace.clone()),
            }
            Ok(())
        }

        async fn get_by_name(&self, project: &str, name: &str) -> Result<NamespaceSpec> {
            self.namespaces
                .lock()
                .unwrap()
                .iter()
                .find(|n| n.project == project && n.name == name)
                .cloned()
                .ok_or_else(|| {
                    AppError::not_found(Entity::Namespace, format!("{}/{}", project, name))
                })
        }

        async fn get_all(&self, project: &str) -> Result<Vec<NamespaceSpec>> {
            Ok(self
                .namespaces
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.project == project)
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl SecretStore for InMemoryTenantStore {
        async fn save(&self, project: &str, secret: &Secret) -> Result<()> {
            let mut secrets = self.secrets.lock().unwrap();
            match secrets.iter_mut().find(|(p, s)| p == project && s.name == secret.name) {
                Some((_, existing)) => *existing = secret.clone(),
                None => secrets.push((project.to_string(), secret.clone())),
            }
            Ok(())
        }

        async fn get_all(&self, project: &str) -> Result<Vec<Secret>> {
            Ok(self
                .secrets
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == project)
                .map(|(_, s)| s.clone())
                .collect())
        }
    }
}
