// Resource & Backup Store Ports (Interface)

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::domain::{BackupSpec, ResourceSpec};
use crate::error::Result;

/// Store interface for resource persistence.
///
/// Resources are addressed by (project, URN); the URN doubles as the
/// name, scoped to a namespace for ownership.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Insert a new resource.
    ///
    /// # Errors
    /// - AlreadyExists if the URN is taken within the project
    async fn create(&self, resource: &ResourceSpec) -> Result<()>;

    /// Update an existing resource in place.
    ///
    /// # Errors
    /// - NotFound if no such URN exists within the project
    async fn update(&self, resource: &ResourceSpec) -> Result<()>;

    /// Find one resource by (project, URN).
    async fn get_by_urn(&self, project: &str, urn: &str) -> Result<ResourceSpec>;

    /// Find one resource by name within its owning namespace.
    async fn get_by_name(&self, project: &str, namespace: &str, name: &str)
        -> Result<ResourceSpec>;

    /// All resources of one (project, namespace, datastore) slice.
    async fn get_all(
        &self,
        project: &str,
        namespace: &str,
        datastore: &str,
    ) -> Result<Vec<ResourceSpec>>;
}

/// Store interface for backup records, keyed by (project, datastore).
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn save(&self, project: &str, datastore: &str, backup: &BackupSpec) -> Result<()>;

    async fn get_by_id(&self, id: Uuid) -> Result<BackupSpec>;

    /// Records created within the trailing window, newest first.
    async fn get_all(
        &self,
        project: &str,
        datastore: &str,
        window: Duration,
    ) -> Result<Vec<BackupSpec>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::error::{AppError, Entity};

    /// In-memory resource + backup store for unit tests.
    #[derive(Default)]
    pub struct InMemoryResourceStore {
        resources: Mutex<Vec<ResourceSpec>>,
        backups: Mutex<Vec<(String, String, BackupSpec)>>,
    }

    impl InMemoryResourceStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_resources(resources: Vec<ResourceSpec>) -> Self {
            let store = Self::default();
            *store.resources.lock().unwrap() = resources;
            store
        }

        /// Seeds a resource without create checks.
        pub fn insert(&self, resource: ResourceSpec) {
            self.resources.lock().unwrap().push(resource);
        }

        pub fn saved_backups(&self) -> Vec<BackupSpec> {
            self.backups.lock().unwrap().iter().map(|(_, _, b)| b.clone()).collect()
        }
    }

    #[async_trait]
    impl ResourceStore for InMemoryResourceStore {
        async fn create(&self, resource: &ResourceSpec) -> Result<()> {
            let mut resources = self.resources.lock().unwrap();
            if resources.iter().any(|r| r.project == resource.project && r.urn == resource.urn) {
                return Err(AppError::already_exists(Entity::Resource, resource.urn.clone()));
            }
            resources.push(resource.clone());
            Ok(())
        }

        async fn update(&self, resource: &ResourceSpec) -> Result<()> {
            let mut resources = self.resources.lock().unwrap();
            match resources
                .iter_mut()
                .find(|r| r.project == resource.project && r.urn == resource.urn)
            {
                Some(existing) => {
                    *existing = resource.clone();
                    Ok(())
                }
                None => Err(AppError::not_found(Entity::Resource, resource.urn.clone())),
            }
        }

        async fn get_by_urn(&self, project: &str, urn: &str) -> Result<ResourceSpec> {
            self.resources
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.project == project && r.urn == urn)
                .cloned()
                .ok_or_else(|| AppError::not_found(Entity::Resource, urn.to_string()))
        }

        async fn get_by_name(
            &self,
            project: &str,
            namespace: &str,
            name: &str,
        ) -> Result<ResourceSpec> {
            self.resources
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.project == project && r.namespace == namespace && r.urn == name)
                .cloned()
                .ok_or_else(|| AppError::not_found(Entity::Resource, name.to_string()))
        }

        async fn get_all(
            &self,
            project: &str,
            namespace: &str,
            datastore: &str,
        ) -> Result<Vec<ResourceSpec>> {
            Ok(self
                .resources
                .lock()
                .unwrap()
                .iter()
                .filter(|r| {
                    r.project == project && r.namespace == namespace && r.datastore == datastore
                })
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl BackupStore for InMemoryResourceStore {
        async fn save(&self, project: &str, datastore: &str, backup: &BackupSpec) -> Result<()> {
            self.backups.lock().unwrap().push((
                project.to_string(),
                datastore.to_string(),
                backup.clone(),
            ));
            Ok(())
        }

        async fn get_by_id(&self, id: Uuid) -> Result<BackupSpec> {
            self.backups
                .lock()
                .unwrap()
                .iter()
                .find(|(_, _, b)| b.id == id)
                .map(|(_, _, b)| b.clone())
                .ok_or_else(|| AppError::not_found(Entity::Backup, id.to_string()))
        }

        async fn get_all(
            &self,
            project: &str,
            datastore: &str,
            window: Duration,
        ) -> Result<Vec<BackupSpec>> {
            let cutoff = Utc::now() - window;
            let mut out: Vec<BackupSpec> = self
                .backups
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, d, b)| p == project && d == datastore && b.created_at >= cutoff)
                .map(|(_, _, b)| b.clone())
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(out)
        }
    }
}
