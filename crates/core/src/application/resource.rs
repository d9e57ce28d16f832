// Resource Service
//
// Lifecycle of datastore resources: persist the spec, then have the
// driver materialize it. Bulk updates fan out across resources with
// bounded parallelism; the save-then-driver sequence stays serial
// within each resource.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, warn};

use crate::domain::{ResourceSpec, ResourceUrn};
use crate::error::{AppError, Entity, Result};
use crate::port::datastore::DatastoreRegistry;
use crate::port::ResourceStore;

const DEFAULT_BULK_PARALLELISM: usize = 4;

/// Outcome of a bulk update, split per resource.
#[derive(Debug, Default)]
pub struct BulkUpdateOutcome {
    pub succeeded: Vec<ResourceUrn>,
    pub failed: Vec<(ResourceUrn, AppError)>,
}

pub struct ResourceService {
    resource_store: Arc<dyn ResourceStore>,
    datastores: Arc<DatastoreRegistry>,
    bulk_parallelism: usize,
}

impl ResourceService {
    pub fn new(resource_store: Arc<dyn ResourceStore>, datastores: Arc<DatastoreRegistry>) -> Self {
        Self { resource_store, datastores, bulk_parallelism: DEFAULT_BULK_PARALLELISM }
    }

    pub fn with_bulk_parallelism(mut self, parallelism: usize) -> Self {
        self.bulk_parallelism = parallelism.max(1);
        self
    }

    /// Persist a new resource and have the driver materialize it.
    ///
    /// # Errors
    /// - AlreadyExists if the URN is taken within the project
    pub async fn create(&self, resource: &ResourceSpec) -> Result<()> {
        validate(resource)?;
        let datastore = self.datastores.get(&resource.datastore)?;
        self.resource_store.create(resource).await?;
        datastore.create_resource(resource).await?;
        info!(urn = %resource.urn, project = %resource.project, "resource created");
        Ok(())
    }

    /// Persist an updated spec and have the driver apply it.
    ///
    /// # Errors
    /// - NotFound if the URN does not exist within the project
    pub async fn update(&self, resource: &ResourceSpec) -> Result<()> {
        validate(resource)?;
        let datastore = self.datastores.get(&resource.datastore)?;
        self.resource_store.update(resource).await?;
        datastore.update_resource(resource).await?;
        info!(urn = %resource.urn, project = %resource.project, "resource updated");
        Ok(())
    }

    /// Create-or-update a single resource.
    pub async fn save(&self, resource: &ResourceSpec) -> Result<()> {
        validate(resource)?;
        let datastore = self.datastores.get(&resource.datastore)?;
        let exists =
            match self.resource_store.get_by_urn(&resource.project, &resource.urn).await {
                Ok(_) => true,
                Err(error) if error.is_not_found() => false,
                Err(error) => return Err(error),
            };
        if exists {
            self.resource_store.update(resource).await?;
            datastore.update_resource(resource).await?;
        } else {
            self.resource_store.create(resource).await?;
            datastore.create_resource(resource).await?;
        }
        Ok(())
    }

    /// Save every resource, fanning out with bounded parallelism. One
    /// resource failing never blocks the others; the outcome carries
    /// both halves.
    pub async fn update_all(&self, resources: Vec<ResourceSpec>) -> BulkUpdateOutcome {
        let results: Vec<(ResourceUrn, Result<()>)> = futures::stream::iter(
            resources.into_iter().map(|resource| async move {
                let urn = resource.urn.clone();
                (urn, self.save(&resource).await)
            }),
        )
        .buffer_unordered(self.bulk_parallelism)
        .collect()
        .await;

        let mut outcome = BulkUpdateOutcome::default();
        for (urn, result) in results {
            match result {
                Ok(()) => outcome.succeeded.push(urn),
                Err(error) => {
                    warn!(urn = %urn, error = %error, "resource save failed");
                    outcome.failed.push((urn, error));
                }
            }
        }
        outcome
    }

    /// Fetch by name within the owning namespace.
    pub async fn get(&self, project: &str, namespace: &str, name: &str) -> Result<ResourceSpec> {
        self.resource_store.get_by_name(project, namespace, name).await
    }

    /// Fetch by URN within the project, regardless of namespace.
    pub async fn get_by_urn(&self, project: &str, urn: &str) -> Result<ResourceSpec> {
        self.resource_store.get_by_urn(project, urn).await
    }

    pub async fn list(
        &self,
        project: &str,
        namespace: &str,
        datastore: &str,
    ) -> Result<Vec<ResourceSpec>> {
        self.resource_store.get_all(project, namespace, datastore).await
    }
}

fn validate(resource: &ResourceSpec) -> Result<()> {
    if resource.urn.trim().is_empty() {
        return Err(AppError::invalid_argument(Entity::Resource, "resource urn is empty"));
    }
    if resource.datastore.trim().is_empty() {
        return Err(AppError::invalid_argument(Entity::Resource, "datastore tag is empty"));
    }
    Ok(())
}
