// Destination Resolver
//
// Maps a destination URN back to the resource that owns it and the
// namespace that owns the resource. NotFound is recoverable for
// callers sweeping a collection (the backup cascade skips the entry)
// and fatal for callers after a single required target.

use std::sync::Arc;

use crate::domain::{NamespaceSpec, ResourceSpec};
use crate::error::Result;
use crate::port::{NamespaceStore, ResourceStore};

pub struct DestinationResolver {
    resource_store: Arc<dyn ResourceStore>,
    namespace_store: Arc<dyn NamespaceStore>,
}

impl DestinationResolver {
    pub fn new(
        resource_store: Arc<dyn ResourceStore>,
        namespace_store: Arc<dyn NamespaceStore>,
    ) -> Self {
        Self { resource_store, namespace_store }
    }

    /// Owning (resource, namespace) pair of a destination URN.
    pub async fn resolve(&self, project: &str, urn: &str) -> Result<(ResourceSpec, NamespaceSpec)> {
        let resource = self.resource_store.get_by_urn(project, urn).await?;
        let namespace = self.namespace_store.get_by_name(project, &resource.namespace).await?;
        Ok((resource, namespace))
    }
}
