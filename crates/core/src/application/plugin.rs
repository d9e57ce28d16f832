// Plugin Service - Task-Type Oracle
//
// Front door to the plugin registry. Assembles the tenant context for a
// job, renders `{{.proj.*}}` / `{{.secret.*}}` references inside the
// task config, and dispatches to the plugin owning the task type.

use std::sync::Arc;

use crate::domain::{JobSpec, TemplateContext};
use crate::error::Result;
use crate::port::plugin::{GeneratedDestination, PluginQuery, PluginRegistry};
use crate::port::{NamespaceStore, ProjectStore, SecretStore};

pub struct PluginService {
    registry: Arc<PluginRegistry>,
    project_store: Arc<dyn ProjectStore>,
    namespace_store: Arc<dyn NamespaceStore>,
    secret_store: Arc<dyn SecretStore>,
}

impl PluginService {
    pub fn new(
        registry: Arc<PluginRegistry>,
        project_store: Arc<dyn ProjectStore>,
        namespace_store: Arc<dyn NamespaceStore>,
        secret_store: Arc<dyn SecretStore>,
    ) -> Self {
        Self { registry, project_store, namespace_store, secret_store }
    }

    /// Derive the destination URN and datastore for a job.
    pub async fn destination(&self, job: &JobSpec) -> Result<GeneratedDestination> {
        let plugin = self.registry.get(&job.task.name)?;
        let query = self.build_query(job).await?;
        plugin.generate_destination(&query).await
    }

    /// Derive the upstream URNs a job reads. Plugins without dependency
    /// support yield an empty list, never an error.
    pub async fn upstream_urns(&self, job: &JobSpec) -> Result<Vec<String>> {
        let plugin = self.registry.get(&job.task.name)?;
        if !plugin.supports_dependency_resolution() {
            return Ok(Vec::new());
        }
        let query = self.build_query(job).await?;
        Ok(plugin.generate_dependencies(&query).await?.urns)
    }

    async fn build_query(&self, job: &JobSpec) -> Result<PluginQuery> {
        let project = self.project_store.get_by_name(&job.project).await?;
        let namespace = self.namespace_store.get_by_name(&job.project, &job.namespace).await?;
        let secrets = self.secret_store.get_all(&job.project).await?;

        let context = TemplateContext::for_tenant(&project, &namespace, &secrets)?;
        let mut job = job.clone();
        job.task.config = context.render_map(&job.task.config);

        Ok(PluginQuery { job, project, namespace })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use uuid::Uuid;

    use super::*;
    use crate::domain::{NamespaceSpec, ProjectSpec, Secret};
    use crate::error::ErrorKind;
    use crate::port::plugin::mocks::MockPlugin;
    use crate::port::project_store::mocks::InMemoryTenantStore;

    fn tenant_store() -> Arc<InMemoryTenantStore> {
        let store = Arc::new(InMemoryTenantStore::new());
        store.insert_project(ProjectSpec::new(
            Uuid::new_v4(),
            "sales",
            [("dataset".to_string(), "mart".to_string())].into_iter().collect(),
        ));
        store.insert_namespace(NamespaceSpec::new(
            Uuid::new_v4(),
            "sales",
            "core",
            [("owner".to_string(), "core-team".to_string())].into_iter().collect(),
        ));
        store.insert_secret("sales", Secret::from_plaintext("wh_token", "t0k", None));
        store
    }

    fn service(plugin: MockPlugin) -> PluginService {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(plugin));
        let store = tenant_store();
        PluginService::new(Arc::new(registry), store.clone(), store.clone(), store)
    }

    #[tokio::test]
    async fn test_destination_renders_task_config() {
        let plugin = Arc::new(
            MockPlugin::new("bq2bq").with_destination("report", "bq://sales.mart.report", "bigquery"),
        );
        let mut registry = PluginRegistry::new();
        registry.register(plugin.clone());
        let store = tenant_store();
        let service =
            PluginService::new(Arc::new(registry), store.clone(), store.clone(), store);

        let mut job = JobSpec::for_test("report", "sales", "core");
        job.task.config = BTreeMap::from([
            ("dataset".to_string(), "{{.proj.dataset}}".to_string()),
            ("token".to_string(), "{{.secret.wh_token}}".to_string()),
        ]);

        let destination = service.destination(&job).await.unwrap();
        assert_eq!(destination.urn, "bq://sales.mart.report");
        assert_eq!(destination.datastore, "bigquery");
        // Rendering happened before the plugin saw the config.
        assert_eq!(plugin.destination_calls(), vec!["report".to_string()]);
    }

    #[tokio::test]
    async fn test_upstream_urns_without_capability_is_empty() {
        let service = service(MockPlugin::new("bq2bq").without_dependency_support());
        let job = JobSpec::for_test("report", "sales", "core");

        let urns = service.upstream_urns(&job).await.unwrap();
        assert!(urns.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_task_is_plugin_failure() {
        let service = service(MockPlugin::new("bq2bq"));
        let mut job = JobSpec::for_test("report", "sales", "core");
        job.task.name = "spark".to_string();

        let err = service.destination(&job).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginFailure);
    }

    #[tokio::test]
    async fn test_upstream_urns_pass_through() {
        let service = service(
            MockPlugin::new("bq2bq")
                .with_dependencies("report", vec!["bq://sales.raw.orders".to_string()]),
        );
        let job = JobSpec::for_test("report", "sales", "core");

        let urns = service.upstream_urns(&job).await.unwrap();
        assert_eq!(urns, vec!["bq://sales.raw.orders".to_string()]);
    }
}
