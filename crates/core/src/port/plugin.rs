// Job Plugin Port (Interface)
//
// Plugins are the task-type oracle: given a job spec with its tenant
// config rendered in, they derive where the job writes and which URNs
// it reads. The control plane never parses task configuration itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{DatastoreName, JobSpec, NamespaceSpec, ProjectSpec, ResourceUrn};
use crate::error::{AppError, Entity, Result};

/// Input to every plugin call: the job with task config already
/// rendered, plus the owning tenant pair.
#[derive(Debug, Clone)]
pub struct PluginQuery {
    pub job: JobSpec,
    pub project: ProjectSpec,
    pub namespace: NamespaceSpec,
}

/// Where a job writes, as derived by its plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDestination {
    pub urn: ResourceUrn,
    pub datastore: DatastoreName,
}

/// URNs a job reads, as derived by its plugin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneratedDependencies {
    pub urns: Vec<ResourceUrn>,
}

/// Task-type oracle backing destination and dependency derivation.
#[async_trait]
pub trait JobPlugin: Send + Sync {
    /// Task name this plugin serves, e.g. `bq2bq`.
    fn name(&self) -> &str;

    /// Whether this plugin can derive upstream URNs at all. Plugins
    /// without the capability yield an empty result, never an error.
    fn supports_dependency_resolution(&self) -> bool;

    /// Derive the URN the job writes to.
    async fn generate_destination(&self, query: &PluginQuery) -> Result<GeneratedDestination>;

    /// Derive the URNs the job reads.
    async fn generate_dependencies(&self, query: &PluginQuery) -> Result<GeneratedDependencies>;
}

/// Registry of plugins keyed by task name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn JobPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn JobPlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, task_name: &str) -> Result<Arc<dyn JobPlugin>> {
        self.plugins.get(task_name).cloned().ok_or_else(|| {
            AppError::plugin_failure(
                Entity::Job,
                format!("no plugin registered for task {}", task_name),
            )
        })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use super::*;

    /// Scripted plugin for tests: destinations and dependencies are
    /// looked up by job name; calls are recorded.
    pub struct MockPlugin {
        name: String,
        supports_dependencies: bool,
        destinations: Mutex<HashMap<String, GeneratedDestination>>,
        dependencies: Mutex<HashMap<String, Vec<ResourceUrn>>>,
        failures: Mutex<HashMap<String, String>>,
        destination_calls: Mutex<Vec<String>>,
        dependency_calls: Mutex<Vec<String>>,
    }

    impl MockPlugin {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                supports_dependencies: true,
                destinations: Mutex::new(HashMap::new()),
                dependencies: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                destination_calls: Mutex::new(Vec::new()),
                dependency_calls: Mutex::new(Vec::new()),
            }
        }

        /// Marks the plugin as lacking dependency derivation.
        pub fn without_dependency_support(mut self) -> Self {
            self.supports_dependencies = false;
            self
        }

        /// Scripts the destination returned for a job name.
        pub fn with_destination(
            self,
            job_name: &str,
            urn: impl Into<String>,
            datastore: impl Into<String>,
        ) -> Self {
            self.destinations.lock().unwrap().insert(
                job_name.to_string(),
                GeneratedDestination { urn: urn.into(), datastore: datastore.into() },
            );
            self
        }

        /// Scripts the upstream URNs returned for a job name.
        pub fn with_dependencies(self, job_name: &str, urns: Vec<String>) -> Self {
            self.dependencies.lock().unwrap().insert(job_name.to_string(), urns);
            self
        }

        /// Scripts both calls to fail for a job name.
        pub fn with_failure(self, job_name: &str, message: impl Into<String>) -> Self {
            self.failures.lock().unwrap().insert(job_name.to_string(), message.into());
            self
        }

        pub fn destination_calls(&self) -> Vec<String> {
            self.destination_calls.lock().unwrap().clone()
        }

        pub fn dependency_calls(&self) -> Vec<String> {
            self.dependency_calls.lock().unwrap().clone()
        }

        fn failure_for(&self, job_name: &str) -> Option<AppError> {
            self.failures
                .lock()
                .unwrap()
                .get(job_name)
                .map(|msg| AppError::plugin_failure(Entity::Job, msg.clone()))
        }
    }

    #[async_trait]
    impl JobPlugin for MockPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn supports_dependency_resolution(&self) -> bool {
            self.supports_dependencies
        }

        async fn generate_destination(&self, query: &PluginQuery) -> Result<GeneratedDestination> {
            self.destination_calls.lock().unwrap().push(query.job.name.clone());
            if let Some(err) = self.failure_for(&query.job.name) {
                return Err(err);
            }
            self.destinations.lock().unwrap().get(&query.job.name).cloned().ok_or_else(|| {
                AppError::plugin_failure(
                    Entity::Job,
                    format!("no scripted destination for {}", query.job.name),
                )
            })
        }

        async fn generate_dependencies(
            &self,
            query: &PluginQuery,
        ) -> Result<GeneratedDependencies> {
            self.dependency_calls.lock().unwrap().push(query.job.name.clone());
            if let Some(err) = self.failure_for(&query.job.name) {
                return Err(err);
            }
            let urns = self
                .dependencies
                .lock()
                .unwrap()
                .get(&query.job.name)
                .cloned()
                .unwrap_or_default();
            Ok(GeneratedDependencies { urns })
        }
    }
}
