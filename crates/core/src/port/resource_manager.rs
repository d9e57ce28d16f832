// Resource Manager Port (Interface)
//
// A resource manager is a sibling control plane queried during
// dependency resolution. Only job identity comes back over the wire;
// run state is the scheduler's business, not ours.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Connection descriptor for one sibling control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceManagerConfig {
    pub name: String,
    /// Base URL, e.g. `https://optimum.corp.io`.
    pub host: String,
    /// Extra headers sent with every request (auth and the like).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Filter for the sibling's job listing; unset fields are omitted from
/// the query string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobSpecFilter {
    pub project_name: Option<String>,
    pub job_name: Option<String>,
    pub resource_destination: Option<String>,
}

/// Job identity returned by a sibling control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalJob {
    pub project_name: String,
    pub namespace_name: String,
    pub job_name: String,
}

/// Client interface to one sibling control plane.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    fn config(&self) -> &ResourceManagerConfig;

    /// List jobs matching the filter.
    ///
    /// # Errors
    /// - ExternalResolverFailure on transport or decode problems; the
    ///   caller tolerates per-manager failure
    async fn get_job_specs(&self, filter: &JobSpecFilter) -> Result<Vec<ExternalJob>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use super::*;
    use crate::error::{AppError, Entity};

    /// Static manager serving a fixed job list, filtered in memory.
    pub struct StaticResourceManager {
        config: ResourceManagerConfig,
        jobs: Vec<(ExternalJob, Option<String>)>,
        calls: Mutex<Vec<JobSpecFilter>>,
    }

    impl StaticResourceManager {
        pub fn new(name: &str, host: &str) -> Self {
            Self {
                config: ResourceManagerConfig {
                    name: name.to_string(),
                    host: host.to_string(),
                    headers: BTreeMap::new(),
                },
                jobs: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Adds a job the manager will return, with the destination URN
        /// it matches on (if any).
        pub fn with_job(
            mut self,
            project: &str,
            namespace: &str,
            job_name: &str,
            destination: Option<&str>,
        ) -> Self {
            self.jobs.push((
                ExternalJob {
                    project_name: project.to_string(),
                    namespace_name: namespace.to_string(),
                    job_name: job_name.to_string(),
                },
                destination.map(str::to_string),
            ));
            self
        }

        pub fn calls(&self) -> Vec<JobSpecFilter> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResourceManager for StaticResourceManager {
        fn config(&self) -> &ResourceManagerConfig {
            &self.config
        }

        async fn get_job_specs(&self, filter: &JobSpecFilter) -> Result<Vec<ExternalJob>> {
            self.calls.lock().unwrap().push(filter.clone());
            Ok(self
                .jobs
                .iter()
                .filter(|(job, destination)| {
                    filter.project_name.as_ref().map_or(true, |p| p == &job.project_name)
                        && filter.job_name.as_ref().map_or(true, |n| n == &job.job_name)
                        && filter
                            .resource_destination
                            .as_ref()
                            .map_or(true, |u| Some(u) == destination.as_ref())
                })
                .map(|(job, _)| job.clone())
                .collect())
        }
    }

    /// Manager whose every call fails, for fault-tolerance tests.
    pub struct FailingResourceManager {
        config: ResourceManagerConfig,
    }

    impl FailingResourceManager {
        pub fn new(name: &str) -> Self {
            Self {
                config: ResourceManagerConfig {
                    name: name.to_string(),
                    host: format!("https://{}.invalid", name),
                    headers: BTreeMap::new(),
                },
            }
        }
    }

    #[async_trait]
    impl ResourceManager for FailingResourceManager {
        fn config(&self) -> &ResourceManagerConfig {
            &self.config
        }

        async fn get_job_specs(&self, _filter: &JobSpecFilter) -> Result<Vec<ExternalJob>> {
            Err(AppError::external_resolver_failure(
                Entity::Job,
                format!("{} is unreachable", self.config.name),
            ))
        }
    }
}
