// HTTP Resource Manager - sibling control-plane client
//
// Speaks `GET {host}/api/v1beta1/jobs` with optional `job_name`,
// `project_name` and `resource_destination` filters. Only job identity
// is read out of the response; every other field is ignored.

use std::time::Duration;

use async_trait::async_trait;
use gantry_core::error::{AppError, Entity, Result};
use gantry_core::port::{ExternalJob, JobSpecFilter, ResourceManager, ResourceManagerConfig};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpResourceManager {
    config: ResourceManagerConfig,
    client: reqwest::Client,
}

impl HttpResourceManager {
    /// # Errors
    /// - ExternalResolverFailure if the underlying client cannot be built
    pub fn new(config: ResourceManagerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                AppError::external_resolver_failure(
                    Entity::Job,
                    format!("{}: building http client: {}", config.name, e),
                )
            })?;
        Ok(Self { config, client })
    }

    fn jobs_url(&self) -> String {
        format!("{}/api/v1beta1/jobs", self.config.host.trim_end_matches('/'))
    }
}

#[async_trait]
impl ResourceManager for HttpResourceManager {
    fn config(&self) -> &ResourceManagerConfig {
        &self.config
    }

    async fn get_job_specs(&self, filter: &JobSpecFilter) -> Result<Vec<ExternalJob>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(name) = &filter.job_name {
            query.push(("job_name", name));
        }
        if let Some(project) = &filter.project_name {
            query.push(("project_name", project));
        }
        if let Some(urn) = &filter.resource_destination {
            query.push(("resource_destination", urn));
        }

        let mut request = self.client.get(self.jobs_url()).query(&query);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(manager = %self.config.name, ?filter, "querying sibling control plane");

        let response = request.send().await.map_err(|e| {
            AppError::external_resolver_failure(
                Entity::Job,
                format!("{}: request failed: {}", self.config.name, e),
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external_resolver_failure(
                Entity::Job,
                format!("{}: {} from {}", self.config.name, status, self.config.host),
            ));
        }

        let envelope: JobsEnvelope = response.json().await.map_err(|e| {
            AppError::external_resolver_failure(
                Entity::Job,
                format!("{}: invalid job listing: {}", self.config.name, e),
            )
        })?;

        Ok(envelope
            .jobs
            .into_iter()
            .map(|entry| ExternalJob {
                project_name: entry.project_name,
                namespace_name: entry.namespace_name,
                job_name: entry.job.name,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct JobsEnvelope {
    #[serde(default)]
    jobs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobEntry {
    project_name: String,
    namespace_name: String,
    job: JobBody,
}

#[derive(Debug, Deserialize)]
struct JobBody {
    name: String,
}
