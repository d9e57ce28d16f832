// Job Service
//
// Write path for job specs: validate, fill in the plugin-derived
// destination, persist, and queue a deployment of the project so the
// scheduler picks up the change.

use std::sync::Arc;

use tracing::info;

use crate::application::plugin::PluginService;
use crate::domain::{Deployment, JobSpec, Receiver};
use crate::error::{AppError, Entity, Result};
use crate::port::{DeployRequestStore, JobSpecStore};

pub struct JobService {
    job_store: Arc<dyn JobSpecStore>,
    plugin_service: Arc<PluginService>,
    deploy_store: Arc<dyn DeployRequestStore>,
}

impl JobService {
    pub fn new(
        job_store: Arc<dyn JobSpecStore>,
        plugin_service: Arc<PluginService>,
        deploy_store: Arc<dyn DeployRequestStore>,
    ) -> Self {
        Self { job_store, plugin_service, deploy_store }
    }

    /// Validate and persist a spec, then queue a deployment for its
    /// project.
    ///
    /// # Errors
    /// - InvalidArgument on malformed fields or notify channels
    /// - PluginFailure when destination generation fails
    /// - OwnershipConflict when the name is held by another namespace
    pub async fn submit(&self, mut spec: JobSpec) -> Result<Deployment> {
        validate(&spec)?;
        let destination = self.plugin_service.destination(&spec).await?;
        spec.destination = Some(destination.urn);
        self.job_store.upsert(&spec).await?;
        let deployment = self.deploy_store.push(&spec.project).await?;
        info!(
            job = %spec.name,
            project = %spec.project,
            deployment = %deployment.id,
            "job spec submitted"
        );
        Ok(deployment)
    }

    pub async fn get(&self, project: &str, name: &str) -> Result<JobSpec> {
        self.job_store.get_by_name(project, name, false).await
    }

    pub async fn list(&self, project: &str) -> Result<Vec<JobSpec>> {
        self.job_store.get_all_by_project(project, false).await
    }

    pub async fn list_by_namespace(&self, project: &str, namespace: &str) -> Result<Vec<JobSpec>> {
        self.job_store.get_all_by_namespace(project, namespace, false).await
    }

    /// Soft-delete a spec. Refused while live dependents exist, unless
    /// `force` is set; the recorded source URNs go with it.
    pub async fn delete(&self, project: &str, name: &str, force: bool) -> Result<()> {
        let job = self.job_store.get_by_name(project, name, false).await?;
        let destination = job.destination.clone().unwrap_or_default();
        let dependents: Vec<JobSpec> = self
            .job_store
            .get_dependent_jobs(project, name, &destination)
            .await?
            .into_iter()
            .filter(|dependent| dependent.id != job.id)
            .collect();
        if !dependents.is_empty() && !force {
            let names: Vec<String> = dependents
                .iter()
                .map(|dependent| format!("{}/{}", dependent.project, dependent.name))
                .collect();
            return Err(AppError::invalid_argument(
                Entity::Job,
                format!("{} is depended on by {}", name, names.join(", ")),
            ));
        }
        self.job_store.delete_by_id(job.id).await?;
        info!(job = %name, project = %project, force, "job spec deleted");
        Ok(())
    }
}

fn validate(spec: &JobSpec) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(AppError::invalid_argument(Entity::Job, "job name is empty"));
    }
    if spec.task.name.trim().is_empty() {
        return Err(AppError::invalid_argument(Entity::Job, "task name is empty"));
    }
    if spec.schedule.interval.trim().is_empty() {
        return Err(AppError::invalid_argument(Entity::Job, "schedule interval is empty"));
    }
    for rule in &spec.notify {
        for channel in &rule.channels {
            Receiver::parse(channel)?;
        }
    }
    Ok(())
}
