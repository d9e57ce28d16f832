// Backup Coordinator
//
// Snapshots a root resource and the downstream resources the caller
// authorized. Candidates come from the job graph: producers of the
// root URN plus their transitive dependents, walked root-first.
// Driver calls run serially in candidate order; dry-run walks the
// same path but records and persists nothing.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::destination::DestinationResolver;
use crate::application::plugin::PluginService;
use crate::domain::{
    BackupDetail, BackupRequest, BackupSpec, DatastoreName, JobSpec, ResourceUrn,
    CONFIG_IGNORE_DOWNSTREAM,
};
use crate::error::{AppError, Entity, ErrorKind, Result};
use crate::metrics::{labels, names};
use crate::port::datastore::{BackupResourceRequest, DatastoreRegistry};
use crate::port::{BackupStore, IdProvider, JobSpecStore, TimeProvider};

/// Tuning knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Trailing window covered by backup listings.
    pub list_window: Duration,
    /// Sentinel namespace admitting every downstream namespace.
    pub downstream_wildcard: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self { list_window: Duration::days(90), downstream_wildcard: "*".to_string() }
    }
}

/// Dry-run outcome: what would be backed up, what would be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    pub resources: Vec<ResourceUrn>,
    pub ignored: Vec<ResourceUrn>,
}

/// Real-run outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub backup_id: Uuid,
    pub result_urns: Vec<ResourceUrn>,
    pub ignored: Vec<ResourceUrn>,
}

pub struct BackupService {
    job_store: Arc<dyn JobSpecStore>,
    destination_resolver: Arc<DestinationResolver>,
    plugin_service: Arc<PluginService>,
    datastores: Arc<DatastoreRegistry>,
    backup_store: Arc<dyn BackupStore>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    config: BackupConfig,
}

struct Cascade {
    resources: Vec<ResourceUrn>,
    ignored: Vec<ResourceUrn>,
    result_urns: Vec<ResourceUrn>,
    results: BTreeMap<ResourceUrn, BackupDetail>,
    root_datastore: DatastoreName,
}

impl BackupService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_store: Arc<dyn JobSpecStore>,
        destination_resolver: Arc<DestinationResolver>,
        plugin_service: Arc<PluginService>,
        datastores: Arc<DatastoreRegistry>,
        backup_store: Arc<dyn BackupStore>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
        config: BackupConfig,
    ) -> Self {
        Self {
            job_store,
            destination_resolver,
            plugin_service,
            datastores,
            backup_store,
            time_provider,
            id_provider,
            config,
        }
    }

    /// Preview a backup without touching stored state. The datastore
    /// driver is still invoked for every included resource.
    pub async fn dry_run(&self, mut request: BackupRequest) -> Result<BackupPlan> {
        request.dry_run = true;
        let cascade = self.cascade(&request, None).await?;
        Ok(BackupPlan { resources: cascade.resources, ignored: cascade.ignored })
    }

    /// Run a backup and persist its record.
    pub async fn backup(&self, mut request: BackupRequest) -> Result<BackupOutcome> {
        request.dry_run = false;
        let backup_time = self.time_provider.now();
        let cascade = match self.cascade(&request, Some(backup_time)).await {
            Ok(cascade) => cascade,
            Err(error) => {
                counter!(names::BACKUPS_TOTAL, labels::STATUS => "failed").increment(1);
                return Err(error);
            }
        };

        let backup = BackupSpec {
            id: self.id_provider.generate(),
            resource_name: request.resource_name.clone(),
            description: request.description.clone(),
            config: derived_config(&request),
            result: cascade.results,
            created_at: backup_time,
        };
        self.backup_store.save(&request.project, &cascade.root_datastore, &backup).await?;

        counter!(names::BACKUPS_TOTAL, labels::STATUS => "succeeded").increment(1);
        info!(
            backup_id = %backup.id,
            root = %request.resource_name,
            resources = cascade.result_urns.len(),
            ignored = cascade.ignored.len(),
            "backup persisted"
        );
        Ok(BackupOutcome {
            backup_id: backup.id,
            result_urns: cascade.result_urns,
            ignored: cascade.ignored,
        })
    }

    /// Backup records of a (project, datastore) pair within the
    /// configured window.
    pub async fn list_backups(&self, project: &str, datastore: &str) -> Result<Vec<BackupSpec>> {
        self.backup_store.get_all(project, datastore, self.config.list_window).await
    }

    pub async fn get_backup(&self, id: Uuid) -> Result<BackupSpec> {
        self.backup_store.get_by_id(id).await
    }

    /// Candidate jobs, root producers first, then transitive dependents
    /// in stored-edge order.
    async fn collect_candidates(&self, request: &BackupRequest) -> Result<Vec<JobSpec>> {
        let producers =
            self.job_store.get_by_destination(&request.resource_name, false).await?;
        let mut seen: HashSet<_> = producers.iter().map(|j| j.id).collect();
        let mut ordered = producers.clone();
        let mut queue: VecDeque<JobSpec> = producers.into();
        while let Some(job) = queue.pop_front() {
            let Some(destination) = job.destination.clone() else { continue };
            let dependents =
                self.job_store.get_dependent_jobs(&job.project, &job.name, &destination).await?;
            for dependent in dependents {
                if seen.insert(dependent.id) {
                    ordered.push(dependent.clone());
                    queue.push_back(dependent);
                }
            }
        }
        Ok(ordered)
    }

    /// Walks the candidate list, invoking the driver once per distinct
    /// destination. `pinned_time` is the shared timestamp of a real
    /// run; dry runs stamp each call individually.
    async fn cascade(
        &self,
        request: &BackupRequest,
        pinned_time: Option<DateTime<Utc>>,
    ) -> Result<Cascade> {
        let jobs = self.collect_candidates(request).await?;
        let mut resources = Vec::new();
        let mut ignored = Vec::new();
        let mut result_urns = Vec::new();
        let mut results = BTreeMap::new();
        let mut processed: HashSet<ResourceUrn> = HashSet::new();
        let mut root_datastore: Option<DatastoreName> = None;

        for job in &jobs {
            let destination = self.plugin_service.destination(job).await?;
            if !processed.insert(destination.urn.clone()) {
                continue;
            }
            let datastore = self.datastores.get(&destination.datastore)?;
            let is_root = destination.urn == request.resource_name;

            let resource = match self
                .destination_resolver
                .resolve(&request.project, &destination.urn)
                .await
            {
                Ok((resource, _namespace)) => resource,
                Err(error) if error.is_not_found() => {
                    if is_root {
                        return Err(AppError::not_found(
                            Entity::Backup,
                            format!(
                                "root resource {} not found in project {}",
                                request.resource_name, request.project
                            ),
                        ));
                    }
                    debug!(urn = %destination.urn, "no resource entry for destination, skipping");
                    continue;
                }
                Err(error) => return Err(error),
            };

            if is_root {
                root_datastore = Some(destination.datastore.clone());
            } else if !self.authorized(request, &job.namespace) {
                debug!(urn = %resource.urn, namespace = %job.namespace, "downstream not allowed");
                ignored.push(resource.urn);
                continue;
            }

            let backup_time = pinned_time.unwrap_or_else(|| self.time_provider.now());
            let driver_request = BackupResourceRequest {
                resource: resource.clone(),
                backup: request.clone(),
                backup_time,
            };
            match datastore.backup_resource(&driver_request).await {
                Ok(result) => {
                    resources.push(resource.urn.clone());
                    if !request.dry_run {
                        result_urns.push(result.result_urn.clone());
                        results.insert(
                            resource.urn,
                            BackupDetail { result_urn: result.result_urn, spec: result.result_spec },
                        );
                    }
                }
                Err(error) if error.kind() == ErrorKind::UnsupportedResource => {
                    debug!(urn = %resource.urn, "resource kind not backupable, skipping");
                }
                Err(error) => return Err(error),
            }
        }

        match root_datastore {
            Some(root_datastore) => {
                Ok(Cascade { resources, ignored, result_urns, results, root_datastore })
            }
            // No candidate ever produced the root URN: refuse to report
            // an empty successful backup.
            None => Err(AppError::not_found(
                Entity::Backup,
                format!(
                    "no producing job found for root resource {} in project {}",
                    request.resource_name, request.project
                ),
            )),
        }
    }

    fn authorized(&self, request: &BackupRequest, namespace: &str) -> bool {
        request
            .allowed_downstream_namespaces
            .iter()
            .any(|allowed| allowed == &self.config.downstream_wildcard || allowed == namespace)
    }
}

/// Request config plus the derived IgnoreDownstream marker.
fn derived_config(request: &BackupRequest) -> BTreeMap<String, String> {
    let mut config = request.config.clone();
    config.insert(
        CONFIG_IGNORE_DOWNSTREAM.to_string(),
        request.allowed_downstream_namespaces.is_empty().to_string(),
    );
    config
}
