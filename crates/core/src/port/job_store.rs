// Job Spec Store Port (Interface)

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{JobId, JobSource, JobSpec, ResourceUrn};
use crate::error::Result;

/// Store interface for job spec persistence.
///
/// Jobs are addressed by (project, name); names are unique per project
/// across all namespaces. Deletes are soft: reads skip tombstoned rows
/// unless `include_deleted` says otherwise.
#[async_trait]
pub trait JobSpecStore: Send + Sync {
    /// Insert or update a spec under (project, name).
    ///
    /// # Errors
    /// - OwnershipConflict if the name is held by another namespace,
    ///   live or tombstoned
    /// - NotFound if the project or namespace does not exist
    async fn upsert(&self, spec: &JobSpec) -> Result<()>;

    /// Find one spec by (project, name).
    async fn get_by_name(&self, project: &str, name: &str, include_deleted: bool)
        -> Result<JobSpec>;

    /// All specs of a project.
    async fn get_all_by_project(&self, project: &str, include_deleted: bool)
        -> Result<Vec<JobSpec>>;

    /// All specs of one namespace within a project.
    async fn get_all_by_namespace(
        &self,
        project: &str,
        namespace: &str,
        include_deleted: bool,
    ) -> Result<Vec<JobSpec>>;

    /// Specs producing the given resource URN, across projects.
    async fn get_by_destination(
        &self,
        destination: &str,
        include_deleted: bool,
    ) -> Result<Vec<JobSpec>>;

    /// Live specs depending on the given job: inferred dependents (via
    /// recorded source URNs) first, then declared dependents, each in
    /// job-id order, deduplicated.
    async fn get_dependent_jobs(
        &self,
        project: &str,
        job_name: &str,
        destination: &str,
    ) -> Result<Vec<JobSpec>>;

    /// For every job of the project: the live local producers of the
    /// URNs it reads (inferred upstreams).
    async fn get_inferred_dependencies(&self, project: &str)
        -> Result<HashMap<JobId, Vec<JobSpec>>>;

    /// For every job of the project: the live local jobs matching its
    /// declared dependency keys (static upstreams).
    async fn get_static_dependencies(&self, project: &str)
        -> Result<HashMap<JobId, Vec<JobSpec>>>;

    /// Soft-delete a spec and drop its recorded source URNs, atomically.
    async fn delete_by_id(&self, id: JobId) -> Result<()>;
}

/// Store interface for the inferred-upstream URNs recorded per job.
#[async_trait]
pub trait JobSourceStore: Send + Sync {
    /// Replace all recorded URNs of a job in one shot. A duplicate URN
    /// in the input rejects the whole call and leaves prior rows
    /// untouched.
    async fn save(&self, project: &str, job_id: JobId, urns: &[ResourceUrn]) -> Result<()>;

    /// All recorded rows of a project.
    async fn get_by_project(&self, project: &str) -> Result<Vec<JobSource>>;

    /// Drop all recorded rows of a job.
    async fn delete_by_job(&self, job_id: JobId) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::error::{AppError, Entity};

    /// In-memory job store for unit tests. Backs both the spec and the
    /// source trait with the same state so resolution paths can be
    /// exercised without a database.
    #[derive(Default)]
    pub struct InMemoryJobStore {
        state: Mutex<State>,
    }

    #[derive(Default)]
    struct State {
        jobs: Vec<JobSpec>,
        sources: Vec<JobSource>,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_jobs(jobs: Vec<JobSpec>) -> Self {
            let store = Self::default();
            store.state.lock().unwrap().jobs = jobs;
            store
        }

        /// Seeds a spec without going through upsert checks.
        pub fn insert(&self, job: JobSpec) {
            self.state.lock().unwrap().jobs.push(job);
        }

        pub fn recorded_sources(&self, job_id: JobId) -> Vec<ResourceUrn> {
            self.state
                .lock()
                .unwrap()
                .sources
                .iter()
                .filter(|s| s.job_id == job_id)
                .map(|s| s.resource_urn.clone())
                .collect()
        }
    }

    #[async_trait]
    impl JobSpecStore for InMemoryJobStore {
        async fn upsert(&self, spec: &JobSpec) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            match state
                .jobs
                .iter_mut()
                .find(|j| j.project == spec.project && j.name == spec.name)
            {
                Some(existing) if existing.namespace != spec.namespace => {
                    Err(AppError::ownership_conflict(
                        Entity::Job,
                        format!("{} is owned by namespace {}", spec.name, existing.namespace),
                    ))
                }
                Some(existing) => {
                    *existing = spec.clone();
                    existing.deleted_at = None;
                    Ok(())
                }
                None => {
                    state.jobs.push(spec.clone());
                    Ok(())
                }
            }
        }

        async fn get_by_name(
            &self,
            project: &str,
            name: &str,
            include_deleted: bool,
        ) -> Result<JobSpec> {
            self.state
                .lock()
                .unwrap()
                .jobs
                .iter()
                .find(|j| {
                    j.project == project
                        && j.name == name
                        && (include_deleted || !j.is_deleted())
                })
                .cloned()
                .ok_or_else(|| {
                    AppError::not_found(Entity::Job, format!("{}/{}", project, name))
                })
        }

        async fn get_all_by_project(
            &self,
            project: &str,
            include_deleted: bool,
        ) -> Result<Vec<JobSpec>> {
            let mut jobs: Vec<JobSpec> = self
                .state
                .lock()
                .unwrap()
                .jobs
                .iter()
                .filter(|j| j.project == project && (include_deleted || !j.is_deleted()))
                .cloned()
                .collect();
            jobs.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(jobs)
        }

        async fn get_all_by_namespace(
            &self,
            project: &str,
            namespace: &str,
            include_deleted: bool,
        ) -> Result<Vec<JobSpec>> {
            let mut jobs: Vec<JobSpec> = self
                .state
                .lock()
                .unwrap()
                .jobs
                .iter()
                .filter(|j| {
                    j.project == project
                        && j.namespace == namespace
                        && (include_deleted || !j.is_deleted())
                })
                .cloned()
                .collect();
            jobs.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(jobs)
        }

        async fn get_by_destination(
            &self,
            destination: &str,
            include_deleted: bool,
        ) -> Result<Vec<JobSpec>> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .jobs
                .iter()
                .filter(|j| {
                    (include_deleted || !j.is_deleted())
                        && j.destination.as_deref() == Some(destination)
                })
                .cloned()
                .collect())
        }

        async fn get_dependent_jobs(
            &self,
            project: &str,
            job_name: &str,
            destination: &str,
        ) -> Result<Vec<JobSpec>> {
            let state = self.state.lock().unwrap();

            let mut inferred: Vec<JobSpec> = state
                .sources
                .iter()
                .filter(|s| s.resource_urn == destination)
                .filter_map(|s| {
                    state.jobs.iter().find(|j| j.id == s.job_id && !j.is_deleted()).cloned()
                })
                .collect();
            inferred.sort_by_key(|j| j.id);

            let qualified = format!("{}/{}", project, job_name);
            let mut declared: Vec<JobSpec> = state
                .jobs
                .iter()
                .filter(|j| !j.is_deleted())
                .filter(|j| {
                    (j.project == project && j.dependencies.contains_key(job_name))
                        || j.dependencies.contains_key(&qualified)
                })
                .cloned()
                .collect();
            declared.sort_by_key(|j| j.id);

            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for job in inferred.into_iter().chain(declared) {
                if seen.insert(job.id) {
                    out.push(job);
                }
            }
            Ok(out)
        }

        async fn get_inferred_dependencies(
            &self,
            project: &str,
        ) -> Result<HashMap<JobId, Vec<JobSpec>>> {
            let state = self.state.lock().unwrap();
            let mut map: HashMap<JobId, Vec<JobSpec>> = HashMap::new();
            for source in state.sources.iter().filter(|s| s.project == project) {
                for producer in state
                    .jobs
                    .iter()
                    .filter(|j| {
                        !j.is_deleted() && j.destination.as_deref() == Some(&source.resource_urn)
                    })
                {
                    map.entry(source.job_id).or_default().push(producer.clone());
                }
            }
            Ok(map)
        }

        async fn get_static_dependencies(
            &self,
            project: &str,
        ) -> Result<HashMap<JobId, Vec<JobSpec>>> {
            let state = self.state.lock().unwrap();
            let mut map: HashMap<JobId, Vec<JobSpec>> = HashMap::new();
            for job in state.jobs.iter().filter(|j| j.project == project && !j.is_deleted()) {
                for job_ref in job.static_dependency_refs() {
                    let (ref_project, ref_name) = job_ref.qualified(project);
                    if let Some(target) = state.jobs.iter().find(|j| {
                        j.project == ref_project && j.name == ref_name && !j.is_deleted()
                    }) {
                        map.entry(job.id).or_default().push(target.clone());
                    }
                }
            }
            Ok(map)
        }

        async fn delete_by_id(&self, id: JobId) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let job = state
                .jobs
                .iter_mut()
                .find(|j| j.id == id)
                .ok_or_else(|| AppError::not_found(Entity::Job, id.to_string()))?;
            job.deleted_at = Some(Utc::now());
            state.sources.retain(|s| s.job_id != id);
            Ok(())
        }
    }

    #[async_trait]
    impl JobSourceStore for InMemoryJobStore {
        async fn save(&self, project: &str, job_id: JobId, urns: &[ResourceUrn]) -> Result<()> {
            let mut unique = HashSet::new();
            for urn in urns {
                if !unique.insert(urn) {
                    return Err(AppError::invalid_argument(
                        Entity::Job,
                        format!("duplicate source urn {}", urn),
                    ));
                }
            }
            let mut state = self.state.lock().unwrap();
            state.sources.retain(|s| s.job_id != job_id);
            for urn in urns {
                state.sources.push(JobSource {
                    job_id,
                    project: project.to_string(),
                    resource_urn: urn.clone(),
                });
            }
            Ok(())
        }

        async fn get_by_project(&self, project: &str) -> Result<Vec<JobSource>> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .sources
                .iter()
                .filter(|s| s.project == project)
                .cloned()
                .collect())
        }

        async fn delete_by_job(&self, job_id: JobId) -> Result<()> {
            self.state.lock().unwrap().sources.retain(|s| s.job_id != job_id);
            Ok(())
        }
    }
}
