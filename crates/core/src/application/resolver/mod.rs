// Dependency Resolution
//
// Turns one project's job specs into per-job resolved upstream edges.
// Write step first: each job's plugin-derived source URNs are
// persisted, so inferred edges and dependent lookups always read the
// freshest picture. Jobs resolve independently; one job's plugin
// failure or dangling ref never aborts its peers.

pub mod external;
pub mod priority;

pub use external::ExternalResolver;
pub use priority::{
    PriorityResolver, MAX_PRIORITY_WEIGHT, MIN_PRIORITY_WEIGHT, PRIORITY_WEIGHT_GAP,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::application::plugin::PluginService;
use crate::domain::{
    JobId, JobSpec, ResolvedDependency, ResolvedJobSpec, ResourceUrn, UnresolvedRef,
};
use crate::error::{AppError, Result};
use crate::port::{JobSourceStore, JobSpecStore};

pub struct DependencyResolver {
    job_store: Arc<dyn JobSpecStore>,
    job_source_store: Arc<dyn JobSourceStore>,
    plugin_service: Arc<PluginService>,
    external_resolver: Arc<ExternalResolver>,
}

impl DependencyResolver {
    pub fn new(
        job_store: Arc<dyn JobSpecStore>,
        job_source_store: Arc<dyn JobSourceStore>,
        plugin_service: Arc<PluginService>,
        external_resolver: Arc<ExternalResolver>,
    ) -> Self {
        Self { job_store, job_source_store, plugin_service, external_resolver }
    }

    /// Resolve every live job of a project.
    pub async fn resolve_project(&self, project: &str) -> Result<Vec<ResolvedJobSpec>> {
        let jobs = self.job_store.get_all_by_project(project, false).await?;
        debug!(project, jobs = jobs.len(), "resolving project");

        let mut plugin_errors = self.refresh_sources(project, &jobs).await?;

        let inferred = self.job_store.get_inferred_dependencies(project).await?;
        let statics = self.job_store.get_static_dependencies(project).await?;

        let mut sources_by_job: HashMap<JobId, Vec<ResourceUrn>> = HashMap::new();
        for source in self.job_source_store.get_by_project(project).await? {
            sources_by_job.entry(source.job_id).or_default().push(source.resource_urn);
        }

        let mut results = Vec::with_capacity(jobs.len());
        let mut pending_external: HashSet<UnresolvedRef> = HashSet::new();
        for job in jobs {
            let mut dependencies: Vec<ResolvedDependency> = Vec::new();
            let mut seen: HashSet<ResolvedDependency> = HashSet::new();
            let mut unresolved: Vec<UnresolvedRef> = Vec::new();

            // Inferred edges: live local producers of the URNs this job
            // reads. Every producer of a URN becomes an upstream.
            let mut matched_urns: HashSet<ResourceUrn> = HashSet::new();
            if let Some(producers) = inferred.get(&job.id) {
                for producer in producers {
                    if let Some(urn) = &producer.destination {
                        matched_urns.insert(urn.clone());
                    }
                    let edge = tag_local(&job, producer);
                    if seen.insert(edge.clone()) {
                        dependencies.push(edge);
                    }
                }
            }
            // Recorded URNs with no live local producer go external.
            for urn in sources_by_job.get(&job.id).into_iter().flatten() {
                if !matched_urns.contains(urn) {
                    unresolved.push(UnresolvedRef::Urn(urn.clone()));
                }
            }

            // Declared edges: each dependency key either matched a live
            // local job or goes external.
            let mut matched_refs: HashSet<(String, String)> = HashSet::new();
            if let Some(targets) = statics.get(&job.id) {
                for target in targets {
                    matched_refs.insert((target.project.clone(), target.name.clone()));
                    let edge = tag_local(&job, target);
                    if seen.insert(edge.clone()) {
                        dependencies.push(edge);
                    }
                }
            }
            for job_ref in job.static_dependency_refs() {
                let qualified = job_ref.qualified(project);
                if !matched_refs.contains(&qualified) {
                    unresolved.push(UnresolvedRef::Name(job_ref));
                }
            }

            pending_external.extend(unresolved.iter().cloned());
            let mut resolved = ResolvedJobSpec { job, dependencies, unresolved, errors: Vec::new() };
            if let Some(error) = plugin_errors.remove(&resolved.job.id) {
                resolved.errors.push(error);
            }
            results.push(resolved);
        }

        // External pass over the union of leftover refs, then seal each
        // job: whatever is still unmatched becomes that job's error.
        let external_refs: Vec<UnresolvedRef> = pending_external.into_iter().collect();
        let hits = self.external_resolver.resolve(&external_refs).await;
        for resolved in &mut results {
            let mut still_unresolved = Vec::new();
            for unresolved_ref in std::mem::take(&mut resolved.unresolved) {
                match hits.get(&unresolved_ref) {
                    Some(externals) => {
                        for external in externals {
                            let edge = ResolvedDependency::External(external.clone());
                            if !resolved.dependencies.contains(&edge) {
                                resolved.dependencies.push(edge);
                            }
                        }
                    }
                    None => still_unresolved.push(unresolved_ref),
                }
            }
            resolved.unresolved = still_unresolved;
            resolved.seal();
        }

        Ok(results)
    }

    /// Write step: refresh each job's recorded source URNs from its
    /// plugin. Failures are collected per job; storage errors abort.
    async fn refresh_sources(
        &self,
        project: &str,
        jobs: &[JobSpec],
    ) -> Result<HashMap<JobId, AppError>> {
        let mut failures = HashMap::new();
        for job in jobs {
            match self.plugin_service.upstream_urns(job).await {
                Ok(urns) => self.job_source_store.save(project, job.id, &urns).await?,
                Err(error) => {
                    warn!(job = %job.name, %error, "source refresh failed, keeping prior rows");
                    failures.insert(job.id, error);
                }
            }
        }
        Ok(failures)
    }
}

/// Tags a live local producer as Intra or Inter relative to the
/// depending job's project.
fn tag_local(job: &JobSpec, producer: &JobSpec) -> ResolvedDependency {
    if producer.project == job.project {
        ResolvedDependency::Intra { job_id: producer.id, job_name: producer.name.clone() }
    } else {
        ResolvedDependency::Inter {
            project: producer.project.clone(),
            job_id: producer.id,
            job_name: producer.name.clone(),
        }
    }
}
