// External Resolver
//
// Hands refs that local resolution could not satisfy to every
// configured sibling control plane. A manager that errors is logged
// and skipped; one bad sibling must not sink the deployment.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::domain::{ExternalDependency, UnresolvedRef};
use crate::metrics::{labels, names};
use crate::port::resource_manager::{JobSpecFilter, ResourceManager};

pub struct ExternalResolver {
    managers: Vec<Arc<dyn ResourceManager>>,
}

impl ExternalResolver {
    pub fn new(managers: Vec<Arc<dyn ResourceManager>>) -> Self {
        Self { managers }
    }

    /// Queries every manager for every ref. Returns only refs with at
    /// least one hit; misses and manager failures leave the ref out.
    pub async fn resolve(
        &self,
        refs: &[UnresolvedRef],
    ) -> HashMap<UnresolvedRef, Vec<ExternalDependency>> {
        let mut hits: HashMap<UnresolvedRef, Vec<ExternalDependency>> = HashMap::new();
        for unresolved_ref in refs {
            let filter = Self::filter_for(unresolved_ref);
            for manager in &self.managers {
                let config = manager.config();
                match manager.get_job_specs(&filter).await {
                    Ok(jobs) if jobs.is_empty() => {}
                    Ok(jobs) => {
                        debug!(
                            manager = %config.name,
                            unresolved = %unresolved_ref,
                            count = jobs.len(),
                            "external resolver matched"
                        );
                        let entry = hits.entry(unresolved_ref.clone()).or_default();
                        for job in jobs {
                            entry.push(ExternalDependency {
                                host: config.host.clone(),
                                headers: config.headers.clone(),
                                project: job.project_name,
                                namespace: job.namespace_name,
                                job_name: job.job_name,
                            });
                        }
                    }
                    Err(error) => {
                        warn!(
                            manager = %config.name,
                            unresolved = %unresolved_ref,
                            %error,
                            "external resolver query failed, skipping manager"
                        );
                        counter!(
                            names::EXTERNAL_RESOLVER_ERRORS_TOTAL,
                            labels::MANAGER => config.name.clone()
                        )
                        .increment(1);
                    }
                }
            }
        }
        hits
    }

    fn filter_for(unresolved_ref: &UnresolvedRef) -> JobSpecFilter {
        match unresolved_ref {
            UnresolvedRef::Name(job_ref) => JobSpecFilter {
                project_name: job_ref.project.clone(),
                job_name: Some(job_ref.name.clone()),
                resource_destination: None,
            },
            UnresolvedRef::Urn(urn) => JobSpecFilter {
                project_name: None,
                job_name: None,
                resource_destination: Some(urn.clone()),
            },
        }
    }
}
