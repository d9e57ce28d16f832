// Dependency Domain Model
//
// Jobs depend on each other two ways: explicitly (a declared map entry on
// the job spec) and inferred (the job reads a resource URN some other job
// produces). Resolution turns both into tagged variants that carry enough
// payload to schedule the edge without chasing pointers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobId, JobName, JobSpec};
use crate::domain::project::{NamespaceName, ProjectName};
use crate::domain::resource::ResourceUrn;
use crate::error::{AppError, Entity};

/// Tag on a declared dependency entry. Most specs omit it and let
/// resolution decide; `external` forces sibling-control-plane lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Intra,
    Inter,
    External,
}

/// Reference to a job by name, optionally qualified with a project.
/// Keys containing `/` always parse as `project/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRef {
    pub project: Option<ProjectName>,
    pub name: JobName,
}

impl JobRef {
    pub fn parse(key: &str) -> Self {
        match key.split_once('/') {
            Some((project, name)) => Self {
                project: Some(project.to_string()),
                name: name.to_string(),
            },
            None => Self { project: None, name: key.to_string() },
        }
    }

    /// Fully-qualified `(project, name)` pair, defaulting the project to
    /// the referencing job's own.
    pub fn qualified(&self, default_project: &str) -> (ProjectName, JobName) {
        let project = self.project.clone().unwrap_or_else(|| default_project.to_string());
        (project, self.name.clone())
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{}/{}", project, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Upstream edge owned by a sibling control plane. Carries everything a
/// scheduler sensor needs to poll the remote run state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalDependency {
    pub host: String,
    pub headers: BTreeMap<String, String>,
    pub project: ProjectName,
    pub namespace: NamespaceName,
    pub job_name: JobName,
}

/// Fully resolved upstream edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResolvedDependency {
    /// Upstream job in the same project.
    Intra { job_id: JobId, job_name: JobName },
    /// Upstream job in another project on this control plane.
    Inter { project: ProjectName, job_id: JobId, job_name: JobName },
    /// Upstream job on a sibling control plane.
    External(ExternalDependency),
}

/// Reference that local resolution could not satisfy; handed to the
/// external resolver before being reported as an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnresolvedRef {
    /// Declared dependency key with no live local match.
    Name(JobRef),
    /// Inferred upstream URN with no live local producer.
    Urn(ResourceUrn),
}

impl fmt::Display for UnresolvedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedRef::Name(job_ref) => write!(f, "{}", job_ref),
            UnresolvedRef::Urn(urn) => write!(f, "{}", urn),
        }
    }
}

/// One job's resolution outcome. Peers resolve independently; a job with
/// leftover unresolved refs or a plugin failure still carries whatever
/// edges did resolve.
#[derive(Debug)]
pub struct ResolvedJobSpec {
    pub job: JobSpec,
    pub dependencies: Vec<ResolvedDependency>,
    /// Refs still unmatched after the external pass.
    pub unresolved: Vec<UnresolvedRef>,
    /// Per-job failures collected during resolution (plugin errors,
    /// leftover unresolved refs).
    pub errors: Vec<AppError>,
}

impl ResolvedJobSpec {
    pub fn new(job: JobSpec) -> Self {
        Self { job, dependencies: Vec::new(), unresolved: Vec::new(), errors: Vec::new() }
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty() && self.errors.is_empty()
    }

    /// Converts leftover unresolved refs into errors on this job.
    pub fn seal(&mut self) {
        for unresolved in &self.unresolved {
            self.errors.push(AppError::unresolved_dependency(
                Entity::Job,
                format!("job {} depends on unknown upstream {}", self.job.name, unresolved),
            ));
        }
    }
}

/// Compiled artifact handed to the scheduler sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledJob {
    pub job: JobSpec,
    pub priority: i32,
    pub dependencies: Vec<ResolvedDependency>,
}
