// Job Specification Domain Model
//
// A JobSpec is the declarative description of one scheduled pipeline
// task: when it runs, which plugin executes it, what it reads and
// produces, and who gets told when it misbehaves. Specs are identified
// by (project, name); the UUID is storage identity only.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::dependency::{DependencyType, JobRef};
use crate::domain::event::JobEventType;
use crate::domain::project::{NamespaceName, ProjectName};
use crate::domain::resource::ResourceUrn;

/// Job name, unique within its project (across all namespaces).
pub type JobName = String;

/// Storage identity of a job spec row.
pub type JobId = Uuid;

/// Execution window of a job: when it starts, when (if ever) it stops,
/// and the cron interval between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSchedule {
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Cron expression, passed through to the scheduler untouched.
    pub interval: String,
}

impl JobSchedule {
    pub fn new(start_date: DateTime<Utc>, interval: impl Into<String>) -> Self {
        Self { start_date, end_date: None, interval: interval.into() }
    }
}

/// Data window each run operates on, expressed in scheduler units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobWindow {
    pub size: String,
    pub offset: String,
    pub truncate_to: String,
}

impl Default for JobWindow {
    fn default() -> Self {
        Self { size: "24h".to_string(), offset: "0".to_string(), truncate_to: "d".to_string() }
    }
}

/// Plugin reference plus its (template-bearing) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Plugin name, e.g. `bq2bq`.
    pub name: String,
    pub config: BTreeMap<String, String>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), config: BTreeMap::new() }
    }
}

/// Pre/post processing hook attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSpec {
    pub name: String,
    pub config: BTreeMap<String, String>,
}

/// Declared dependency entry. The key it sits under in the spec map is
/// the job reference; the entry itself only carries an optional tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub dep_type: Option<DependencyType>,
}

/// Routing rule for job events: which event type goes to which channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRule {
    pub on: JobEventType,
    /// Receiver strings, e.g. `slack://#oncall` or `email://team@corp.io`.
    pub channels: Vec<String>,
}

/// Declarative description of one scheduled pipeline task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub name: JobName,
    pub owner: String,
    pub project: ProjectName,
    pub namespace: NamespaceName,
    pub schedule: JobSchedule,
    #[serde(default)]
    pub window: JobWindow,
    pub task: TaskSpec,
    /// Name -> inline content, templated into the plugin run.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
    /// Declared upstreams: key is `name` or `project/name`.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DeclaredDependency>,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
    #[serde(default)]
    pub notify: Vec<NotifyRule>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// URN this job produces, filled by the plugin at submit time.
    #[serde(default)]
    pub destination: Option<ResourceUrn>,
    /// Tombstone marker; a deleted spec keeps its row until the name is
    /// reused within the same namespace.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl JobSpec {
    pub fn new(
        id: JobId,
        name: impl Into<JobName>,
        project: impl Into<ProjectName>,
        namespace: impl Into<NamespaceName>,
        task: TaskSpec,
        schedule: JobSchedule,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            owner: String::new(),
            project: project.into(),
            namespace: namespace.into(),
            schedule,
            window: JobWindow::default(),
            task,
            assets: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            hooks: Vec::new(),
            notify: Vec::new(),
            labels: BTreeMap::new(),
            destination: None,
            deleted_at: None,
        }
    }

    /// Minimal valid spec for tests and fixtures.
    pub fn for_test(
        name: impl Into<JobName>,
        project: impl Into<ProjectName>,
        namespace: impl Into<NamespaceName>,
    ) -> Self {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        Self::new(
            Uuid::new_v4(),
            name,
            project,
            namespace,
            TaskSpec::new("bq2bq"),
            JobSchedule::new(start, "0 2 * * *"),
        )
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Declared dependency keys parsed into refs, in key order.
    pub fn static_dependency_refs(&self) -> Vec<JobRef> {
        self.dependencies.keys().map(|key| JobRef::parse(key)).collect()
    }

    /// Adds a declared dependency under the given key.
    pub fn with_dependency(mut self, key: impl Into<String>) -> Self {
        self.dependencies.insert(key.into(), DeclaredDependency::default());
        self
    }
}

/// One inferred upstream URN recorded for a job, the write portion of
/// dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSource {
    pub job_id: JobId,
    pub project: ProjectName,
    pub resource_urn: ResourceUrn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_dependency_refs_parse_keys() {
        let job = JobSpec::for_test("report", "sales", "core")
            .with_dependency("ingest_orders")
            .with_dependency("warehouse/dim_customers");

        let refs = job.static_dependency_refs();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&JobRef { project: None, name: "ingest_orders".to_string() }));
        assert!(refs.contains(&JobRef {
            project: Some("warehouse".to_string()),
            name: "dim_customers".to_string(),
        }));
    }

    #[test]
    fn test_spec_round_trips_through_json() {
        let mut job = JobSpec::for_test("report", "sales", "core");
        job.task.config.insert("sql_file".to_string(), "report.sql".to_string());
        job.destination = Some("bq://sales.mart.report".to_string());
        job.notify.push(NotifyRule {
            on: JobEventType::Failure,
            channels: vec!["slack://#oncall".to_string()],
        });

        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: JobSpec = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_deleted_marker() {
        let mut job = JobSpec::for_test("report", "sales", "core");
        assert!(!job.is_deleted());
        job.deleted_at = Some(Utc::now());
        assert!(job.is_deleted());
    }
}
