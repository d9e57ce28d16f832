// Resource & Backup Domain Model
//
// Resources are datastore-managed objects (tables, views, buckets)
// addressed by URN. Backups snapshot a root resource plus the
// downstream resources the caller authorized.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::project::{NamespaceName, ProjectName};

/// Stable resource address, e.g. `bq://project.dataset.table`.
pub type ResourceUrn = String;

/// Datastore family a resource belongs to, e.g. `bigquery`.
pub type DatastoreName = String;

/// Config key recorded on every backup: `"true"` when downstream
/// resources were ignored (no allowed namespaces were given).
pub const CONFIG_IGNORE_DOWNSTREAM: &str = "IgnoreDownstream";

/// Datastore-managed object owned by a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub id: Uuid,
    pub urn: ResourceUrn,
    /// Datastore-specific kind, e.g. `table` or `view`.
    pub kind: String,
    pub datastore: DatastoreName,
    pub project: ProjectName,
    pub namespace: NamespaceName,
    /// Datastore-specific body (schema, partitioning, ...). Opaque to
    /// the control plane.
    pub spec: serde_json::Value,
}

impl ResourceSpec {
    pub fn new(
        id: Uuid,
        urn: impl Into<ResourceUrn>,
        kind: impl Into<String>,
        datastore: impl Into<DatastoreName>,
        project: impl Into<ProjectName>,
        namespace: impl Into<NamespaceName>,
    ) -> Self {
        Self {
            id,
            urn: urn.into(),
            kind: kind.into(),
            datastore: datastore.into(),
            project: project.into(),
            namespace: namespace.into(),
            spec: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Where one backed-up resource landed, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDetail {
    pub result_urn: ResourceUrn,
    /// Driver-specific result body (TTL, location, ...).
    pub spec: serde_json::Value,
}

/// Persisted record of one backup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSpec {
    pub id: Uuid,
    /// Root resource the run was requested for.
    pub resource_name: ResourceUrn,
    pub description: String,
    /// Caller config plus derived entries such as `IgnoreDownstream`.
    pub config: BTreeMap<String, String>,
    /// Source URN -> where its snapshot landed.
    pub result: BTreeMap<ResourceUrn, BackupDetail>,
    pub created_at: DateTime<Utc>,
}

impl BackupSpec {
    /// Whether this run ignored downstream resources entirely.
    pub fn ignored_downstream(&self) -> bool {
        self.config.get(CONFIG_IGNORE_DOWNSTREAM).map(String::as_str) == Some("true")
    }
}

/// User request driving one backup run (or its dry-run preview).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRequest {
    /// Root resource URN to back up.
    pub resource_name: ResourceUrn,
    pub project: ProjectName,
    pub namespace: NamespaceName,
    pub description: String,
    /// Namespaces whose downstream resources may be included. Empty
    /// means downstream is ignored; the configured wildcard admits all.
    pub allowed_downstream_namespaces: Vec<NamespaceName>,
    pub config: BTreeMap<String, String>,
    pub dry_run: bool,
}

impl BackupRequest {
    pub fn new(
        resource_name: impl Into<ResourceUrn>,
        project: impl Into<ProjectName>,
        namespace: impl Into<NamespaceName>,
    ) -> Self {
        Self {
            resource_name: resource_name.into(),
            project: project.into(),
            namespace: namespace.into(),
            description: String::new(),
            allowed_downstream_namespaces: Vec::new(),
            config: BTreeMap::new(),
            dry_run: false,
        }
    }
}
