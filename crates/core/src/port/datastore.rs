// Datastore Port (Interface)
//
// One driver per datastore family (warehouse, object store, ...).
// Drivers own the physical side of resources: creating them, updating
// them and snapshotting them for backups.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BackupRequest, ResourceSpec, ResourceUrn};
use crate::error::{AppError, Entity, Result};

/// Input to one backup driver call: the resource to snapshot, the user
/// request driving the run (including dry-run and config), and the
/// timestamp to stamp the snapshot with.
#[derive(Debug, Clone)]
pub struct BackupResourceRequest {
    pub resource: ResourceSpec,
    pub backup: BackupRequest,
    pub backup_time: DateTime<Utc>,
}

/// Where one snapshot landed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackupResourceResult {
    pub result_urn: ResourceUrn,
    /// Driver-specific result body (TTL, location, ...).
    pub result_spec: serde_json::Value,
}

/// Driver interface for one datastore family.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Datastore name this driver serves, e.g. `bigquery`.
    fn name(&self) -> &str;

    /// Materialize a new resource.
    async fn create_resource(&self, resource: &ResourceSpec) -> Result<()>;

    /// Apply an updated spec to an existing resource.
    async fn update_resource(&self, resource: &ResourceSpec) -> Result<()>;

    /// Snapshot one resource.
    ///
    /// # Errors
    /// - UnsupportedResource if this kind cannot be backed up; the
    ///   coordinator skips it and moves on
    async fn backup_resource(&self, request: &BackupResourceRequest)
        -> Result<BackupResourceResult>;
}

/// Registry of datastore drivers keyed by name.
#[derive(Default)]
pub struct DatastoreRegistry {
    datastores: HashMap<String, Arc<dyn Datastore>>,
}

impl DatastoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, datastore: Arc<dyn Datastore>) {
        self.datastores.insert(datastore.name().to_string(), datastore);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Datastore>> {
        self.datastores.get(name).cloned().ok_or_else(|| {
            AppError::invalid_argument(
                Entity::Resource,
                format!("no datastore registered under {}", name),
            )
        })
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use super::*;

    /// Per-URN behavior of the mock driver's backup call.
    #[derive(Debug, Clone)]
    pub enum MockBackupBehavior {
        /// Return the given result URN.
        Succeed(String),
        /// Fail with UnsupportedResource.
        Unsupported,
        /// Fail with an opaque internal error.
        Fail(String),
    }

    /// Scripted datastore driver recording every call.
    pub struct MockDatastore {
        name: String,
        backup_behaviors: Mutex<HashMap<String, MockBackupBehavior>>,
        backup_calls: Mutex<Vec<BackupResourceRequest>>,
        create_calls: Mutex<Vec<ResourceUrn>>,
        update_calls: Mutex<Vec<ResourceUrn>>,
        fail_writes: Mutex<Option<String>>,
    }

    impl MockDatastore {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                backup_behaviors: Mutex::new(HashMap::new()),
                backup_calls: Mutex::new(Vec::new()),
                create_calls: Mutex::new(Vec::new()),
                update_calls: Mutex::new(Vec::new()),
                fail_writes: Mutex::new(None),
            }
        }

        /// Scripts the backup behavior for one resource URN. URNs
        /// without a script succeed with `backup://<urn>`.
        pub fn on_backup(self, urn: &str, behavior: MockBackupBehavior) -> Self {
            self.backup_behaviors.lock().unwrap().insert(urn.to_string(), behavior);
            self
        }

        /// Makes create/update calls fail with the given message.
        pub fn failing_writes(self, message: impl Into<String>) -> Self {
            *self.fail_writes.lock().unwrap() = Some(message.into());
            self
        }

        /// Resource URNs handed to backup_resource, in call order.
        pub fn backed_up_urns(&self) -> Vec<String> {
            self.backup_calls.lock().unwrap().iter().map(|r| r.resource.urn.clone()).collect()
        }

        /// Full recorded backup requests, in call order.
        pub fn backup_calls(&self) -> Vec<BackupResourceRequest> {
            self.backup_calls.lock().unwrap().clone()
        }

        pub fn created_urns(&self) -> Vec<String> {
            self.create_calls.lock().unwrap().clone()
        }

        pub fn updated_urns(&self) -> Vec<String> {
            self.update_calls.lock().unwrap().clone()
        }

        fn write_failure(&self) -> Option<AppError> {
            self.fail_writes
                .lock()
                .unwrap()
                .as_ref()
                .map(|msg| AppError::internal(Entity::Resource, msg.clone()))
        }
    }

    #[async_trait]
    impl Datastore for MockDatastore {
        fn name(&self) -> &str {
            &self.name
        }

        async fn create_resource(&self, resource: &ResourceSpec) -> Result<()> {
            self.create_calls.lock().unwrap().push(resource.urn.clone());
            match self.write_failure() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn update_resource(&self, resource: &ResourceSpec) -> Result<()> {
            self.update_calls.lock().unwrap().push(resource.urn.clone());
            match self.write_failure() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn backup_resource(
            &self,
            request: &BackupResourceRequest,
        ) -> Result<BackupResourceResult> {
            self.backup_calls.lock().unwrap().push(request.clone());
            let behavior = self
                .backup_behaviors
                .lock()
                .unwrap()
                .get(&request.resource.urn)
                .cloned()
                .unwrap_or_else(|| {
                    MockBackupBehavior::Succeed(format!("backup://{}", request.resource.urn))
                });
            match behavior {
                MockBackupBehavior::Succeed(result_urn) => Ok(BackupResourceResult {
                    result_urn,
                    result_spec: serde_json::json!({}),
                }),
                MockBackupBehavior::Unsupported => Err(AppError::unsupported_resource(
                    Entity::Resource,
                    format!("{} cannot be backed up", request.resource.urn),
                )),
                MockBackupBehavior::Fail(message) => {
                    Err(AppError::internal(Entity::Backup, message))
                }
            }
        }
    }
}
