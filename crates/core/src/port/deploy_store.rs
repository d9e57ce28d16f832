// Deploy Request Store Port (Interface)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::Deployment;
use crate::error::Result;

/// Durable queue of deployment requests.
///
/// Two invariants the store must uphold:
/// - push supersedes any still-queued request for the same project, so
///   at most one undrained request per project exists
/// - claim_next never hands out a project that already has a request
///   in progress
#[async_trait]
pub trait DeployRequestStore: Send + Sync {
    /// Enqueue a request for the project, superseding queued ones.
    async fn push(&self, project: &str) -> Result<Deployment>;

    /// Atomically claim the oldest eligible queued request, marking it
    /// in progress. Returns None when nothing is eligible.
    async fn claim_next(&self) -> Result<Option<Deployment>>;

    /// Move an in-progress request to SUCCEEDED.
    async fn mark_succeeded(&self, id: Uuid) -> Result<()>;

    /// Move an in-progress request to FAILED.
    async fn mark_failed(&self, id: Uuid) -> Result<()>;

    async fn get_by_id(&self, id: Uuid) -> Result<Deployment>;

    /// Requeue in-progress requests untouched since the cutoff; used at
    /// startup to recover work lost to a crash. Returns how many moved.
    async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::DeployStatus;
    use crate::error::{AppError, Entity};

    /// In-memory deploy queue honoring the supersede and
    /// one-in-progress-per-project rules.
    #[derive(Default)]
    pub struct InMemoryDeployStore {
        requests: Mutex<Vec<Deployment>>,
    }

    impl InMemoryDeployStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn all(&self) -> Vec<Deployment> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeployRequestStore for InMemoryDeployStore {
        async fn push(&self, project: &str) -> Result<Deployment> {
            let mut requests = self.requests.lock().unwrap();
            let now = Utc::now();
            for request in requests.iter_mut() {
                if request.project == project && request.status == DeployStatus::Queued {
                    request.status = DeployStatus::Superseded;
                    request.updated_at = now;
                }
            }
            let deployment = Deployment {
                id: Uuid::new_v4(),
                project: project.to_string(),
                status: DeployStatus::Queued,
                created_at: now,
                updated_at: now,
            };
            requests.push(deployment.clone());
            Ok(deployment)
        }

        async fn claim_next(&self) -> Result<Option<Deployment>> {
            let mut requests = self.requests.lock().unwrap();
            let busy: Vec<String> = requests
                .iter()
                .filter(|r| r.status == DeployStatus::InProgress)
                .map(|r| r.project.clone())
                .collect();
            let next = requests
                .iter_mut()
                .filter(|r| r.status == DeployStatus::Queued)
                .filter(|r| !busy.contains(&r.project))
                .min_by_key(|r| (r.created_at, r.id));
            Ok(next.map(|request| {
                request.status = DeployStatus::InProgress;
                request.updated_at = Utc::now();
                request.clone()
            }))
        }

        async fn mark_succeeded(&self, id: Uuid) -> Result<()> {
            self.transition(id, DeployStatus::Succeeded)
        }

        async fn mark_failed(&self, id: Uuid) -> Result<()> {
            self.transition(id, DeployStatus::Failed)
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Deployment> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| AppError::not_found(Entity::Deployment, id.to_string()))
        }

        async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
            let mut requests = self.requests.lock().unwrap();
            let mut moved = 0;
            for request in requests.iter_mut() {
                if request.status == DeployStatus::InProgress && request.updated_at < cutoff {
                    request.status = DeployStatus::Queued;
                    request.updated_at = Utc::now();
                    moved += 1;
                }
            }
            Ok(moved)
        }
    }

    impl InMemoryDeployStore {
        fn transition(&self, id: Uuid, status: DeployStatus) -> Result<()> {
            let mut requests = self.requests.lock().unwrap();
            let request = requests
                .iter_mut()
                .find(|r| r.id == id && r.status == DeployStatus::InProgress)
                .ok_or_else(|| AppError::not_found(Entity::Deployment, id.to_string()))?;
            request.status = status;
            request.updated_at = Utc::now();
            Ok(())
        }
    }
}
