// Scheduler Sink Port (Interface)

use async_trait::async_trait;

use crate::domain::CompiledJob;
use crate::error::Result;

/// Outbound edge to the scheduler: receives one namespace's compiled
/// jobs. Implementations must be idempotent on (project, job name) so
/// redeploys overwrite rather than duplicate.
#[async_trait]
pub trait SchedulerSink: Send + Sync {
    async fn publish(&self, project: &str, namespace: &str, jobs: &[CompiledJob]) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use super::*;
    use crate::error::{AppError, Entity};

    /// Recorded publish call.
    #[derive(Debug, Clone)]
    pub struct PublishedBatch {
        pub project: String,
        pub namespace: String,
        pub jobs: Vec<CompiledJob>,
    }

    /// Sink capturing every publish; optionally fails for chosen
    /// namespaces.
    #[derive(Default)]
    pub struct RecordingSink {
        published: Mutex<Vec<PublishedBatch>>,
        failing_namespaces: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_for(self, namespace: &str) -> Self {
            self.failing_namespaces.lock().unwrap().push(namespace.to_string());
            self
        }

        pub fn published(&self) -> Vec<PublishedBatch> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SchedulerSink for RecordingSink {
        async fn publish(
            &self,
            project: &str,
            namespace: &str,
            jobs: &[CompiledJob],
        ) -> Result<()> {
            if self.failing_namespaces.lock().unwrap().iter().any(|n| n == namespace) {
                return Err(AppError::internal(
                    Entity::Deployment,
                    format!("sink rejected namespace {}", namespace),
                ));
            }
            self.published.lock().unwrap().push(PublishedBatch {
                project: project.to_string(),
                namespace: namespace.to_string(),
                jobs: jobs.to_vec(),
            });
            Ok(())
        }
    }
}
