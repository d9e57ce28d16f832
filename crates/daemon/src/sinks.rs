// Outbound Edges - logging implementations
//
// The real scheduler upload and chat transport live outside this
// control plane. The daemon ships logging stand-ins so deployments and
// notification batches stay observable end to end without either
// external system attached.

use async_trait::async_trait;
use gantry_core::domain::{BatchMessage, CompiledJob, Route};
use gantry_core::error::Result;
use gantry_core::port::{NotifyTransport, SchedulerSink};
use tracing::info;

/// Scheduler sink that logs each compiled job. Logging is idempotent
/// per (project, job name) in the only sense that matters here: a
/// redeploy simply logs the newer compilation.
pub struct LogSchedulerSink;

#[async_trait]
impl SchedulerSink for LogSchedulerSink {
    async fn publish(&self, project: &str, namespace: &str, jobs: &[CompiledJob]) -> Result<()> {
        for compiled in jobs {
            info!(
                project,
                namespace,
                job = %compiled.job.name,
                priority = compiled.priority,
                dependencies = compiled.dependencies.len(),
                "compiled job published"
            );
        }
        Ok(())
    }
}

/// Notify transport that logs each batch instead of delivering it.
pub struct LogNotifyTransport;

#[async_trait]
impl NotifyTransport for LogNotifyTransport {
    async fn send(&self, route: &Route, message: &BatchMessage) -> Result<()> {
        info!(
            receiver = %route.receiver,
            blocks = message.blocks.len(),
            "notification batch"
        );
        for block in &message.blocks {
            info!(receiver = %route.receiver, "{}", block);
        }
        Ok(())
    }
}
