// Deployment Manager
//
// Durable deploy queue plus the worker pool draining it. A deployment
// recompiles one project: resolve dependencies, assign priorities,
// group the compiled jobs per namespace and publish each group to the
// scheduler sink. The store's claim guard keeps one project on one
// worker at a time; across projects the pool runs concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::resolver::{DependencyResolver, PriorityResolver, MIN_PRIORITY_WEIGHT};
use crate::application::shutdown::ShutdownToken;
use crate::domain::{CompiledJob, Deployment, NamespaceName};
use crate::error::{AppError, Entity, Result};
use crate::metrics::{labels, names};
use crate::port::{DeployRequestStore, SchedulerSink, TimeProvider};

#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Workers draining the queue; also the cross-project concurrency.
    pub num_workers: usize,
    /// Wall-clock bound for one whole deployment.
    pub worker_timeout: Duration,
    /// Bound for each inner step (resolve, each publish).
    pub run_timeout: Duration,
    /// Idle wait between claim attempts.
    pub poll_interval: Duration,
    /// Concurrent per-namespace publishes within one deployment.
    pub namespace_parallelism: usize,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            worker_timeout: Duration::from_secs(600),
            run_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_millis(500),
            namespace_parallelism: 4,
        }
    }
}

pub struct DeploymentManager {
    deploy_store: Arc<dyn DeployRequestStore>,
    resolver: Arc<DependencyResolver>,
    priorities: PriorityResolver,
    sink: Arc<dyn SchedulerSink>,
    time_provider: Arc<dyn TimeProvider>,
    config: DeployConfig,
}

impl DeploymentManager {
    pub fn new(
        deploy_store: Arc<dyn DeployRequestStore>,
        resolver: Arc<DependencyResolver>,
        sink: Arc<dyn SchedulerSink>,
        time_provider: Arc<dyn TimeProvider>,
        config: DeployConfig,
    ) -> Self {
        Self {
            deploy_store,
            resolver,
            priorities: PriorityResolver::new(),
            sink,
            time_provider,
            config,
        }
    }

    /// Queue a deployment of the project, superseding one still queued.
    /// The request is durable; a worker picks it up asynchronously.
    pub async fn enqueue(&self, project: &str) -> Result<Deployment> {
        let deployment = self.deploy_store.push(project).await?;
        info!(project, deployment = %deployment.id, "deployment queued");
        Ok(deployment)
    }

    pub async fn status(&self, id: Uuid) -> Result<Deployment> {
        self.deploy_store.get_by_id(id).await
    }

    /// Return orphaned in-progress requests to the queue. Called once
    /// at startup, before the workers spawn.
    pub async fn recover_stale(&self) -> Result<u64> {
        let stale_after = chrono::Duration::milliseconds(self.config.worker_timeout.as_millis() as i64);
        let cutoff = self.time_provider.now() - stale_after;
        let moved = self.deploy_store.requeue_stale(cutoff).await?;
        if moved > 0 {
            warn!(moved, "requeued stale in-progress deployments");
        }
        Ok(moved)
    }

    /// Spawn the worker pool. Handles finish after a shutdown signal,
    /// once any in-flight deployment has run to completion.
    pub fn spawn_workers(self: &Arc<Self>, shutdown: &ShutdownToken) -> Vec<JoinHandle<()>> {
        (0..self.config.num_workers.max(1))
            .map(|worker_id| {
                let manager = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { manager.worker_loop(worker_id, shutdown).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: ShutdownToken) {
        info!(worker_id, "deploy worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.deploy_store.claim_next().await {
                Ok(Some(deployment)) => self.run_claimed(worker_id, deployment).await,
                Ok(None) => {
                    tokio::select! {
                        _ = sleep(self.config.poll_interval) => {}
                        _ = shutdown.wait() => break,
                    }
                }
                Err(claim_error) => {
                    error!(worker_id, error = %claim_error, "claim failed");
                    tokio::select! {
                        _ = sleep(self.config.poll_interval) => {}
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        info!(worker_id, "deploy worker stopped");
    }

    /// Run one claimed request to a terminal status. Never returns an
    /// error: failures land on the deployment row and the log.
    async fn run_claimed(&self, worker_id: usize, deployment: Deployment) {
        let started = std::time::Instant::now();
        info!(
            worker_id,
            project = %deployment.project,
            deployment = %deployment.id,
            "deployment started"
        );

        let outcome = match timeout(
            self.config.worker_timeout,
            self.process(&deployment.project),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::timeout(
                Entity::Deployment,
                format!("deployment exceeded {}ms", self.config.worker_timeout.as_millis()),
            )),
        };
        let elapsed = started.elapsed().as_secs_f64();
        histogram!(names::DEPLOY_DURATION_SECONDS).record(elapsed);

        match outcome {
            Ok(published) => {
                if let Err(mark_error) = self.deploy_store.mark_succeeded(deployment.id).await {
                    error!(deployment = %deployment.id, error = %mark_error, "mark failed");
                }
                counter!(
                    names::DEPLOYMENTS_TOTAL,
                    labels::STATUS => "succeeded",
                    labels::PROJECT => deployment.project.clone()
                )
                .increment(1);
                info!(
                    worker_id,
                    project = %deployment.project,
                    deployment = %deployment.id,
                    jobs = published,
                    elapsed_s = elapsed,
                    "deployment succeeded"
                );
            }
            Err(deploy_error) => {
                if let Err(mark_error) = self.deploy_store.mark_failed(deployment.id).await {
                    error!(deployment = %deployment.id, error = %mark_error, "mark failed");
                }
                counter!(
                    names::DEPLOYMENTS_TOTAL,
                    labels::STATUS => "failed",
                    labels::PROJECT => deployment.project.clone()
                )
                .increment(1);
                warn!(
                    worker_id,
                    project = %deployment.project,
                    deployment = %deployment.id,
                    error = %deploy_error,
                    "deployment failed"
                );
            }
        }
    }

    /// Compile and publish one project. Returns the number of jobs
    /// handed to the sink.
    async fn process(&self, project: &str) -> Result<usize> {
        let resolved = timeout(self.config.run_timeout, self.resolver.resolve_project(project))
            .await
            .map_err(|_| {
                AppError::timeout(Entity::Deployment, "dependency resolution timed out")
            })??;

        for spec in &resolved {
            for resolve_error in &spec.errors {
                warn!(
                    project,
                    job = %spec.job.name,
                    error = %resolve_error,
                    "job carries a resolution error"
                );
            }
        }

        let priorities = self.priorities.resolve(&resolved);
        let mut groups: BTreeMap<NamespaceName, Vec<CompiledJob>> = BTreeMap::new();
        for spec in resolved {
            let priority =
                priorities.get(&spec.job.id).copied().unwrap_or(MIN_PRIORITY_WEIGHT);
            let namespace = spec.job.namespace.clone();
            groups.entry(namespace).or_default().push(CompiledJob {
                job: spec.job,
                priority,
                dependencies: spec.dependencies,
            });
        }
        let published: usize = groups.values().map(Vec::len).sum();

        let publishes: Vec<Result<()>> = futures::stream::iter(groups.into_iter().map(
            |(namespace, jobs)| async move {
                timeout(self.config.run_timeout, self.sink.publish(project, &namespace, &jobs))
                    .await
                    .map_err(|_| {
                        AppError::timeout(
                            Entity::Deployment,
                            format!("publish to namespace {} timed out", namespace),
                        )
                    })?
            },
        ))
        .buffer_unordered(self.config.namespace_parallelism.max(1))
        .collect()
        .await;

        for publish_result in publishes {
            publish_result?;
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::plugin::PluginService;
    use crate::application::resolver::ExternalResolver;
    use crate::application::shutdown::shutdown_channel;
    use crate::domain::{DeployStatus, JobSpec, NamespaceSpec, ProjectSpec, ResolvedDependency};
    use crate::port::deploy_store::mocks::InMemoryDeployStore;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::plugin::mocks::MockPlugin;
    use crate::port::plugin::PluginRegistry;
    use crate::port::project_store::mocks::InMemoryTenantStore;
    use crate::port::scheduler_sink::mocks::RecordingSink;
    use crate::port::SystemTimeProvider;

    fn test_config() -> DeployConfig {
        DeployConfig {
            num_workers: 1,
            worker_timeout: Duration::from_secs(5),
            run_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            namespace_parallelism: 2,
        }
    }

    struct Harness {
        deploy_store: Arc<InMemoryDeployStore>,
        sink: Arc<RecordingSink>,
        manager: Arc<DeploymentManager>,
    }

    /// Two jobs in "sales": `ingest` (namespace ingest-ns) producing a
    /// URN that `report` (namespace report-ns) reads.
    fn harness(sink: RecordingSink, config: DeployConfig) -> Harness {
        let job_store = Arc::new(InMemoryJobStore::new());
        let mut ingest = JobSpec::for_test("ingest", "sales", "ingest-ns");
        ingest.destination = Some("bq://sales.raw.orders".to_string());
        let mut report = JobSpec::for_test("report", "sales", "report-ns");
        report.destination = Some("bq://sales.mart.report".to_string());
        job_store.insert(ingest);
        job_store.insert(report);

        let tenant = Arc::new(InMemoryTenantStore::new());
        tenant.insert_project(ProjectSpec::new(
            Uuid::new_v4(),
            "sales",
            BTreeMap::from([("k".to_string(), "v".to_string())]),
        ));
        for namespace in ["ingest-ns", "report-ns"] {
            tenant.insert_namespace(NamespaceSpec::new(
                Uuid::new_v4(),
                "sales",
                namespace,
                BTreeMap::from([("k".to_string(), "v".to_string())]),
            ));
        }

        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(
            MockPlugin::new("bq2bq")
                .with_dependencies("report", vec!["bq://sales.raw.orders".to_string()]),
        ));
        let plugin_service = Arc::new(PluginService::new(
            Arc::new(plugins),
            tenant.clone(),
            tenant.clone(),
            tenant,
        ));
        let resolver = Arc::new(DependencyResolver::new(
            job_store.clone(),
            job_store.clone(),
            plugin_service,
            Arc::new(ExternalResolver::new(Vec::new())),
        ));

        let deploy_store = Arc::new(InMemoryDeployStore::new());
        let sink = Arc::new(sink);
        let manager = Arc::new(DeploymentManager::new(
            deploy_store.clone(),
            resolver,
            sink.clone(),
            Arc::new(SystemTimeProvider),
            config,
        ));
        Harness { deploy_store, sink, manager }
    }

    async fn wait_terminal(manager: &DeploymentManager, id: Uuid) -> Deployment {
        for _ in 0..500 {
            let deployment = manager.status(id).await.unwrap();
            if deployment.status.is_terminal() {
                return deployment;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("deployment {} never reached a terminal status", id);
    }

    #[tokio::test]
    async fn test_worker_compiles_and_publishes_namespace_groups() {
        let h = harness(RecordingSink::new(), test_config());
        let (sender, token) = shutdown_channel();
        let handles = h.manager.spawn_workers(&token);

        let deployment = h.manager.enqueue("sales").await.unwrap();
        let finished = wait_terminal(&h.manager, deployment.id).await;
        assert_eq!(finished.status, DeployStatus::Succeeded);

        let published = h.sink.published();
        assert_eq!(published.len(), 2);
        assert!(published
            .iter()
            .all(|batch| batch.project == "sales" && batch.jobs.len() == 1));

        let report_batch =
            published.iter().find(|batch| batch.namespace == "report-ns").unwrap();
        let report = &report_batch.jobs[0];
        assert!(report
            .dependencies
            .iter()
            .any(|d| matches!(d, ResolvedDependency::Intra { job_name, .. } if job_name == "ingest")));

        let ingest_batch =
            published.iter().find(|batch| batch.namespace == "ingest-ns").unwrap();
        assert!(ingest_batch.jobs[0].priority > report.priority);

        sender.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sink_failure_marks_deployment_failed() {
        let h = harness(RecordingSink::new().failing_for("report-ns"), test_config());
        let (sender, token) = shutdown_channel();
        let handles = h.manager.spawn_workers(&token);

        let deployment = h.manager.enqueue("sales").await.unwrap();
        let finished = wait_terminal(&h.manager, deployment.id).await;
        assert_eq!(finished.status, DeployStatus::Failed);

        sender.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    struct StallingSink;

    #[async_trait]
    impl SchedulerSink for StallingSink {
        async fn publish(&self, _: &str, _: &str, _: &[CompiledJob]) -> Result<()> {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stalled_publish_times_out_and_fails() {
        let job_store = Arc::new(InMemoryJobStore::new());
        let mut ingest = JobSpec::for_test("ingest", "sales", "ingest-ns");
        ingest.destination = Some("bq://sales.raw.orders".to_string());
        job_store.insert(ingest);

        let tenant = Arc::new(InMemoryTenantStore::new());
        tenant.insert_project(ProjectSpec::new(
            Uuid::new_v4(),
            "sales",
            BTreeMap::from([("k".to_string(), "v".to_string())]),
        ));
        tenant.insert_namespace(NamespaceSpec::new(
            Uuid::new_v4(),
            "sales",
            "ingest-ns",
            BTreeMap::from([("k".to_string(), "v".to_string())]),
        ));
        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(MockPlugin::new("bq2bq")));
        let plugin_service = Arc::new(PluginService::new(
            Arc::new(plugins),
            tenant.clone(),
            tenant.clone(),
            tenant,
        ));
        let resolver = Arc::new(DependencyResolver::new(
            job_store.clone(),
            job_store,
            plugin_service,
            Arc::new(ExternalResolver::new(Vec::new())),
        ));

        let deploy_store = Arc::new(InMemoryDeployStore::new());
        let manager = Arc::new(DeploymentManager::new(
            deploy_store,
            resolver,
            Arc::new(StallingSink),
            Arc::new(SystemTimeProvider),
            DeployConfig {
                run_timeout: Duration::from_millis(50),
                worker_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(10),
                num_workers: 1,
                namespace_parallelism: 2,
            },
        ));
        let (sender, token) = shutdown_channel();
        let handles = manager.spawn_workers(&token);

        let deployment = manager.enqueue("sales").await.unwrap();
        let finished = wait_terminal(&manager, deployment.id).await;
        assert_eq!(finished.status, DeployStatus::Failed);

        sender.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_recover_stale_requeues_orphans() {
        let h = harness(RecordingSink::new(), test_config());
        h.deploy_store.push("sales").await.unwrap();
        let claimed = h.deploy_store.claim_next().await.unwrap().unwrap();
        sleep(Duration::from_millis(5)).await;

        // Zero worker timeout: anything claimed before "now" is stale.
        let manager = DeploymentManager::new(
            h.deploy_store.clone(),
            h.manager_resolver(),
            h.sink.clone(),
            Arc::new(SystemTimeProvider),
            DeployConfig { worker_timeout: Duration::ZERO, ..test_config() },
        );
        let moved = manager.recover_stale().await.unwrap();
        assert_eq!(moved, 1);
        assert_eq!(
            h.deploy_store.get_by_id(claimed.id).await.unwrap().status,
            DeployStatus::Queued
        );
    }

    impl Harness {
        fn manager_resolver(&self) -> Arc<DependencyResolver> {
            // A fresh resolver over empty stores; recover_stale never
            // touches it.
            let job_store = Arc::new(InMemoryJobStore::new());
            let tenant = Arc::new(InMemoryTenantStore::new());
            let mut plugins = PluginRegistry::new();
            plugins.register(Arc::new(MockPlugin::new("bq2bq")));
            let plugin_service = Arc::new(PluginService::new(
                Arc::new(plugins),
                tenant.clone(),
                tenant.clone(),
                tenant,
            ));
            Arc::new(DependencyResolver::new(
                job_store.clone(),
                job_store,
                plugin_service,
                Arc::new(ExternalResolver::new(Vec::new())),
            ))
        }
    }
}
