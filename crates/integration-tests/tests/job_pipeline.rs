//! Job Pipeline Integration Tests
//!
//! Drives the write path over real SQLite: specs go in through
//! JobService, deploy workers drain the durable queue, and compiled
//! jobs come out of the scheduler sink. No store mocks; only the
//! plugin, the sink and the clock are substituted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gantry_core::application::resolver::{MAX_PRIORITY_WEIGHT, PRIORITY_WEIGHT_GAP};
use gantry_core::application::{
    shutdown_channel, DependencyResolver, DeployConfig, DeploymentManager, ExternalResolver,
    JobService, PluginService,
};
use gantry_core::domain::{
    DeployStatus, Deployment, JobSpec, NamespaceSpec, ProjectSpec, ResolvedDependency,
};
use gantry_core::error::ErrorKind;
use gantry_core::port::plugin::mocks::MockPlugin;
use gantry_core::port::plugin::PluginRegistry;
use gantry_core::port::scheduler_sink::mocks::RecordingSink;
use gantry_core::port::{
    NamespaceStore, ProjectStore, SystemTimeProvider, TimeProvider, UuidProvider,
};
use gantry_infra_sqlite::{
    create_pool, run_migrations, SqliteDeployStore, SqliteJobStore, SqliteTenantStore,
};
use uuid::Uuid;

struct Stack {
    job_store: Arc<SqliteJobStore>,
    deploy_store: Arc<SqliteDeployStore>,
    plugin_service: Arc<PluginService>,
    service: JobService,
}

/// Real stores on one database, seeded with project "sales" and the
/// given namespaces.
async fn stack(db: &str, plugin: MockPlugin, namespaces: &[&str]) -> Stack {
    let pool = create_pool(db).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let tenant = Arc::new(SqliteTenantStore::new(pool.clone()));
    let config = BTreeMap::from([("environment".to_string(), "test".to_string())]);
    ProjectStore::save(
        tenant.as_ref(),
        &ProjectSpec::new(Uuid::new_v4(), "sales", config.clone()),
    )
    .await
    .unwrap();
    for namespace in namespaces {
        NamespaceStore::save(
            tenant.as_ref(),
            &NamespaceSpec::new(Uuid::new_v4(), "sales", *namespace, config.clone()),
        )
        .await
        .unwrap();
    }

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let job_store = Arc::new(SqliteJobStore::new(pool.clone(), time_provider.clone()));
    let deploy_store = Arc::new(SqliteDeployStore::new(
        pool,
        time_provider,
        Arc::new(UuidProvider),
    ));

    let mut plugins = PluginRegistry::new();
    plugins.register(Arc::new(plugin));
    let plugin_service = Arc::new(PluginService::new(
        Arc::new(plugins),
        tenant.clone(),
        tenant.clone(),
        tenant,
    ));

    let service = JobService::new(job_store.clone(), plugin_service.clone(), deploy_store.clone());
    Stack { job_store, deploy_store, plugin_service, service }
}

fn resolver(stack: &Stack) -> Arc<DependencyResolver> {
    Arc::new(DependencyResolver::new(
        stack.job_store.clone(),
        stack.job_store.clone(),
        stack.plugin_service.clone(),
        Arc::new(ExternalResolver::new(Vec::new())),
    ))
}

async fn wait_terminal(manager: &DeploymentManager, id: Uuid) -> Deployment {
    for _ in 0..1000 {
        let deployment = manager.status(id).await.unwrap();
        if deployment.status.is_terminal() {
            return deployment;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deployment {} never reached a terminal status", id);
}

#[tokio::test]
async fn test_submit_compile_publish_end_to_end() {
    let db_path = "/tmp/gantry_test_job_pipeline.db";
    let _ = std::fs::remove_file(db_path);

    let plugin = MockPlugin::new("bq2bq")
        .with_destination("ingest", "bq://sales.raw.orders", "bigquery")
        .with_destination("report", "bq://sales.mart.report", "bigquery")
        .with_dependencies("report", vec!["bq://sales.raw.orders".to_string()]);
    let stack = stack(db_path, plugin, &["ingest-ns", "report-ns"]).await;

    // Both submits land before any worker runs, so the first queued
    // request is superseded by the second.
    let first = stack
        .service
        .submit(JobSpec::for_test("ingest", "sales", "ingest-ns"))
        .await
        .unwrap();
    let second = stack
        .service
        .submit(JobSpec::for_test("report", "sales", "report-ns"))
        .await
        .unwrap();

    let sink = Arc::new(RecordingSink::new());
    let manager = Arc::new(DeploymentManager::new(
        stack.deploy_store.clone(),
        resolver(&stack),
        sink.clone(),
        Arc::new(SystemTimeProvider),
        DeployConfig { poll_interval: Duration::from_millis(10), ..DeployConfig::default() },
    ));
    let (sender, token) = shutdown_channel();
    let handles = manager.spawn_workers(&token);

    let finished = wait_terminal(&manager, second.id).await;
    assert_eq!(finished.status, DeployStatus::Succeeded);
    assert_eq!(manager.status(first.id).await.unwrap().status, DeployStatus::Superseded);

    // One batch per namespace, published out of the same deployment.
    let published = sink.published();
    assert_eq!(published.len(), 2);
    let ingest_batch = published.iter().find(|b| b.namespace == "ingest-ns").unwrap();
    let report_batch = published.iter().find(|b| b.namespace == "report-ns").unwrap();
    assert_eq!(ingest_batch.project, "sales");
    assert_eq!(ingest_batch.jobs[0].job.name, "ingest");
    assert_eq!(report_batch.jobs[0].job.name, "report");

    // report reads ingest's destination, so it hangs one level below.
    assert_eq!(ingest_batch.jobs[0].priority, MAX_PRIORITY_WEIGHT);
    assert_eq!(report_batch.jobs[0].priority, MAX_PRIORITY_WEIGHT - PRIORITY_WEIGHT_GAP);

    let ingest = stack.service.get("sales", "ingest").await.unwrap();
    assert!(report_batch.jobs[0].dependencies.contains(&ResolvedDependency::Intra {
        job_id: ingest.id,
        job_name: "ingest".to_string(),
    }));

    sender.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }
    std::fs::remove_file(db_path).unwrap();
    println!("✅ Submit, compile and publish verified end to end over SQLite");
}

#[tokio::test]
async fn test_name_ownership_survives_tombstoning() {
    let plugin =
        MockPlugin::new("bq2bq").with_destination("report", "bq://sales.mart.report", "bigquery");
    let stack = stack("sqlite::memory:", plugin, &["core", "growth"]).await;

    stack.service.submit(JobSpec::for_test("report", "sales", "core")).await.unwrap();

    let err = stack
        .service
        .submit(JobSpec::for_test("report", "sales", "growth"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OwnershipConflict);

    // A soft-deleted row keeps holding the name for its namespace.
    stack.service.delete("sales", "report", false).await.unwrap();
    let err = stack
        .service
        .submit(JobSpec::for_test("report", "sales", "growth"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OwnershipConflict);

    // Resubmitting into the owning namespace resurrects it.
    stack.service.submit(JobSpec::for_test("report", "sales", "core")).await.unwrap();
    let revived = stack.service.get("sales", "report").await.unwrap();
    assert!(!revived.is_deleted());

    println!("✅ Tombstoned name stayed owned by its original namespace");
}

#[tokio::test]
async fn test_delete_guard_sees_resolver_recorded_dependents() {
    let plugin = MockPlugin::new("bq2bq")
        .with_destination("ingest", "bq://sales.raw.orders", "bigquery")
        .with_destination("report", "bq://sales.mart.report", "bigquery")
        .with_dependencies("report", vec!["bq://sales.raw.orders".to_string()]);
    let stack = stack("sqlite::memory:", plugin, &["core"]).await;

    stack.service.submit(JobSpec::for_test("ingest", "sales", "core")).await.unwrap();
    stack.service.submit(JobSpec::for_test("report", "sales", "core")).await.unwrap();

    // Resolution records report's source row on ingest's URN; the
    // delete guard reads exactly those rows.
    resolver(&stack).resolve_project("sales").await.unwrap();

    let err = stack.service.delete("sales", "ingest", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("report"));

    stack.service.delete("sales", "ingest", true).await.unwrap();
    assert!(stack.service.get("sales", "ingest").await.unwrap_err().is_not_found());

    println!("✅ Delete refused while a recorded dependent was live, forced through after");
}
