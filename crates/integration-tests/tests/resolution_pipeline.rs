//! Dependency Resolution Integration Tests
//!
//! Runs project resolution against the real SQLite job store, so the
//! source-refresh writes, the inferred and declared lookups and the
//! external pass all go through actual SQL instead of the in-memory
//! port mocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use gantry_core::application::{DependencyResolver, ExternalResolver, PluginService};
use gantry_core::domain::{JobSpec, NamespaceSpec, ProjectSpec, ResolvedDependency};
use gantry_core::error::ErrorKind;
use gantry_core::port::plugin::mocks::MockPlugin;
use gantry_core::port::plugin::PluginRegistry;
use gantry_core::port::resource_manager::mocks::StaticResourceManager;
use gantry_core::port::time_provider::mocks::FixedTimeProvider;
use gantry_core::port::{
    JobSourceStore, JobSpecStore, NamespaceStore, ProjectStore, ResourceManager,
};
use gantry_infra_sqlite::{create_pool, run_migrations, SqliteJobStore, SqliteTenantStore};
use uuid::Uuid;

/// Fresh in-memory database with projects "sales" and "warehouse", each
/// carrying a "core" namespace.
async fn harness(
    plugin: MockPlugin,
    managers: Vec<Arc<dyn ResourceManager>>,
) -> (Arc<SqliteJobStore>, DependencyResolver) {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let tenant = Arc::new(SqliteTenantStore::new(pool.clone()));
    let config = BTreeMap::from([("environment".to_string(), "test".to_string())]);
    for project in ["sales", "warehouse"] {
        ProjectStore::save(
            tenant.as_ref(),
            &ProjectSpec::new(Uuid::new_v4(), project, config.clone()),
        )
        .await
        .unwrap();
        NamespaceStore::save(
            tenant.as_ref(),
            &NamespaceSpec::new(Uuid::new_v4(), project, "core", config.clone()),
        )
        .await
        .unwrap();
    }

    let job_store = Arc::new(SqliteJobStore::new(
        pool,
        Arc::new(FixedTimeProvider::default_epoch()),
    ));
    let mut plugins = PluginRegistry::new();
    plugins.register(Arc::new(plugin));
    let plugin_service = Arc::new(PluginService::new(
        Arc::new(plugins),
        tenant.clone(),
        tenant.clone(),
        tenant,
    ));
    let resolver = DependencyResolver::new(
        job_store.clone(),
        job_store.clone(),
        plugin_service,
        Arc::new(ExternalResolver::new(managers)),
    );
    (job_store, resolver)
}

#[tokio::test]
async fn test_resolution_mixes_intra_inter_external_and_ghost() {
    let manager = StaticResourceManager::new("optimus-b", "https://b.corp.io")
        .with_job("ext-proj", "ext-ns", "ext_feed", Some("bq://ext.raw.feed"));
    let plugin = MockPlugin::new("bq2bq").with_dependencies(
        "report",
        vec!["bq://sales.raw.orders".to_string(), "bq://ext.raw.feed".to_string()],
    );
    let (job_store, resolver) = harness(plugin, vec![Arc::new(manager)]).await;

    let mut ingest = JobSpec::for_test("ingest", "sales", "core");
    ingest.destination = Some("bq://sales.raw.orders".to_string());
    let ingest_id = ingest.id;
    job_store.upsert(&ingest).await.unwrap();

    let mut dim = JobSpec::for_test("dim_customers", "warehouse", "core");
    dim.destination = Some("bq://warehouse.dim.customers".to_string());
    let dim_id = dim.id;
    job_store.upsert(&dim).await.unwrap();

    let report = JobSpec::for_test("report", "sales", "core")
        .with_dependency("warehouse/dim_customers")
        .with_dependency("ghost_feed");
    job_store.upsert(&report).await.unwrap();

    let results = resolver.resolve_project("sales").await.unwrap();
    let report_result = results.iter().find(|r| r.job.name == "report").unwrap();

    // One edge of each flavor: same project, sibling project, remote.
    assert!(report_result.dependencies.contains(&ResolvedDependency::Intra {
        job_id: ingest_id,
        job_name: "ingest".to_string(),
    }));
    assert!(report_result.dependencies.contains(&ResolvedDependency::Inter {
        project: "warehouse".to_string(),
        job_id: dim_id,
        job_name: "dim_customers".to_string(),
    }));
    assert!(report_result
        .dependencies
        .iter()
        .any(|d| matches!(d, ResolvedDependency::External(e) if e.job_name == "ext_feed")));

    // The ghost key matched nothing, locally or remotely.
    assert_eq!(report_result.unresolved.len(), 1);
    assert_eq!(report_result.errors.len(), 1);
    assert_eq!(report_result.errors[0].kind(), ErrorKind::UnresolvedDependency);
    assert!(!report_result.is_fully_resolved());

    // The refresh step persisted report's plugin-derived URNs.
    let report_id = report_result.job.id;
    let report_urns: Vec<String> = job_store
        .get_by_project("sales")
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.job_id == report_id)
        .map(|s| s.resource_urn)
        .collect();
    assert_eq!(report_urns, vec!["bq://ext.raw.feed", "bq://sales.raw.orders"]);

    println!("✅ Intra, inter and external edges resolved over real SQL lookups");
}

#[tokio::test]
async fn test_plugin_failure_keeps_prior_sources_and_peers() {
    let plugin = MockPlugin::new("bq2bq")
        .with_failure("broken", "upstream api down")
        .with_dependencies("healthy", vec!["bq://sales.raw.clicks".to_string()]);
    let (job_store, resolver) = harness(plugin, Vec::new()).await;

    let mut clicks = JobSpec::for_test("clicks", "sales", "core");
    clicks.destination = Some("bq://sales.raw.clicks".to_string());
    job_store.upsert(&clicks).await.unwrap();

    // broken's URNs were recorded on an earlier, successful pass.
    let broken = JobSpec::for_test("broken", "sales", "core");
    job_store.upsert(&broken).await.unwrap();
    job_store
        .save("sales", broken.id, &["bq://sales.raw.clicks".to_string()])
        .await
        .unwrap();

    job_store.upsert(&JobSpec::for_test("healthy", "sales", "core")).await.unwrap();

    let results = resolver.resolve_project("sales").await.unwrap();
    let broken_result = results.iter().find(|r| r.job.name == "broken").unwrap();
    let healthy_result = results.iter().find(|r| r.job.name == "healthy").unwrap();

    // The failed refresh is reported on the job, while the stale rows
    // keep feeding it a resolved upstream.
    assert_eq!(broken_result.errors.len(), 1);
    assert_eq!(broken_result.errors[0].kind(), ErrorKind::PluginFailure);
    assert!(broken_result.dependencies.iter().any(
        |d| matches!(d, ResolvedDependency::Intra { job_name, .. } if job_name == "clicks")
    ));

    // The peer resolves as if nothing happened.
    assert!(healthy_result.is_fully_resolved());
    assert!(healthy_result.dependencies.iter().any(
        |d| matches!(d, ResolvedDependency::Intra { job_name, .. } if job_name == "clicks")
    ));

    println!("✅ Plugin failure stayed on its job; prior sources kept resolving");
}
