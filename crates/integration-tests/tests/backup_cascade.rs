//! Backup Cascade Integration Tests
//!
//! Exercises the backup coordinator over real SQLite: candidate
//! collection walks actual job_sources rows, resources come out of the
//! resources table and the finished record lands in backups. The
//! datastore driver and the clock stay mocked.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use gantry_core::application::{BackupConfig, BackupService, DestinationResolver, PluginService};
use gantry_core::domain::{BackupRequest, JobSpec, NamespaceSpec, ProjectSpec, ResourceSpec};
use gantry_core::error::{Entity, ErrorKind};
use gantry_core::port::datastore::mocks::MockDatastore;
use gantry_core::port::datastore::DatastoreRegistry;
use gantry_core::port::id_provider::mocks::SequentialIdProvider;
use gantry_core::port::plugin::mocks::MockPlugin;
use gantry_core::port::plugin::PluginRegistry;
use gantry_core::port::time_provider::mocks::FixedTimeProvider;
use gantry_core::port::{
    JobSourceStore, JobSpecStore, NamespaceStore, ProjectStore, ResourceStore,
};
use gantry_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStore, SqliteResourceStore, SqliteTenantStore,
};
use uuid::Uuid;

const ROOT: &str = "bq://sales.raw.orders";
const MID: &str = "bq://sales.mart.orders";
const LEAF: &str = "bq://sales.export.orders";

struct Harness {
    datastore: Arc<MockDatastore>,
    clock: Arc<FixedTimeProvider>,
    service: BackupService,
}

/// Three-level lineage in project "sales", one namespace per level:
/// root_job -> ROOT, mid_job reads ROOT -> MID, leaf_job reads MID ->
/// LEAF. `seed_root_resource` controls whether ROOT has a resource row.
async fn harness(seed_root_resource: bool) -> Harness {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let tenant = Arc::new(SqliteTenantStore::new(pool.clone()));
    let config = BTreeMap::from([("environment".to_string(), "test".to_string())]);
    ProjectStore::save(
        tenant.as_ref(),
        &ProjectSpec::new(Uuid::new_v4(), "sales", config.clone()),
    )
    .await
    .unwrap();
    for namespace in ["ns-root", "ns-mid", "ns-leaf"] {
        NamespaceStore::save(
            tenant.as_ref(),
            &NamespaceSpec::new(Uuid::new_v4(), "sales", namespace, config.clone()),
        )
        .await
        .unwrap();
    }

    let clock = Arc::new(FixedTimeProvider::default_epoch());
    let job_store = Arc::new(SqliteJobStore::new(pool.clone(), clock.clone()));
    let resource_store = Arc::new(SqliteResourceStore::new(pool, clock.clone()));

    let jobs =
        [("root_job", "ns-root", ROOT, None), ("mid_job", "ns-mid", MID, Some(ROOT)), ("leaf_job", "ns-leaf", LEAF, Some(MID))];
    for (name, namespace, destination, reads) in jobs {
        let mut job = JobSpec::for_test(name, "sales", namespace);
        job.destination = Some(destination.to_string());
        job_store.upsert(&job).await.unwrap();
        if let Some(upstream) = reads {
            job_store.save("sales", job.id, &[upstream.to_string()]).await.unwrap();
        }
        if destination != ROOT || seed_root_resource {
            resource_store
                .create(&ResourceSpec::new(
                    Uuid::new_v4(),
                    destination,
                    "table",
                    "bigquery",
                    "sales",
                    namespace,
                ))
                .await
                .unwrap();
        }
    }

    let mut plugins = PluginRegistry::new();
    plugins.register(Arc::new(
        MockPlugin::new("bq2bq")
            .with_destination("root_job", ROOT, "bigquery")
            .with_destination("mid_job", MID, "bigquery")
            .with_destination("leaf_job", LEAF, "bigquery"),
    ));
    let plugin_service = Arc::new(PluginService::new(
        Arc::new(plugins),
        tenant.clone(),
        tenant.clone(),
        tenant.clone(),
    ));

    let datastore = Arc::new(MockDatastore::new("bigquery"));
    let mut datastores = DatastoreRegistry::new();
    datastores.register(datastore.clone());

    let service = BackupService::new(
        job_store,
        Arc::new(DestinationResolver::new(resource_store.clone(), tenant)),
        plugin_service,
        Arc::new(datastores),
        resource_store,
        clock.clone(),
        Arc::new(SequentialIdProvider::new()),
        BackupConfig::default(),
    );
    Harness { datastore, clock, service }
}

fn request(allowed: &[&str]) -> BackupRequest {
    let mut request = BackupRequest::new(ROOT, "sales", "ns-root");
    request.allowed_downstream_namespaces = allowed.iter().map(|s| s.to_string()).collect();
    request
}

#[tokio::test]
async fn test_cascade_walks_transitive_dependents_root_first() {
    let harness = harness(true).await;
    let outcome = harness.service.backup(request(&["*"])).await.unwrap();

    assert_eq!(
        harness.datastore.backed_up_urns(),
        vec![ROOT.to_string(), MID.to_string(), LEAF.to_string()]
    );
    assert!(outcome.ignored.is_empty());
    assert_eq!(outcome.result_urns.len(), 3);

    let saved = harness.service.get_backup(outcome.backup_id).await.unwrap();
    assert_eq!(saved.resource_name, ROOT);
    assert_eq!(saved.result.len(), 3);
    assert!(saved.result.contains_key(LEAF));

    let listed = harness.service.list_backups("sales", "bigquery").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, outcome.backup_id);

    println!("✅ Cascade reached the transitive downstream through job_sources rows");
}

#[tokio::test]
async fn test_pruned_namespace_does_not_stop_the_walk() {
    let harness = harness(true).await;
    let plan = harness.service.dry_run(request(&["ns-leaf"])).await.unwrap();

    // ns-mid is filtered out, but its downstream in ns-leaf still runs:
    // authorization prunes resources, not the walk below them.
    assert_eq!(plan.resources, vec![ROOT.to_string(), LEAF.to_string()]);
    assert_eq!(plan.ignored, vec![MID.to_string()]);
    assert_eq!(
        harness.datastore.backed_up_urns(),
        vec![ROOT.to_string(), LEAF.to_string()]
    );

    // A dry run persists nothing.
    assert!(harness.service.list_backups("sales", "bigquery").await.unwrap().is_empty());

    println!("✅ Namespace pruning dropped the resource, not the branch below it");
}

#[tokio::test]
async fn test_list_window_hides_old_runs() {
    let harness = harness(true).await;
    let old = harness.service.backup(request(&["*"])).await.unwrap();

    harness.clock.advance(Duration::days(120));
    let recent = harness.service.backup(request(&["*"])).await.unwrap();

    let listed = harness.service.list_backups("sales", "bigquery").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, recent.backup_id);

    // Direct lookup still reaches past the listing window.
    assert!(harness.service.get_backup(old.backup_id).await.is_ok());

    println!("✅ Listing window filtered on stored timestamps");
}

#[tokio::test]
async fn test_missing_root_resource_fails_before_any_snapshot() {
    let harness = harness(false).await;
    let err = harness.service.backup(request(&["*"])).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.entity(), Entity::Backup);
    assert!(harness.datastore.backup_calls().is_empty());
    assert!(harness.service.list_backups("sales", "bigquery").await.unwrap().is_empty());

    println!("✅ Missing root resource aborted the run before any snapshot");
}
