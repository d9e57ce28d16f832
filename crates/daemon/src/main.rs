//! Gantry - Main Entry Point
//! Composition root: wires the SQLite stores, the sibling-control-plane
//! clients and the core services, then runs the deploy worker pool and
//! the notifier until a shutdown signal arrives.

mod settings;
mod sinks;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gantry_core::application::{
    shutdown_channel, DependencyResolver, DeploymentManager, ExternalResolver, Notifier,
    PluginService,
};
use gantry_core::port::{
    IdProvider, PluginRegistry, ResourceManager, SystemTimeProvider, TimeProvider, UuidProvider,
};
use gantry_infra_http::HttpResourceManager;
use gantry_infra_sqlite::{
    create_pool, run_migrations, SqliteDeployStore, SqliteJobStore, SqliteTenantStore,
};

use crate::settings::Settings;
use crate::sinks::{LogNotifyTransport, LogSchedulerSink};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("Config load failed: {}", e))?;

    // 2. Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("gantry=info"))
        .expect("Failed to create env filter");

    match settings.log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: pretty formatting
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Gantry control plane v{} starting...", VERSION);
    info!(
        database_url = %settings.database_url,
        workers = settings.num_workers,
        resource_managers = settings.resource_managers.len(),
        "configuration loaded"
    );

    // 3. Initialize database
    let pool = create_pool(&settings.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);

    let job_store = Arc::new(SqliteJobStore::new(pool.clone(), time_provider.clone()));
    let tenant_store = Arc::new(SqliteTenantStore::new(pool.clone()));
    let deploy_store = Arc::new(SqliteDeployStore::new(
        pool.clone(),
        time_provider.clone(),
        id_provider.clone(),
    ));

    // Task plugins are registered by the embedding deployment; the bare
    // daemon starts with none and keeps compiling whatever resolves.
    let plugins = Arc::new(PluginRegistry::new());
    let plugin_service = Arc::new(PluginService::new(
        plugins,
        tenant_store.clone(),
        tenant_store.clone(),
        tenant_store.clone(),
    ));

    let mut managers: Vec<Arc<dyn ResourceManager>> = Vec::new();
    for manager_config in settings.resource_manager_configs() {
        let name = manager_config.name.clone();
        match HttpResourceManager::new(manager_config) {
            Ok(manager) => managers.push(Arc::new(manager)),
            Err(e) => warn!(manager = %name, error = %e, "skipping unusable resource manager"),
        }
    }

    let resolver = Arc::new(DependencyResolver::new(
        job_store.clone(),
        job_store.clone(),
        plugin_service,
        Arc::new(ExternalResolver::new(managers)),
    ));

    let deploy_manager = Arc::new(DeploymentManager::new(
        deploy_store,
        resolver,
        Arc::new(LogSchedulerSink),
        time_provider.clone(),
        settings.deploy_config(),
    ));

    // 5. Recover deployments orphaned by an unclean stop
    info!("Running deployment recovery...");
    match deploy_manager.recover_stale().await {
        Ok(requeued) => info!(requeued, "deployment recovery completed"),
        Err(e) => tracing::error!(error = %e, "deployment recovery failed"),
    }

    // 6. Start workers
    info!("Starting deploy workers...");
    let (shutdown_tx, shutdown_token) = shutdown_channel();
    let worker_handles = deploy_manager.spawn_workers(&shutdown_token);

    info!("Starting notifier...");
    let (notifier, mut notify_errors) =
        Notifier::new(Arc::new(LogNotifyTransport), settings.notify_config());
    let notifier_handle = notifier.spawn_worker(shutdown_tx.subscribe());

    // Dropped batches surface on the error channel; keep them visible.
    let error_logger = tokio::spawn(async move {
        while let Some(report) = notify_errors.recv().await {
            warn!(
                receiver = %report.receiver,
                reason = %report.reason,
                dropped = report.dropped.len(),
                "notification batch dropped"
            );
        }
    });

    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: signal, then bounded waits
    shutdown_tx.shutdown();
    for handle in worker_handles {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), notifier_handle).await;

    // Last notifier clone is gone, the error channel drains and closes.
    drop(notifier);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), error_logger).await;

    info!("Shutdown complete.");

    Ok(())
}
