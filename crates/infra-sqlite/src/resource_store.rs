// SQLite Resource & Backup Store Implementation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gantry_core::domain::{BackupSpec, ResourceSpec};
use gantry_core::error::{AppError, Entity, ErrorKind, Result};
use gantry_core::port::{BackupStore, ResourceStore, TimeProvider};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::support::{self, from_json, map_sqlx_error, to_json};

const RESOURCE_COLUMNS: &str = "r.id, r.urn, r.kind, r.datastore, \
    p.name AS project_name, n.name AS namespace_name, r.spec";

const RESOURCE_FROM: &str = "FROM resources r \
    JOIN projects p ON p.id = r.project_id \
    JOIN namespaces n ON n.id = r.namespace_id";

pub struct SqliteResourceStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteResourceStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { pool, time_provider }
    }
}

#[async_trait]
impl ResourceStore for SqliteResourceStore {
    async fn create(&self, resource: &ResourceSpec) -> Result<()> {
        let project_id = support::project_id(&self.pool, &resource.project).await?;
        let namespace_id =
            support::namespace_id(&self.pool, project_id, &resource.project, &resource.namespace)
                .await?;

        let now = self.time_provider.now();
        sqlx::query(
            r#"
            INSERT INTO resources (
                id, project_id, namespace_id, urn, kind, datastore, spec,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(resource.id)
        .bind(project_id)
        .bind(namespace_id)
        .bind(&resource.urn)
        .bind(&resource.kind)
        .bind(&resource.datastore)
        .bind(to_json(Entity::Resource, &resource.spec)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let mapped = map_sqlx_error(Entity::Resource, e);
            if mapped.kind() == ErrorKind::AlreadyExists {
                AppError::already_exists(Entity::Resource, resource.urn.clone())
            } else {
                mapped
            }
        })?;
        Ok(())
    }

    async fn update(&self, resource: &ResourceSpec) -> Result<()> {
        let project_id = support::project_id(&self.pool, &resource.project).await?;
        let namespace_id =
            support::namespace_id(&self.pool, project_id, &resource.project, &resource.namespace)
                .await?;

        let result = sqlx::query(
            "UPDATE resources \
             SET namespace_id = ?, kind = ?, datastore = ?, spec = ?, updated_at = ? \
             WHERE project_id = ? AND urn = ?",
        )
        .bind(namespace_id)
        .bind(&resource.kind)
        .bind(&resource.datastore)
        .bind(to_json(Entity::Resource, &resource.spec)?)
        .bind(self.time_provider.now())
        .bind(project_id)
        .bind(&resource.urn)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Resource, e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(Entity::Resource, resource.urn.clone()));
        }
        Ok(())
    }

    async fn get_by_urn(&self, project: &str, urn: &str) -> Result<ResourceSpec> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} {RESOURCE_FROM} WHERE p.name = ? AND r.urn = ?");
        let row = sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(project)
            .bind(urn)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Resource, e))?;
        match row {
            Some(row) => row.into_spec(),
            None => Err(AppError::not_found(Entity::Resource, urn.to_string())),
        }
    }

    async fn get_by_name(
        &self,
        project: &str,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceSpec> {
        // The URN doubles as the resource name, scoped to its namespace
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} {RESOURCE_FROM} \
             WHERE p.name = ? AND n.name = ? AND r.urn = ?"
        );
        let row = sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(project)
            .bind(namespace)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Resource, e))?;
        match row {
            Some(row) => row.into_spec(),
            None => Err(AppError::not_found(Entity::Resource, name.to_string())),
        }
    }

    async fn get_all(
        &self,
        project: &str,
        namespace: &str,
        datastore: &str,
    ) -> Result<Vec<ResourceSpec>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} {RESOURCE_FROM} \
             WHERE p.name = ? AND n.name = ? AND r.datastore = ? ORDER BY r.urn"
        );
        let rows = sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(project)
            .bind(namespace)
            .bind(datastore)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Resource, e))?;
        rows.into_iter().map(ResourceRow::into_spec).collect()
    }
}

#[async_trait]
impl BackupStore for SqliteResourceStore {
    async fn save(&self, project: &str, datastore: &str, backup: &BackupSpec) -> Result<()> {
        let project_id = support::project_id(&self.pool, project).await?;
        sqlx::query(
            r#"
            INSERT INTO backups (
                id, project_id, datastore, resource_name, description,
                config, result, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(backup.id)
        .bind(project_id)
        .bind(datastore)
        .bind(&backup.resource_name)
        .bind(&backup.description)
        .bind(to_json(Entity::Backup, &backup.config)?)
        .bind(to_json(Entity::Backup, &backup.result)?)
        .bind(backup.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Backup, e))?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<BackupSpec> {
        let row = sqlx::query_as::<_, BackupRow>(
            "SELECT id, resource_name, description, config, result, created_at \
             FROM backups WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Backup, e))?;
        match row {
            Some(row) => row.into_spec(),
            None => Err(AppError::not_found(Entity::Backup, id.to_string())),
        }
    }

    async fn get_all(
        &self,
        project: &str,
        datastore: &str,
        window: Duration,
    ) -> Result<Vec<BackupSpec>> {
        let cutoff = self.time_provider.now() - window;
        let rows = sqlx::query_as::<_, BackupRow>(
            "SELECT b.id, b.resource_name, b.description, b.config, b.result, b.created_at \
             FROM backups b JOIN projects p ON p.id = b.project_id \
             WHERE p.name = ? AND b.datastore = ? AND b.created_at >= ? \
             ORDER BY b.created_at DESC",
        )
        .bind(project)
        .bind(datastore)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Backup, e))?;
        rows.into_iter().map(BackupRow::into_spec).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    urn: String,
    kind: String,
    datastore: String,
    project_name: String,
    namespace_name: String,
    spec: String,
}

impl ResourceRow {
    fn into_spec(self) -> Result<ResourceSpec> {
        Ok(ResourceSpec {
            id: self.id,
            urn: self.urn,
            kind: self.kind,
            datastore: self.datastore,
            project: self.project_name,
            namespace: self.namespace_name,
            spec: from_json(Entity::Resource, &self.spec)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BackupRow {
    id: Uuid,
    resource_name: String,
    description: String,
    config: String,
    result: String,
    created_at: DateTime<Utc>,
}

impl BackupRow {
    fn into_spec(self) -> Result<BackupSpec> {
        Ok(BackupSpec {
            id: self.id,
            resource_name: self.resource_name,
            description: self.description,
            config: from_json(Entity::Backup, &self.config)?,
            result: from_json(Entity::Backup, &self.result)?,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;

    use super::*;
    use crate::{create_pool, run_migrations};
    use gantry_core::port::time_provider::mocks::FixedTimeProvider;

    async fn seed_tenant(pool: &SqlitePool, project: &str, namespace: &str) {
        sqlx::query("INSERT OR IGNORE INTO projects (id, name, config) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind(project)
            .bind(r#"{"environment":"test"}"#)
            .execute(pool)
            .await
            .unwrap();
        let project_id: Uuid = sqlx::query_scalar("SELECT id FROM projects WHERE name = ?")
            .bind(project)
            .fetch_one(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT OR IGNORE INTO namespaces (id, project_id, name, config) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(namespace)
        .bind(r#"{"team":"test"}"#)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn setup() -> SqliteResourceStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        seed_tenant(&pool, "sales", "core").await;
        seed_tenant(&pool, "sales", "growth").await;
        SqliteResourceStore::new(pool, Arc::new(FixedTimeProvider::default_epoch()))
    }

    fn resource(n: u128, urn: &str, namespace: &str) -> ResourceSpec {
        ResourceSpec::new(Uuid::from_u128(n), urn, "table", "bigquery", "sales", namespace)
    }

    fn backup(n: u128, created_at: DateTime<Utc>) -> BackupSpec {
        BackupSpec {
            id: Uuid::from_u128(n),
            resource_name: "bq://sales.mart.orders".to_string(),
            description: format!("run {}", n),
            config: BTreeMap::from([("IgnoreDownstream".to_string(), "false".to_string())]),
            result: BTreeMap::new(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_create_then_duplicate_fails() {
        let store = setup().await;
        store.create(&resource(1, "bq://sales.mart.orders", "core")).await.unwrap();

        let err = store.create(&resource(2, "bq://sales.mart.orders", "core")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(err.to_string().contains("bq://sales.mart.orders"));
    }

    #[tokio::test]
    async fn test_update_requires_existing_row() {
        let store = setup().await;
        let err = store.update(&resource(1, "bq://sales.mart.orders", "core")).await.unwrap_err();
        assert!(err.is_not_found());

        store.create(&resource(1, "bq://sales.mart.orders", "core")).await.unwrap();
        let mut changed = resource(2, "bq://sales.mart.orders", "core");
        changed.kind = "view".to_string();
        changed.spec = serde_json::json!({"ttl_days": 7});
        store.update(&changed).await.unwrap();

        let fetched = store.get_by_urn("sales", "bq://sales.mart.orders").await.unwrap();
        assert_eq!(fetched.kind, "view");
        assert_eq!(fetched.spec, serde_json::json!({"ttl_days": 7}));
        // Storage identity survives the update
        assert_eq!(fetched.id, Uuid::from_u128(1));
    }

    #[tokio::test]
    async fn test_get_by_name_scopes_to_namespace() {
        let store = setup().await;
        store.create(&resource(1, "bq://sales.mart.orders", "core")).await.unwrap();

        let err = store
            .get_by_name("sales", "growth", "bq://sales.mart.orders")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let found = store.get_by_name("sales", "core", "bq://sales.mart.orders").await.unwrap();
        assert_eq!(found.id, Uuid::from_u128(1));
    }

    #[tokio::test]
    async fn test_get_all_filters_by_datastore() {
        let store = setup().await;
        store.create(&resource(1, "bq://sales.mart.orders", "core")).await.unwrap();
        let mut bucket = resource(2, "gs://sales-archive", "core");
        bucket.datastore = "gcs".to_string();
        bucket.kind = "bucket".to_string();
        store.create(&bucket).await.unwrap();

        let tables = ResourceStore::get_all(&store, "sales", "core", "bigquery").await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].urn, "bq://sales.mart.orders");
    }

    #[tokio::test]
    async fn test_backup_window_skips_old_records_newest_first() {
        let store = setup().await;
        let now = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();

        store.save("sales", "bigquery", &backup(2, now - Duration::days(10))).await.unwrap();
        store.save("sales", "bigquery", &backup(1, now - Duration::days(1))).await.unwrap();
        store.save("sales", "bigquery", &backup(3, now - Duration::days(120))).await.unwrap();

        let within =
            BackupStore::get_all(&store, "sales", "bigquery", Duration::days(90)).await.unwrap();
        let ids: Vec<Uuid> = within.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(1), Uuid::from_u128(2)]);

        let ancient = store.get_by_id(Uuid::from_u128(3)).await.unwrap();
        assert_eq!(ancient.resource_name, "bq://sales.mart.orders");
        assert_eq!(ancient.created_at, now - Duration::days(120));
    }

    #[tokio::test]
    async fn test_backup_round_trips_result_map() {
        let store = setup().await;
        let now = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let mut spec = backup(1, now);
        spec.result.insert(
            "bq://sales.mart.orders".to_string(),
            gantry_core::domain::BackupDetail {
                result_urn: "bq://sales.backup.orders_20230501".to_string(),
                spec: serde_json::json!({"ttl_days": 30}),
            },
        );
        store.save("sales", "bigquery", &spec).await.unwrap();

        let fetched = store.get_by_id(Uuid::from_u128(1)).await.unwrap();
        assert_eq!(fetched, spec);
    }
}
