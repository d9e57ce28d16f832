// SQLite Deploy Request Store Implementation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::domain::{DeployStatus, Deployment};
use gantry_core::error::{AppError, Entity, Result};
use gantry_core::port::{DeployRequestStore, IdProvider, TimeProvider};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::support::map_sqlx_error;

pub struct SqliteDeployStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl SqliteDeployStore {
    pub fn new(
        pool: SqlitePool,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self { pool, time_provider, id_provider }
    }

    async fn transition(&self, id: Uuid, status: DeployStatus) -> Result<()> {
        // Only an in-progress request may reach a terminal state, so a
        // requeued row cannot be finished by the worker that lost it.
        let result = sqlx::query(
            "UPDATE deployments SET status = ?, updated_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(self.time_provider.now())
        .bind(id)
        .bind(DeployStatus::InProgress.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Deployment, e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(Entity::Deployment, id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeployRequestStore for SqliteDeployStore {
    async fn push(&self, project: &str) -> Result<Deployment> {
        let now = self.time_provider.now();
        let deployment = Deployment {
            id: self.id_provider.generate(),
            project: project.to_string(),
            status: DeployStatus::Queued,
            created_at: now,
            updated_at: now,
        };

        let mut tx =
            self.pool.begin().await.map_err(|e| map_sqlx_error(Entity::Deployment, e))?;

        // At most one undrained request per project
        sqlx::query(
            "UPDATE deployments SET status = ?, updated_at = ? \
             WHERE project = ? AND status = ?",
        )
        .bind(DeployStatus::Superseded.as_str())
        .bind(now)
        .bind(project)
        .bind(DeployStatus::Queued.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(Entity::Deployment, e))?;

        sqlx::query(
            "INSERT INTO deployments (id, project, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(deployment.id)
        .bind(&deployment.project)
        .bind(deployment.status.as_str())
        .bind(deployment.created_at)
        .bind(deployment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(Entity::Deployment, e))?;

        tx.commit().await.map_err(|e| map_sqlx_error(Entity::Deployment, e))?;
        Ok(deployment)
    }

    async fn claim_next(&self) -> Result<Option<Deployment>> {
        // Oldest queued request whose project has nothing in progress,
        // flipped to IN_PROGRESS in the same statement so two workers
        // can never claim the same row.
        let row = sqlx::query_as::<_, DeploymentRow>(
            r#"
            UPDATE deployments
            SET status = ?, updated_at = ?
            WHERE id = (
                SELECT d.id FROM deployments d
                WHERE d.status = ?
                  AND NOT EXISTS (
                      SELECT 1 FROM deployments b
                      WHERE b.project = d.project AND b.status = ?
                  )
                ORDER BY d.created_at ASC, d.id ASC
                LIMIT 1
            )
            RETURNING id, project, status, created_at, updated_at
            "#,
        )
        .bind(DeployStatus::InProgress.as_str())
        .bind(self.time_provider.now())
        .bind(DeployStatus::Queued.as_str())
        .bind(DeployStatus::InProgress.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Deployment, e))?;

        Ok(row.map(DeploymentRow::into_deployment))
    }

    async fn mark_succeeded(&self, id: Uuid) -> Result<()> {
        self.transition(id, DeployStatus::Succeeded).await
    }

    async fn mark_failed(&self, id: Uuid) -> Result<()> {
        self.transition(id, DeployStatus::Failed).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Deployment> {
        let row = sqlx::query_as::<_, DeploymentRow>(
            "SELECT id, project, status, created_at, updated_at \
             FROM deployments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Deployment, e))?;

        row.map(DeploymentRow::into_deployment)
            .ok_or_else(|| AppError::not_found(Entity::Deployment, id.to_string()))
    }

    async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE deployments SET status = ?, updated_at = ? \
             WHERE status = ? AND updated_at < ?",
        )
        .bind(DeployStatus::Queued.as_str())
        .bind(self.time_provider.now())
        .bind(DeployStatus::InProgress.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Deployment, e))?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    project: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DeploymentRow {
    fn into_deployment(self) -> Deployment {
        let status = match self.status.as_str() {
            "QUEUED" => DeployStatus::Queued,
            "IN_PROGRESS" => DeployStatus::InProgress,
            "SUCCEEDED" => DeployStatus::Succeeded,
            "SUPERSEDED" => DeployStatus::Superseded,
            _ => DeployStatus::Failed,
        };
        Deployment {
            id: self.id,
            project: self.project,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
