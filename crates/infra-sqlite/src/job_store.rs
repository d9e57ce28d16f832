// SQLite Job Spec & Source Store Implementation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::domain::{JobId, JobSource, JobSpec, ResourceUrn};
use gantry_core::error::{AppError, Entity, Result};
use gantry_core::port::{JobSourceStore, JobSpecStore, TimeProvider};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::support::{self, from_json, map_sqlx_error, to_json};

// Every read goes through the tenant joins so rows come back carrying
// project and namespace names instead of storage ids.
const JOB_COLUMNS: &str = "j.id, j.name, j.owner, p.name AS project_name, \
    n.name AS namespace_name, j.schedule, j.run_window, j.task, j.assets, \
    j.dependencies, j.hooks, j.notify, j.labels, j.destination, j.deleted_at";

const JOB_FROM: &str = "FROM jobs j \
    JOIN projects p ON p.id = j.project_id \
    JOIN namespaces n ON n.id = j.namespace_id";

pub struct SqliteJobStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { pool, time_provider }
    }

    /// Live spec by (project, name), or None.
    async fn lookup_live(&self, project: &str, name: &str) -> Result<Option<JobSpec>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} {JOB_FROM} \
             WHERE p.name = ? AND j.name = ? AND j.deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(project)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        row.map(JobRow::into_spec).transpose()
    }
}

#[async_trait]
impl JobSpecStore for SqliteJobStore {
    async fn upsert(&self, spec: &JobSpec) -> Result<()> {
        let project_id = support::project_id(&self.pool, &spec.project).await?;
        let namespace_id =
            support::namespace_id(&self.pool, project_id, &spec.project, &spec.namespace).await?;

        // Names are unique per project across namespaces; a tombstoned
        // row keeps holding the name for its owning namespace.
        let owner_namespace: Option<String> = sqlx::query_scalar(
            "SELECT n.name FROM jobs j JOIN namespaces n ON n.id = j.namespace_id \
             WHERE j.project_id = ? AND j.name = ?",
        )
        .bind(project_id)
        .bind(&spec.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Job, e))?;

        if let Some(owner) = owner_namespace {
            if owner != spec.namespace {
                return Err(AppError::ownership_conflict(
                    Entity::Job,
                    format!("{} is owned by namespace {}", spec.name, owner),
                ));
            }
        }

        let now = self.time_provider.now();
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, project_id, namespace_id, name, owner,
                schedule, run_window, task, assets, dependencies,
                hooks, notify, labels, destination, deleted_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (project_id, name) DO UPDATE SET
                namespace_id = excluded.namespace_id,
                owner = excluded.owner,
                schedule = excluded.schedule,
                run_window = excluded.run_window,
                task = excluded.task,
                assets = excluded.assets,
                dependencies = excluded.dependencies,
                hooks = excluded.hooks,
                notify = excluded.notify,
                labels = excluded.labels,
                destination = excluded.destination,
                deleted_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(spec.id)
        .bind(project_id)
        .bind(namespace_id)
        .bind(&spec.name)
        .bind(&spec.owner)
        .bind(to_json(Entity::Job, &spec.schedule)?)
        .bind(to_json(Entity::Job, &spec.window)?)
        .bind(to_json(Entity::Job, &spec.task)?)
        .bind(to_json(Entity::Job, &spec.assets)?)
        .bind(to_json(Entity::Job, &spec.dependencies)?)
        .bind(to_json(Entity::Job, &spec.hooks)?)
        .bind(to_json(Entity::Job, &spec.notify)?)
        .bind(to_json(Entity::Job, &spec.labels)?)
        .bind(&spec.destination)
        .bind(spec.deleted_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Job, e))?;

        Ok(())
    }

    async fn get_by_name(
        &self,
        project: &str,
        name: &str,
        include_deleted: bool,
    ) -> Result<JobSpec> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} {JOB_FROM} \
             WHERE p.name = ? AND j.name = ? AND (? OR j.deleted_at IS NULL)"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(project)
            .bind(name)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        match row {
            Some(row) => row.into_spec(),
            None => Err(AppError::not_found(Entity::Job, format!("{}/{}", project, name))),
        }
    }

    async fn get_all_by_project(
        &self,
        project: &str,
        include_deleted: bool,
    ) -> Result<Vec<JobSpec>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} {JOB_FROM} \
             WHERE p.name = ? AND (? OR j.deleted_at IS NULL) ORDER BY j.name"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(project)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        rows.into_iter().map(JobRow::into_spec).collect()
    }

    async fn get_all_by_namespace(
        &self,
        project: &str,
        namespace: &str,
        include_deleted: bool,
    ) -> Result<Vec<JobSpec>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} {JOB_FROM} \
             WHERE p.name = ? AND n.name = ? AND (? OR j.deleted_at IS NULL) \
             ORDER BY j.name"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(project)
            .bind(namespace)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        rows.into_iter().map(JobRow::into_spec).collect()
    }

    async fn get_by_destination(
        &self,
        destination: &str,
        include_deleted: bool,
    ) -> Result<Vec<JobSpec>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} {JOB_FROM} \
             WHERE j.destination = ? AND (? OR j.deleted_at IS NULL) ORDER BY j.id"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(destination)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        rows.into_iter().map(JobRow::into_spec).collect()
    }

    async fn get_dependent_jobs(
        &self,
        project: &str,
        job_name: &str,
        destination: &str,
    ) -> Result<Vec<JobSpec>> {
        // Inferred dependents recorded a source row on the destination
        // URN; they come from any project.
        let inferred_sql = format!(
            "SELECT {JOB_COLUMNS} {JOB_FROM} \
             JOIN job_sources s ON s.job_id = j.id \
             WHERE s.resource_urn = ? AND j.deleted_at IS NULL \
             ORDER BY j.id"
        );
        let inferred = sqlx::query_as::<_, JobRow>(&inferred_sql)
            .bind(destination)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;

        // Declared dependents name the job bare (same project) or
        // qualified (any project).
        let qualified = format!("{}/{}", project, job_name);
        let declared_sql = format!(
            "SELECT {JOB_COLUMNS} {JOB_FROM} \
             WHERE j.deleted_at IS NULL AND ( \
                 (p.name = ? AND EXISTS ( \
                     SELECT 1 FROM json_each(j.dependencies) AS d WHERE d.key = ?)) \
                 OR EXISTS ( \
                     SELECT 1 FROM json_each(j.dependencies) AS d WHERE d.key = ?)) \
             ORDER BY j.id"
        );
        let declared = sqlx::query_as::<_, JobRow>(&declared_sql)
            .bind(project)
            .bind(job_name)
            .bind(&qualified)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in inferred.into_iter().chain(declared) {
            let spec = row.into_spec()?;
            if seen.insert(spec.id) {
                out.push(spec);
            }
        }
        Ok(out)
    }

    async fn get_inferred_dependencies(
        &self,
        project: &str,
    ) -> Result<HashMap<JobId, Vec<JobSpec>>> {
        // Producers of a recorded URN may live in any project; the
        // resolver decides intra vs inter from the project field.
        let sql = format!(
            "SELECT s.job_id AS dependent_id, {JOB_COLUMNS} {JOB_FROM} \
             JOIN job_sources s ON s.resource_urn = j.destination \
             JOIN projects sp ON sp.id = s.project_id \
             WHERE sp.name = ? AND j.deleted_at IS NULL \
             ORDER BY s.job_id, j.id"
        );
        let rows = sqlx::query_as::<_, DependencyRow>(&sql)
            .bind(project)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;

        let mut map: HashMap<JobId, Vec<JobSpec>> = HashMap::new();
        for row in rows {
            map.entry(row.dependent_id).or_default().push(row.job.into_spec()?);
        }
        Ok(map)
    }

    async fn get_static_dependencies(
        &self,
        project: &str,
    ) -> Result<HashMap<JobId, Vec<JobSpec>>> {
        let jobs = self.get_all_by_project(project, false).await?;

        let mut cache: HashMap<(String, String), Option<JobSpec>> = HashMap::new();
        let mut map: HashMap<JobId, Vec<JobSpec>> = HashMap::new();
        for job in &jobs {
            for job_ref in job.static_dependency_refs() {
                let key = job_ref.qualified(project);
                let target = match cache.get(&key) {
                    Some(cached) => cached.clone(),
                    None => {
                        let found = self.lookup_live(&key.0, &key.1).await?;
                        cache.insert(key, found.clone());
                        found
                    }
                };
                if let Some(target) = target {
                    map.entry(job.id).or_default().push(target);
                }
            }
        }
        Ok(map)
    }

    async fn delete_by_id(&self, id: JobId) -> Result<()> {
        let now = self.time_provider.now();
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(Entity::Job, e))?;

        let result = sqlx::query("UPDATE jobs SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(Entity::Job, id.to_string()));
        }

        sqlx::query("DELETE FROM job_sources WHERE job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;

        tx.commit().await.map_err(|e| map_sqlx_error(Entity::Job, e))
    }
}

#[async_trait]
impl JobSourceStore for SqliteJobStore {
    async fn save(&self, project: &str, job_id: JobId, urns: &[ResourceUrn]) -> Result<()> {
        // Reject the whole batch before touching rows
        let mut unique = HashSet::new();
        for urn in urns {
            if !unique.insert(urn) {
                return Err(AppError::invalid_argument(
                    Entity::Job,
                    format!("duplicate source urn {}", urn),
                ));
            }
        }

        let project_id = support::project_id(&self.pool, project).await?;
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(Entity::Job, e))?;
        sqlx::query("DELETE FROM job_sources WHERE job_id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        for urn in urns {
            sqlx::query(
                "INSERT INTO job_sources (job_id, project_id, resource_urn) VALUES (?, ?, ?)",
            )
            .bind(job_id)
            .bind(project_id)
            .bind(urn)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error(Entity::Job, e))
    }

    async fn get_by_project(&self, project: &str) -> Result<Vec<JobSource>> {
        let rows: Vec<SourceRow> = sqlx::query_as(
            "SELECT s.job_id, p.name AS project_name, s.resource_urn \
             FROM job_sources s JOIN projects p ON p.id = s.project_id \
             WHERE p.name = ? ORDER BY s.job_id, s.resource_urn",
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        Ok(rows.into_iter().map(SourceRow::into_source).collect())
    }

    async fn delete_by_job(&self, job_id: JobId) -> Result<()> {
        sqlx::query("DELETE FROM job_sources WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Job, e))?;
        Ok(())
    }
}

/// SQLite row representation of a job spec, tenant names joined in.
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    name: String,
    owner: String,
    project_name: String,
    namespace_name: String,
    schedule: String,
    run_window: String,
    task: String,
    assets: String,
    dependencies: String,
    hooks: String,
    notify: String,
    labels: String,
    destination: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_spec(self) -> Result<JobSpec> {
        Ok(JobSpec {
            id: self.id,
            name: self.name,
            owner: self.owner,
            project: self.project_name,
            namespace: self.namespace_name,
            schedule: from_json(Entity::Job, &self.schedule)?,
            window: from_json(Entity::Job, &self.run_window)?,
            task: from_json(Entity::Job, &self.task)?,
            assets: from_json(Entity::Job, &self.assets)?,
            dependencies: from_json(Entity::Job, &self.dependencies)?,
            hooks: from_json(Entity::Job, &self.hooks)?,
            notify: from_json(Entity::Job, &self.notify)?,
            labels: from_json(Entity::Job, &self.labels)?,
            destination: self.destination,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DependencyRow {
    dependent_id: Uuid,
    #[sqlx(flatten)]
    job: JobRow,
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    job_id: Uuid,
    project_name: String,
    resource_urn: String,
}

impl SourceRow {
    fn into_source(self) -> JobSource {
        JobSource {
            job_id: self.job_id,
            project: self.project_name,
            resource_urn: self.resource_urn,
        }
    }
}
