// SQLite Tenant Store Implementation (projects, namespaces, secrets)

use async_trait::async_trait;
use gantry_core::domain::{NamespaceSpec, ProjectSpec, Secret};
use gantry_core::error::{AppError, Entity, Result};
use gantry_core::port::{NamespaceStore, ProjectStore, SecretStore};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::support::{self, from_json, map_sqlx_error, to_json};

pub struct SqliteTenantStore {
    pool: SqlitePool,
}

impl SqliteTenantStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for SqliteTenantStore {
    async fn save(&self, project: &ProjectSpec) -> Result<()> {
        if project.config.is_empty() {
            return Err(AppError::empty_config(Entity::Project, project.name.clone()));
        }
        sqlx::query(
            "INSERT INTO projects (id, name, config) VALUES (?, ?, ?) \
             ON CONFLICT (name) DO UPDATE SET config = excluded.config",
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(to_json(Entity::Project, &project.config)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Project, e))?;
        Ok(())
    }

    async fn get_by_name(&self, name: &str) -> Result<ProjectSpec> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, config FROM projects WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Project, e))?;
        match row {
            Some(row) => row.into_spec(),
            None => Err(AppError::not_found(Entity::Project, name.to_string())),
        }
    }

    async fn get_all(&self) -> Result<Vec<ProjectSpec>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, config FROM projects ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Project, e))?;
        rows.into_iter().map(ProjectRow::into_spec).collect()
    }
}

#[async_trait]
impl NamespaceStore for SqliteTenantStore {
    async fn save(&self, namespace: &NamespaceSpec) -> Result<()> {
        if namespace.config.is_empty() {
            return Err(AppError::empty_config(Entity::Namespace, namespace.name.clone()));
        }
        let project_id = support::project_id(&self.pool, &namespace.project).await?;
        sqlx::query(
            "INSERT INTO namespaces (id, project_id, name, config) VALUES (?, ?, ?, ?) \
             ON CONFLICT (project_id, name) DO UPDATE SET config = excluded.config",
        )
        .bind(namespace.id)
        .bind(project_id)
        .bind(&namespace.name)
        .bind(to_json(Entity::Namespace, &namespace.config)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Namespace, e))?;
        Ok(())
    }

    async fn get_by_name(&self, project: &str, name: &str) -> Result<NamespaceSpec> {
        let row = sqlx::query_as::<_, NamespaceRow>(
            "SELECT n.id, p.name AS project_name, n.name, n.config \
             FROM namespaces n JOIN projects p ON p.id = n.project_id \
             WHERE p.name = ? AND n.name = ?",
        )
        .bind(project)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Namespace, e))?;
        match row {
            Some(row) => row.into_spec(),
            None => {
                Err(AppError::not_found(Entity::Namespace, format!("{}/{}", project, name)))
            }
        }
    }

    async fn get_all(&self, project: &str) -> Result<Vec<NamespaceSpec>> {
        let rows = sqlx::query_as::<_, NamespaceRow>(
            "SELECT n.id, p.name AS project_name, n.name, n.config \
             FROM namespaces n JOIN projects p ON p.id = n.project_id \
             WHERE p.name = ? ORDER BY n.name",
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Namespace, e))?;
        rows.into_iter().map(NamespaceRow::into_spec).collect()
    }
}

#[async_trait]
impl SecretStore for SqliteTenantStore {
    async fn save(&self, project: &str, secret: &Secret) -> Result<()> {
        let project_id = support::project_id(&self.pool, project).await?;
        sqlx::query(
            "INSERT INTO secrets (project_id, name, value, namespace) VALUES (?, ?, ?, ?) \
             ON CONFLICT (project_id, name) DO UPDATE SET \
                 value = excluded.value, namespace = excluded.namespace",
        )
        .bind(project_id)
        .bind(&secret.name)
        .bind(&secret.value)
        .bind(&secret.namespace)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Secret, e))?;
        Ok(())
    }

    async fn get_all(&self, project: &str) -> Result<Vec<Secret>> {
        let rows: Vec<SecretRow> = sqlx::query_as(
            "SELECT s.name, s.value, s.namespace \
             FROM secrets s JOIN projects p ON p.id = s.project_id \
             WHERE p.name = ? ORDER BY s.name",
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Secret, e))?;
        Ok(rows.into_iter().map(SecretRow::into_secret).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    config: String,
}

impl ProjectRow {
    fn into_spec(self) -> Result<ProjectSpec> {
        Ok(ProjectSpec {
            id: self.id,
            name: self.name,
            config: from_json(Entity::Project, &self.config)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NamespaceRow {
    id: Uuid,
    project_name: String,
    name: String,
    config: String,
}

impl NamespaceRow {
    fn into_spec(self) -> Result<NamespaceSpec> {
        Ok(NamespaceSpec {
            id: self.id,
            project: self.project_name,
            name: self.name,
            config: from_json(Entity::Namespace, &self.config)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SecretRow {
    name: String,
    value: String,
    namespace: Option<String>,
}

impl SecretRow {
    fn into_secret(self) -> Secret {
        Secret { name: self.name, value: self.value, namespace: self.namespace }
    }
}
