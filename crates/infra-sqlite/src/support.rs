// Shared SQLite Helpers

use gantry_core::error::{AppError, Entity, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(entity: Entity, err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // Extract database-specific error code and message
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        // UNIQUE constraint failed
                        AppError::already_exists(entity, db_err.message().to_string())
                    }
                    "787" | "3850" => {
                        // FOREIGN KEY constraint failed
                        AppError::invalid_argument(
                            entity,
                            format!("foreign key violation: {}", db_err.message()),
                        )
                    }
                    "5" => {
                        // SQLITE_BUSY - database is locked
                        AppError::internal(
                            entity,
                            format!("database locked (SQLITE_BUSY): {}", db_err.message()),
                        )
                    }
                    _ => AppError::internal(
                        entity,
                        format!("database error [{}]: {}", code_str, db_err.message()),
                    ),
                }
            } else {
                AppError::internal(entity, format!("database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::not_found(entity, "row not found"),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::internal(entity, format!("column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::internal(entity, err.to_string()),
    }
}

/// Storage id of a project, by name.
pub(crate) async fn project_id(pool: &SqlitePool, project: &str) -> Result<Uuid> {
    let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM projects WHERE name = ?")
        .bind(project)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error(Entity::Project, e))?;
    id.ok_or_else(|| AppError::not_found(Entity::Project, project.to_string()))
}

/// Storage id of a namespace within a project.
pub(crate) async fn namespace_id(
    pool: &SqlitePool,
    project_id: Uuid,
    project: &str,
    namespace: &str,
) -> Result<Uuid> {
    let id: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM namespaces WHERE project_id = ? AND name = ?")
            .bind(project_id)
            .bind(namespace)
            .fetch_optional(pool)
            .await
            .map_err(|e| map_sqlx_error(Entity::Namespace, e))?;
    id.ok_or_else(|| {
        AppError::not_found(Entity::Namespace, format!("{}/{}", project, namespace))
    })
}

/// Encodes a spec-shaped field into its JSON column representation.
pub(crate) fn to_json<T: Serialize>(entity: Entity, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::internal(entity, format!("encode json column: {}", e)))
}

/// Decodes a JSON column back into its spec-shaped field. A row that no
/// longer parses is surfaced as corruption, not silently defaulted.
pub(crate) fn from_json<T: DeserializeOwned>(entity: Entity, raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::internal(entity, format!("decode json column: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::error::ErrorKind;

    #[test]
    fn test_from_json_reports_corruption() {
        let err = from_json::<Vec<String>>(Entity::Job, "not-json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.entity(), Entity::Job);
    }

    #[test]
    fn test_json_round_trip() {
        let encoded = to_json(Entity::Job, &vec!["a".to_string(), "b".to_string()]).unwrap();
        let decoded: Vec<String> = from_json(Entity::Job, &encoded).unwrap();
        assert_eq!(decoded, vec!["a".to_string(), "b".to_string()]);
    }
}
