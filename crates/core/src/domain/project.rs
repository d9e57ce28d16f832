// Project & Namespace Entities
//
// A project is the top-level tenant unit. Namespaces partition a project
// into team-owned slices; every job and resource belongs to exactly one
// namespace. Secrets are owned by the project and may optionally be
// scoped down to a single namespace.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Entity, Result};

/// Project name, unique across the control plane.
pub type ProjectName = String;

/// Namespace name, unique within its project.
pub type NamespaceName = String;

/// Top-level tenant unit carrying shared configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub id: Uuid,
    pub name: ProjectName,
    /// Free-form key/value configuration, e.g. scheduler host or
    /// environment identifiers. Must never be empty.
    pub config: BTreeMap<String, String>,
}

impl ProjectSpec {
    pub fn new(id: Uuid, name: impl Into<ProjectName>, config: BTreeMap<String, String>) -> Self {
        Self { id, name: name.into(), config }
    }
}

/// Team-owned slice of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    pub id: Uuid,
    /// Owning project, by name.
    pub project: ProjectName,
    pub name: NamespaceName,
    /// Overrides and additions on top of the project config.
    pub config: BTreeMap<String, String>,
}

impl NamespaceSpec {
    pub fn new(
        id: Uuid,
        project: impl Into<ProjectName>,
        name: impl Into<NamespaceName>,
        config: BTreeMap<String, String>,
    ) -> Self {
        Self { id, project: project.into(), name: name.into(), config }
    }

    /// Project config merged with this namespace's config.
    /// Namespace entries win on key collisions.
    pub fn merged_config(&self, project: &ProjectSpec) -> BTreeMap<String, String> {
        let mut merged = project.config.clone();
        for (key, value) in &self.config {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// Project-owned secret. The value is held base64-encoded; plaintext only
/// exists transiently while rendering plugin configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    /// Base64-encoded value.
    pub value: String,
    /// When set, the secret is only visible to jobs in this namespace.
    pub namespace: Option<NamespaceName>,
}

impl Secret {
    /// Builds a secret from a plaintext value, encoding it for storage.
    pub fn from_plaintext(
        name: impl Into<String>,
        plaintext: &str,
        namespace: Option<NamespaceName>,
    ) -> Self {
        let value = base64::engine::general_purpose::STANDARD.encode(plaintext.as_bytes());
        Self { name: name.into(), value, namespace }
    }

    /// Decodes the stored value back to plaintext.
    pub fn decoded_value(&self) -> Result<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.value.as_bytes())
            .map_err(|e| {
                AppError::invalid_argument(
                    Entity::Secret,
                    format!("secret {} is not valid base64: {}", self.name, e),
                )
            })?;
        String::from_utf8(bytes).map_err(|e| {
            AppError::invalid_argument(
                Entity::Secret,
                format!("secret {} is not valid utf-8: {}", self.name, e),
            )
        })
    }

    /// Whether this secret is visible to jobs in the given namespace.
    pub fn visible_in(&self, namespace: &str) -> bool {
        match &self.namespace {
            Some(scope) => scope == namespace,
            None => true,
        }
    }
}

// Secrets must never leak into logs through derived Debug output.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("namespace", &self.namespace)
            .finish()
    }
}
