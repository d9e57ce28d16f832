// Deployment Domain Model
//
// A deployment request asks the control plane to re-resolve one
// project's job graph and publish the compiled set to the scheduler.
// Requests are queued durably so a crash mid-deploy loses nothing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::project::ProjectName;

/// Lifecycle of a deployment request.
///
/// Queued -> InProgress -> Succeeded | Failed
/// Queued -> Superseded (a newer request for the same project arrived
/// before this one was claimed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeployStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Superseded,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Queued => "QUEUED",
            DeployStatus::InProgress => "IN_PROGRESS",
            DeployStatus::Succeeded => "SUCCEEDED",
            DeployStatus::Failed => "FAILED",
            DeployStatus::Superseded => "SUPERSEDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Succeeded | DeployStatus::Failed | DeployStatus::Superseded)
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One queued (or finished) deployment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub project: ProjectName,
    pub status: DeployStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
