// Job Event Domain Model
//
// Events arrive from the scheduler callback surface (job failed, SLA
// missed, job succeeded) and are routed to notification receivers.
// Routing is declared per job via NotifyRule; the route pairs a
// receiver with the auth token needed to reach it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::job::JobName;
use crate::domain::project::{NamespaceName, ProjectName};
use crate::error::{AppError, Entity, Result};

/// Event classes the scheduler reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventType {
    Failure,
    SlaMiss,
    Success,
}

impl fmt::Display for JobEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobEventType::Failure => "failure",
            JobEventType::SlaMiss => "sla_miss",
            JobEventType::Success => "success",
        };
        write!(f, "{}", name)
    }
}

/// One event reported for a job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub project: ProjectName,
    pub namespace: NamespaceName,
    pub job_name: JobName,
    pub event_type: JobEventType,
    /// Scheduler-provided payload, passed through untouched. SLA-miss
    /// events carry a `slas` array of per-breach objects.
    pub attributes: serde_json::Value,
}

impl JobEvent {
    pub fn new(
        project: impl Into<ProjectName>,
        namespace: impl Into<NamespaceName>,
        job_name: impl Into<JobName>,
        event_type: JobEventType,
    ) -> Self {
        Self {
            project: project.into(),
            namespace: namespace.into(),
            job_name: job_name.into(),
            event_type,
            attributes: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Per-breach objects of an SLA-miss event, empty for other types.
    pub fn sla_breaches(&self) -> Vec<serde_json::Value> {
        match self.attributes.get("slas") {
            Some(serde_json::Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

/// Notification receiver. Parsed from channel strings such as
/// `slack://#oncall`, `slack://@data-platform` or `email://team@corp.io`;
/// the scheme prefix is dropped.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Receiver {
    Channel(String),
    UserGroup(String),
    Email(String),
}

impl Receiver {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = match raw.split_once("://") {
            Some((_, rest)) => rest,
            None => raw,
        };
        if let Some(name) = raw.strip_prefix('#') {
            if name.is_empty() {
                return Err(AppError::invalid_argument(Entity::Job, "empty channel receiver"));
            }
            return Ok(Receiver::Channel(name.to_string()));
        }
        if let Some(name) = raw.strip_prefix('@') {
            if name.is_empty() {
                return Err(AppError::invalid_argument(Entity::Job, "empty user-group receiver"));
            }
            return Ok(Receiver::UserGroup(name.to_string()));
        }
        if raw.contains('@') {
            return Ok(Receiver::Email(raw.to_string()));
        }
        Err(AppError::invalid_argument(
            Entity::Job,
            format!("unrecognized receiver {:?}: expected #channel, @group or an email", raw),
        ))
    }
}

impl fmt::Display for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Receiver::Channel(name) => write!(f, "#{}", name),
            Receiver::UserGroup(name) => write!(f, "@{}", name),
            Receiver::Email(addr) => write!(f, "{}", addr),
        }
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Receiver({})", self)
    }
}

/// Receiver plus the auth token used to reach it. Used as the batching
/// key in the notifier, so equality covers both fields.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub receiver: Receiver,
    pub auth_token: String,
}

impl Route {
    pub fn new(receiver: Receiver, auth_token: impl Into<String>) -> Self {
        Self { receiver, auth_token: auth_token.into() }
    }
}

// The token must never appear in logs or error reports.
impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("receiver", &self.receiver)
            .field("auth_token", &"*redacted*")
            .finish()
    }
}

/// Rendered batch handed to a notification transport: one block per
/// event (SLA misses may expand into several).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchMessage {
    pub blocks: Vec<String>,
}
