//! Container records, owners and the DTOs handed back to callers.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default SSH port inside sandbox containers.
pub const DEFAULT_INTERNAL_PORT: u16 = 22;

/// Status of a container record, mirrored from the engine's state names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl ContainerStatus {
    pub const ALL: [ContainerStatus; 7] = [
        ContainerStatus::Created,
        ContainerStatus::Running,
        ContainerStatus::Paused,
        ContainerStatus::Restarting,
        ContainerStatus::Removing,
        ContainerStatus::Exited,
        ContainerStatus::Dead,
    ];

    /// Statuses that count against an owner's quota.
    pub const QUOTA_COUNTED: [ContainerStatus; 3] = [
        ContainerStatus::Created,
        ContainerStatus::Running,
        ContainerStatus::Paused,
    ];

    /// The engine's name for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
        }
    }

    /// Maps an engine status string, case-insensitively.
    ///
    /// Returns `None` for strings the engine is not documented to emit; see
    /// [`ContainerStatus::from_engine_status`] for the lossy variant.
    pub fn parse_engine_status(status: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(status.trim()))
    }

    /// Maps an engine status string, defaulting unrecognized values to `Exited`.
    pub fn from_engine_status(status: &str) -> Self {
        Self::parse_engine_status(status).unwrap_or(ContainerStatus::Exited)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ContainerStatus::Running | ContainerStatus::Restarting)
    }

    /// Whether an SSH session can be opened.
    pub fn can_connect(&self) -> bool {
        *self == ContainerStatus::Running
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_engine_status(s).ok_or_else(|| format!("unknown container status '{s}'"))
    }
}

/// The user owning containers. Only identity, name and enabled flag matter here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: i64,
    pub username: String,
    pub enabled: bool,
}

impl Owner {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            enabled: true,
        }
    }
}

/// A persisted container, independent of whether the engine object still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: i64,
    pub engine_id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub host_port: Option<u16>,
    pub internal_port: u16,
    pub env: BTreeMap<String, String>,
    /// Host port to container port.
    pub port_mappings: BTreeMap<u16, u16>,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl ContainerRecord {
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.status = ContainerStatus::Running;
        self.started_at = Some(at);
    }

    pub fn mark_stopped(&mut self, at: DateTime<Utc>) {
        self.status = ContainerStatus::Exited;
        self.stopped_at = Some(at);
    }
}

/// Fields of a record before the store assigns its id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContainerRecord {
    pub engine_id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub host_port: u16,
    pub internal_port: u16,
    pub env: BTreeMap<String, String>,
    pub owner_id: i64,
}

impl NewContainerRecord {
    pub fn port_mappings(&self) -> BTreeMap<u16, u16> {
        BTreeMap::from([(self.host_port, self.internal_port)])
    }
}

/// Provisioning request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerRequest {
    pub name: String,
    pub image: String,
    #[serde(default, alias = "env")]
    pub environment_variables: BTreeMap<String, String>,
}

impl CreateContainerRequest {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            environment_variables: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }
}

/// Container view returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDto {
    pub id: i64,
    pub container_id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub ssh_port: Option<u16>,
    pub internal_port: u16,
    pub environment_variables: BTreeMap<String, String>,
    pub port_mappings: BTreeMap<u16, u16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_connection_string: Option<String>,
}

impl ContainerDto {
    /// Builds the DTO; the SSH hint is only present when the status permits
    /// connecting and a host port is assigned.
    pub fn from_record(record: &ContainerRecord, username: &str, ssh_host: &str) -> Self {
        let ssh_connection_string = match record.host_port {
            Some(port) if record.status.can_connect() => {
                Some(format!("ssh -p {port} {username}@{ssh_host}"))
            }
            _ => None,
        };

        Self {
            id: record.id,
            container_id: record.engine_id.clone(),
            name: record.name.clone(),
            image: record.image.clone(),
            status: record.status,
            ssh_port: record.host_port,
            internal_port: record.internal_port,
            environment_variables: record.env.clone(),
            port_mappings: record.port_mappings.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            started_at: record.started_at,
            stopped_at: record.stopped_at,
            ssh_connection_string,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}

/// Per-owner container counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
}

impl ContainerStats {
    pub fn from_containers(containers: &[ContainerDto]) -> Self {
        let total = containers.len();
        let running = containers.iter().filter(|c| c.is_running()).count();
        Self {
            total,
            running,
            stopped: total - running,
        }
    }
}
