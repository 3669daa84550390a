use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OS process id. Only meaningful within a single snapshot: the OS recycles them.
pub type Pid = u32;

/// Container id as reported by the runtime (full, untruncated).
pub type ContainerId = String;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub name: String,
    pub command: String,
    pub working_directory: Option<PathBuf>,
    pub listening_ports: BTreeSet<u16>,
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    pub start_time: Option<DateTime<Utc>>,
    /// Filled in by the correlator; collectors leave it `None`.
    pub project_name: Option<String>,
}

impl ProcessRecord {
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn binds(&self, port: u16) -> bool {
        self.listening_ports.contains(&port)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Exited,
    Paused,
    Restarting,
    Other(String),
}

impl ContainerStatus {
    pub fn label(&self) -> &str {
        match self {
            ContainerStatus::Running => "running",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One published port: `host_ip:host_port -> container_port/protocol`.
/// Exposed-but-unpublished ports have no host side.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_ip: Option<String>,
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: String,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host_port {
            Some(host) => write!(f, "{}->{}/{}", host, self.container_port, self.protocol),
            None => write!(f, "{}/{}", self.container_port, self.protocol),
        }
    }
}

/// Compose labels always travel as a pair.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComposeLabels {
    pub project: String,
    pub service: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub ports: Vec<PortMapping>,
    pub start_time: Option<DateTime<Utc>>,
    pub compose: Option<ComposeLabels>,
}

impl ContainerRecord {
    pub fn compose_project(&self) -> Option<&str> {
        self.compose.as_ref().map(|c| c.project.as_str())
    }

    pub fn compose_service(&self) -> Option<&str> {
        self.compose.as_ref().map(|c| c.service.as_str())
    }

    pub fn short_id(&self) -> &str {
        short_container_id(&self.id)
    }
}

pub fn short_container_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// One fully-correlated point-in-time view. Never mutated after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub processes: BTreeMap<Pid, ProcessRecord>,
    pub containers: BTreeMap<ContainerId, ContainerRecord>,
}

impl Snapshot {
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            processes: BTreeMap::new(),
            containers: BTreeMap::new(),
        }
    }

    pub fn process(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.processes.get(&pid)
    }

    pub fn container(&self, id: &str) -> Option<&ContainerRecord> {
        self.containers.get(id)
    }

    pub fn pids(&self) -> BTreeSet<Pid> {
        self.processes.keys().copied().collect()
    }

    pub fn container_ids(&self) -> BTreeSet<ContainerId> {
        self.containers.keys().cloned().collect()
    }
}
