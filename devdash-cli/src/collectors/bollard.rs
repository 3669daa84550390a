#![cfg(feature = "docker")]

//! Container source talking to the Docker Engine API directly.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::ListContainersOptions;
use bollard::models::ContainerSummary;
use chrono::DateTime;

use devdash_core::container::{compose_from_labels, parse_status};
use devdash_core::model::{ContainerRecord, PortMapping};
use devdash_core::source::{ContainerScan, ContainerSource};

pub struct DockerApiSource {
    client: Option<Docker>,
}

impl DockerApiSource {
    pub fn new() -> Self {
        let client = match Docker::connect_with_local_defaults() {
            Ok(client) => Some(client),
            Err(e) => {
                log::warn!("failed to connect to Docker: {}", e);
                None
            }
        };
        Self { client }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

fn to_record(summary: ContainerSummary) -> Option<ContainerRecord> {
    let id = summary.id?;
    let name = summary
        .names
        .and_then(|names| names.into_iter().next())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.chars().take(12).collect());

    let mut ports: Vec<PortMapping> = summary
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| {
            let protocol = p
                .typ
                .map(|t| t.to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "tcp".into());
            PortMapping {
                host_ip: p.ip,
                host_port: p.public_port,
                container_port: p.private_port,
                protocol,
            }
        })
        .collect();
    ports.sort_by(|a, b| {
        (a.container_port, a.host_port, &a.protocol).cmp(&(b.container_port, b.host_port, &b.protocol))
    });
    // IPv4 and IPv6 bindings of the same mapping show once
    ports.dedup_by(|a, b| {
        a.host_port == b.host_port && a.container_port == b.container_port && a.protocol == b.protocol
    });

    let labels: BTreeMap<String, String> = summary.labels.unwrap_or_default().into_iter().collect();

    Some(ContainerRecord {
        id,
        name,
        image: summary.image.unwrap_or_default(),
        status: parse_status(summary.state.as_deref(), summary.status.as_deref().unwrap_or("")),
        ports,
        start_time: summary.created.and_then(|t| DateTime::from_timestamp(t, 0)),
        compose: compose_from_labels(&labels),
    })
}

#[async_trait]
impl ContainerSource for DockerApiSource {
    async fn collect(&self) -> ContainerScan {
        let Some(client) = &self.client else {
            return ContainerScan::unavailable("no Docker connection");
        };

        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        match client.list_containers(Some(options)).await {
            Ok(summaries) => {
                ContainerScan::available(summaries.into_iter().filter_map(to_record).collect())
            }
            Err(e) => ContainerScan::unavailable(format!("Docker API error: {}", e)),
        }
    }

    async fn is_runtime_available(&self) -> bool {
        match &self.client {
            Some(client) => client.ping().await.is_ok(),
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "docker-api"
    }
}
