//! Parsing of container-runtime query output
//!
//! The docker CLI is queried with `docker ps --no-trunc --format '{{json .}}'`,
//! which prints one JSON object per container. Every field arrives as a string;
//! labels and ports are further packed into comma-separated lists.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::model::{ComposeLabels, ContainerRecord, ContainerStatus, PortMapping};

pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

#[derive(Debug, Error)]
pub enum ContainerParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// Raw shape of one `docker ps` JSON line. Only the fields we read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: Option<String>,
    names: Option<String>,
    image: Option<String>,
    state: Option<String>,
    status: Option<String>,
    ports: Option<String>,
    labels: Option<String>,
    created_at: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ContainerParseError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ContainerParseError::MissingField(field))
}

pub fn parse_ps_line(line: &str) -> Result<ContainerRecord, ContainerParseError> {
    let raw: PsLine = serde_json::from_str(line)?;

    let id = required(raw.id, "ID")?;
    let names = required(raw.names, "Names")?;
    let image = required(raw.image, "Image")?;

    // Containers on several networks can report more than one name
    let name = names.split(',').next().unwrap_or(&names).trim().to_string();

    let status = parse_status(raw.state.as_deref(), raw.status.as_deref().unwrap_or(""));
    let ports = raw.ports.as_deref().map(parse_ports).unwrap_or_default();
    let labels = raw.labels.as_deref().map(parse_labels).unwrap_or_default();
    let start_time = raw.created_at.as_deref().and_then(parse_created_at);

    Ok(ContainerRecord {
        id,
        name,
        image,
        status,
        ports,
        start_time,
        compose: compose_from_labels(&labels),
    })
}

/// Parse the whole output, skipping lines that do not describe a container.
pub fn parse_ps_output(output: &str) -> Vec<ContainerRecord> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| match parse_ps_line(line) {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("skipping container line: {}", e);
                None
            }
        })
        .collect()
}

/// `State` is authoritative when present; older runtimes only give the
/// human-readable `Status` ("Up 2 hours (Paused)", "Exited (0) 3 minutes ago").
pub fn parse_status(state: Option<&str>, status: &str) -> ContainerStatus {
    if let Some(state) = state.map(str::trim).filter(|s| !s.is_empty()) {
        return match state.to_lowercase().as_str() {
            "running" => ContainerStatus::Running,
            "exited" => ContainerStatus::Exited,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            other => ContainerStatus::Other(other.to_string()),
        };
    }

    let lower = status.trim().to_lowercase();
    if lower.starts_with("up") {
        if lower.contains("(paused)") {
            ContainerStatus::Paused
        } else {
            ContainerStatus::Running
        }
    } else if lower.starts_with("exited") {
        ContainerStatus::Exited
    } else if lower.starts_with("restarting") {
        ContainerStatus::Restarting
    } else if lower.is_empty() {
        ContainerStatus::Other("unknown".into())
    } else {
        ContainerStatus::Other(lower)
    }
}

/// `docker ps` joins labels as `k=v,k=v` without escaping. A segment with no
/// `=` is taken as the rest of the previous value, so `a=1,2` keeps `1,2`.
/// A value that itself contains `,k=v` is still split there.
pub fn parse_labels(labels: &str) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    let mut last: Option<String> = None;

    for part in labels.split(',') {
        match part.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => {
                let key = k.trim().to_string();
                out.insert(key.clone(), v.trim().to_string());
                last = Some(key);
            }
            _ => {
                if let Some(value) = last.as_ref().and_then(|k| out.get_mut(k)) {
                    value.push(',');
                    value.push_str(part.trim_end());
                }
            }
        }
    }
    out
}

/// Both labels present and non-empty, or nothing at all.
pub fn compose_from_labels(labels: &BTreeMap<String, String>) -> Option<ComposeLabels> {
    let project = labels.get(COMPOSE_PROJECT_LABEL).filter(|v| !v.is_empty())?;
    let service = labels.get(COMPOSE_SERVICE_LABEL).filter(|v| !v.is_empty())?;
    Some(ComposeLabels {
        project: project.clone(),
        service: service.clone(),
    })
}

/// Parse `0.0.0.0:5432->5432/tcp, :::5432->5432/tcp, 6379/tcp`.
///
/// Ranges (`8000-8001->8000-8001/tcp`) are expanded pairwise. The same
/// mapping bound on IPv4 and IPv6 is kept once, first occurrence wins.
pub fn parse_ports(ports: &str) -> Vec<PortMapping> {
    let mut out: Vec<PortMapping> = Vec::new();

    for entry in ports.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        for mapping in parse_port_entry(entry) {
            let duplicate = out.iter().any(|m| {
                m.host_port == mapping.host_port
                    && m.container_port == mapping.container_port
                    && m.protocol == mapping.protocol
            });
            if !duplicate {
                out.push(mapping);
            }
        }
    }

    out
}

fn parse_port_entry(entry: &str) -> Vec<PortMapping> {
    let (left, container_side) = match entry.split_once("->") {
        Some((host, container)) => (Some(host), container),
        None => (None, entry),
    };

    let (container_ports, protocol) = match container_side.split_once('/') {
        Some((ports, proto)) => (ports, proto.to_string()),
        None => (container_side, "tcp".to_string()),
    };
    let Some(container_range) = parse_range(container_ports) else {
        return vec![];
    };

    let Some(host) = left else {
        return container_range
            .map(|container_port| PortMapping {
                host_ip: None,
                host_port: None,
                container_port,
                protocol: protocol.clone(),
            })
            .collect();
    };

    // IPv6 hosts look like `:::8080` or `[::]:8080`; the port is after the last colon
    let (ip, host_ports) = match host.rsplit_once(':') {
        Some((ip, ports)) => (Some(ip), ports),
        None => (None, host),
    };
    let Some(host_range) = parse_range(host_ports) else {
        return vec![];
    };
    if host_range.len() != container_range.len() {
        return vec![];
    }

    let host_ip = ip
        .map(|ip| ip.trim_start_matches('[').trim_end_matches(']'))
        .filter(|ip| !ip.is_empty())
        .map(str::to_string);

    host_range
        .zip(container_range)
        .map(|(host_port, container_port)| PortMapping {
            host_ip: host_ip.clone(),
            host_port: Some(host_port),
            container_port,
            protocol: protocol.clone(),
        })
        .collect()
}

fn parse_range(s: &str) -> Option<std::ops::RangeInclusive<u16>> {
    let s = s.trim();
    match s.split_once('-') {
        Some((lo, hi)) => {
            let lo: u16 = lo.parse().ok()?;
            let hi: u16 = hi.parse().ok()?;
            (lo <= hi).then_some(lo..=hi)
        }
        None => {
            let p: u16 = s.parse().ok()?;
            Some(p..=p)
        }
    }
}

/// `2024-05-01 10:15:42 +0200 CEST` → UTC. The trailing zone abbreviation is
/// informational only; the numeric offset is what we trust.
pub fn parse_created_at(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let without_abbrev = match s.rsplit_once(' ') {
        Some((head, tail)) if tail.chars().all(|c| c.is_ascii_alphabetic()) => head,
        _ => s,
    };

    if let Ok(dt) = DateTime::parse_from_str(without_abbrev, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(without_abbrev, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
