//! Demo sources with deterministic churn, for running without node or docker.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use devdash_core::model::{
    ComposeLabels, ContainerRecord, ContainerStatus, Pid, PortMapping, ProcessRecord,
};
use devdash_core::resolver::ManifestReader;
use devdash_core::source::{ContainerScan, ContainerSource, ProcessSource};

/// State shared by the demo sources and demo actions.
#[derive(Default)]
pub struct DemoWorld {
    inner: Mutex<WorldState>,
}

#[derive(Default)]
struct WorldState {
    process_ticks: u64,
    container_ticks: u64,
    killed: BTreeSet<Pid>,
    stopped: BTreeSet<String>,
    /// What the last collection returned
    processes: Vec<ProcessRecord>,
    containers: Vec<ContainerRecord>,
}

impl DemoWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn kill(&self, pid: Pid) -> bool {
        match self.inner.lock() {
            Ok(mut state) => state.killed.insert(pid),
            Err(_) => false,
        }
    }

    pub fn stop(&self, id: &str) -> bool {
        match self.inner.lock() {
            Ok(mut state) => state.stopped.insert(id.to_string()),
            Err(_) => false,
        }
    }

    /// A process from the latest demo cycle.
    pub fn process(&self, pid: Pid) -> Option<ProcessRecord> {
        let state = self.inner.lock().ok()?;
        state.processes.iter().find(|p| p.pid == pid).cloned()
    }

    pub fn container(&self, id: &str) -> Option<ContainerRecord> {
        let state = self.inner.lock().ok()?;
        state.containers.iter().find(|c| c.id == id).cloned()
    }
}

/// Resolves `/demo/<project>/...` to `<project>`.
pub struct DemoManifestReader;

impl ManifestReader for DemoManifestReader {
    fn read_name(&self, dir: &Path) -> Option<String> {
        let rest = dir.strip_prefix("/demo").ok()?;
        let mut parts = rest.components();
        let name = parts.next()?;
        parts
            .next()
            .is_none()
            .then(|| name.as_os_str().to_string_lossy().into_owned())
    }
}

fn demo_process(
    pid: Pid,
    project: &str,
    script: &str,
    ports: &[u16],
    tick: u64,
    base_mb: u64,
    base_cpu: f32,
) -> ProcessRecord {
    let cpu = base_cpu + ((tick % 10) as f32 * 1.5) - 5.0;
    let memory = (base_mb + (tick % 20) * 3) * 1024 * 1024;
    ProcessRecord {
        pid,
        name: "node".into(),
        command: format!("node {}", script),
        working_directory: Some(PathBuf::from("/demo").join(project)),
        listening_ports: ports.iter().copied().collect(),
        memory_bytes: memory,
        cpu_percent: cpu.max(0.1),
        start_time: Some(Utc::now() - ChronoDuration::seconds(600 + pid as i64)),
        project_name: None,
    }
}

pub struct DemoProcessSource {
    world: Arc<DemoWorld>,
}

impl DemoProcessSource {
    pub fn new(world: Arc<DemoWorld>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl ProcessSource for DemoProcessSource {
    async fn collect(&self) -> Vec<ProcessRecord> {
        let Ok(mut state) = self.world.inner.lock() else {
            return Vec::new();
        };
        state.process_ticks += 1;
        let tick = state.process_ticks;

        let mut processes = vec![
            demo_process(41000, "storefront-api", "dist/server.js", &[3000, 9229], tick, 180, 12.0),
            demo_process(41100, "storefront-web", "node_modules/.bin/vite", &[5173], tick, 240, 6.0),
            demo_process(41200, "storefront-web", "node_modules/.bin/tsc --watch", &[], tick, 90, 2.0),
        ];

        // The worker restarts every 6 ticks and comes back with a fresh pid
        let generation = tick / 6;
        if tick % 6 != 5 {
            processes.push(demo_process(
                42000 + generation as Pid,
                "jobs",
                "worker.js",
                &[],
                tick,
                620,
                35.0,
            ));
        }

        // A preview server comes and goes, grabbing port 4173
        if tick % 10 >= 4 {
            processes.push(demo_process(43000, "storefront-web", "vite preview", &[4173], tick, 70, 1.0));
        }

        processes.retain(|p| !state.killed.contains(&p.pid));
        state.processes = processes.clone();
        processes
    }
}

fn demo_container(
    id: &str,
    name: &str,
    image: &str,
    ports: &[(u16, u16)],
    compose: Option<(&str, &str)>,
) -> ContainerRecord {
    ContainerRecord {
        id: format!("{:0<64}", id),
        name: name.into(),
        image: image.into(),
        status: ContainerStatus::Running,
        ports: ports
            .iter()
            .map(|&(host, container)| PortMapping {
                host_ip: Some("0.0.0.0".into()),
                host_port: Some(host),
                container_port: container,
                protocol: "tcp".into(),
            })
            .collect(),
        start_time: Some(Utc::now() - ChronoDuration::hours(2)),
        compose: compose.map(|(project, service)| ComposeLabels {
            project: project.into(),
            service: service.into(),
        }),
    }
}

pub struct DemoContainerSource {
    world: Arc<DemoWorld>,
}

impl DemoContainerSource {
    pub fn new(world: Arc<DemoWorld>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl ContainerSource for DemoContainerSource {
    async fn collect(&self) -> ContainerScan {
        let Ok(mut state) = self.world.inner.lock() else {
            return ContainerScan::unavailable("demo state poisoned");
        };
        state.container_ticks += 1;
        let tick = state.container_ticks;

        // A short daemon outage now and then
        if tick % 25 == 20 {
            return ContainerScan::unavailable("Cannot connect to the Docker daemon (demo outage)");
        }

        let mut containers = vec![
            demo_container("5ca1ab1e", "storefront-db-1", "postgres:16", &[(5432, 5432)], Some(("storefront", "db"))),
            demo_container("c0ffee", "storefront-cache-1", "redis:7", &[(6379, 6379)], Some(("storefront", "cache"))),
            demo_container("bada55", "jobs-queue-1", "rabbitmq:3-management", &[(5672, 5672), (15672, 15672)], Some(("jobs", "queue"))),
        ];
        if tick % 14 < 7 {
            containers.push(demo_container("facade", "mailpit", "axllent/mailpit", &[(8025, 8025)], None));
        }

        containers.retain(|c| !state.stopped.contains(&c.id));
        state.containers = containers.clone();
        ContainerScan::available(containers)
    }

    async fn is_runtime_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}
