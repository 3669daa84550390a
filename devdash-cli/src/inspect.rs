//! Process details and container log following
//!
//! Both are opened from the dashboard on demand. Details are a one-off
//! sysinfo lookup. A log follower is a task that runs until its handle is
//! dropped.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use devdash_core::host::{ParentLink, ProcessDetails, descendants};
use devdash_core::model::{ContainerId, Pid, ProcessRecord, short_container_id};

use crate::collectors::DemoWorld;
use crate::collectors::sockets::SocketBackend;
use crate::poller::Update;

/// History requested when a log view opens.
const LOG_TAIL: &str = "100";
const DEMO_LOG_EVERY: Duration = Duration::from_millis(400);

#[async_trait]
pub trait Inspector: Send + Sync {
    /// `None` when the pid no longer exists.
    async fn process_details(&self, pid: Pid) -> Option<ProcessDetails>;

    /// Stream a container's output to the UI loop as `Update::Log`.
    fn follow_logs(&self, id: ContainerId, tx: mpsc::Sender<Update>) -> LogFollower;
}

/// A running log stream, keyed by container id. Dropping it cancels the
/// stream.
pub struct LogFollower {
    pub id: ContainerId,
    handle: JoinHandle<()>,
}

impl Drop for LogFollower {
    fn drop(&mut self) {
        // The docker child is kill_on_drop, so aborting the task ends it too
        self.handle.abort();
    }
}

/// The real machine: sysinfo for details, `docker logs -f` for output.
pub struct SystemInspector {
    binary: String,
    sockets: SocketBackend,
}

impl SystemInspector {
    pub fn new(sockets: SocketBackend) -> Self {
        Self {
            binary: "docker".into(),
            sockets,
        }
    }

    #[cfg(test)]
    fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

fn timestamp(secs: u64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        None
    } else {
        DateTime::<Utc>::from_timestamp(secs as i64, 0)
    }
}

fn inspect(pid: Pid, sockets: SocketBackend) -> Option<ProcessDetails> {
    let spid = sysinfo::Pid::from_u32(pid);
    let mut sys = System::new();

    // Parent links for the whole table first, for the child list
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
    let links: Vec<ParentLink> = sys
        .processes()
        .iter()
        .filter(|(_, p)| p.thread_kind().is_none())
        .map(|(pid, p)| ParentLink {
            pid: pid.as_u32(),
            parent: p.parent().map(|pp| pp.as_u32()),
            name: p.name().to_string_lossy().into_owned(),
        })
        .collect();

    let kind = ProcessRefreshKind::new()
        .with_cpu()
        .with_memory()
        .with_cmd(UpdateKind::Always)
        .with_cwd(UpdateKind::Always)
        .with_exe(UpdateKind::Always)
        .with_environ(UpdateKind::Always)
        .with_user(UpdateKind::Always);
    sys.refresh_processes_specifics(ProcessesToUpdate::Some(&[spid]), true, kind);
    // CPU usage is a delta between two refreshes
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[spid]),
        true,
        ProcessRefreshKind::new().with_cpu().with_memory(),
    );

    let process = sys.process(spid)?;
    let users = Users::new_with_refreshed_list();
    let listening_ports = sockets.listeners(&[pid]).remove(&pid).unwrap_or_default();

    Some(ProcessDetails {
        pid,
        name: process.name().to_string_lossy().into_owned(),
        status: process.status().to_string(),
        user: process
            .user_id()
            .and_then(|uid| users.get_user_by_id(uid))
            .map(|u| u.name().to_string()),
        parent: process.parent().map(|p| p.as_u32()),
        cwd: process.cwd().map(|p| p.to_path_buf()),
        exe: process.exe().map(|p| p.to_path_buf()),
        cmdline: process
            .cmd()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect(),
        cpu_percent: process.cpu_usage(),
        memory_bytes: process.memory(),
        virtual_memory_bytes: process.virtual_memory(),
        threads: process.tasks().map(|t| t.len()),
        start_time: timestamp(process.start_time()),
        listening_ports,
        children: descendants(pid, &links),
        environ: process
            .environ()
            .iter()
            .map(|e| e.to_string_lossy().into_owned())
            .collect(),
    })
}

/// Forward both output streams line by line until the child exits or the
/// receiver goes away.
async fn stream_logs(binary: String, id: ContainerId, tx: mpsc::Sender<Update>) {
    let spawned = Command::new(&binary)
        .args(["logs", "--tail", LOG_TAIL, "--follow", id.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let reason = format!("cannot run {}: {}", binary, e);
            let _ = tx.send(Update::LogEnded { id, reason }).await;
            return;
        }
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let reason = "no output pipes".to_string();
        let _ = tx.send(Update::LogEnded { id, reason }).await;
        return;
    };
    let mut out = BufReader::new(stdout).lines();
    let mut err = BufReader::new(stderr).lines();
    let (mut out_open, mut err_open) = (true, true);

    while out_open || err_open {
        let (line, from_stdout) = tokio::select! {
            line = out.next_line(), if out_open => (line, true),
            line = err.next_line(), if err_open => (line, false),
        };
        match line {
            Ok(Some(line)) => {
                let update = Update::Log {
                    id: id.clone(),
                    line,
                };
                if tx.send(update).await.is_err() {
                    return;
                }
            }
            Ok(None) | Err(_) if from_stdout => out_open = false,
            Ok(None) | Err(_) => err_open = false,
        }
    }

    let reason = match child.wait().await {
        Ok(status) if status.success() => "log stream closed".to_string(),
        Ok(status) => format!("docker logs exited with {}", status),
        Err(e) => e.to_string(),
    };
    log::debug!("logs of {} ended: {}", short_container_id(&id), reason);
    let _ = tx.send(Update::LogEnded { id, reason }).await;
}

#[async_trait]
impl Inspector for SystemInspector {
    async fn process_details(&self, pid: Pid) -> Option<ProcessDetails> {
        let sockets = self.sockets;
        match tokio::task::spawn_blocking(move || inspect(pid, sockets)).await {
            Ok(details) => details,
            Err(e) => {
                log::error!("inspecting PID {} failed: {}", pid, e);
                None
            }
        }
    }

    fn follow_logs(&self, id: ContainerId, tx: mpsc::Sender<Update>) -> LogFollower {
        log::info!("following logs of {}", short_container_id(&id));
        let handle = tokio::spawn(stream_logs(self.binary.clone(), id.clone(), tx));
        LogFollower { id, handle }
    }
}

/// Details and logs made up from the demo world.
pub struct DemoInspector {
    world: Arc<DemoWorld>,
}

impl DemoInspector {
    pub fn new(world: Arc<DemoWorld>) -> Self {
        Self { world }
    }
}

fn demo_details(record: ProcessRecord) -> ProcessDetails {
    let cmdline: Vec<String> = record.command.split_whitespace().map(String::from).collect();
    let children = if record.command.contains("vite") {
        vec![(record.pid + 1, "esbuild".to_string())]
    } else {
        Vec::new()
    };
    let mut environ = vec!["NODE_ENV=development".to_string()];
    if let Some(port) = record.listening_ports.first() {
        environ.push(format!("PORT={}", port));
    }

    ProcessDetails {
        pid: record.pid,
        status: "Sleeping".into(),
        user: Some("demo".into()),
        parent: Some(1),
        exe: Some("/usr/local/bin/node".into()),
        cmdline,
        cpu_percent: record.cpu_percent,
        memory_bytes: record.memory_bytes,
        virtual_memory_bytes: record.memory_bytes * 4,
        threads: Some(11),
        start_time: record.start_time,
        children,
        environ,
        name: record.name,
        cwd: record.working_directory,
        listening_ports: record.listening_ports,
    }
}

const DEMO_LOG_LINES: [&str; 6] = [
    "GET /health 200 2ms",
    "accepted connection from 172.18.0.1",
    "checkpoint complete: wrote 14 buffers",
    "GET /api/orders?page=2 200 31ms",
    "slow query took 412ms",
    "connection closed",
];

#[async_trait]
impl Inspector for DemoInspector {
    async fn process_details(&self, pid: Pid) -> Option<ProcessDetails> {
        self.world.process(pid).map(demo_details)
    }

    fn follow_logs(&self, id: ContainerId, tx: mpsc::Sender<Update>) -> LogFollower {
        let name = self
            .world
            .container(&id)
            .map(|c| c.name)
            .unwrap_or_else(|| short_container_id(&id).to_string());
        let stream_id = id.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(DEMO_LOG_EVERY);
            for n in 0u64.. {
                interval.tick().await;
                let message = DEMO_LOG_LINES[(n as usize) % DEMO_LOG_LINES.len()];
                let line = format!(
                    "{} {} | {}",
                    Utc::now().format("%H:%M:%S"),
                    name,
                    message
                );
                let update = Update::Log {
                    id: stream_id.clone(),
                    line,
                };
                if tx.send(update).await.is_err() {
                    break;
                }
            }
        });
        LogFollower { id, handle }
    }
}

pub fn spawn_inspect(inspector: Arc<dyn Inspector>, pid: Pid, tx: mpsc::Sender<Update>) {
    tokio::spawn(async move {
        let details = inspector.process_details(pid).await;
        let _ = tx.send(Update::Details { pid, details }).await;
    });
}
