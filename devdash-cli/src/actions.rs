//! Kill and stop actions
//!
//! Every action is addressed by identity (pid or container id), never by row
//! position, and runs in its own task. The outcome comes back to the UI loop
//! as a notification.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sysinfo::{ProcessStatus, ProcessesToUpdate, Signal, System};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;

use devdash_core::model::{Pid, short_container_id};
use devdash_core::notify::Notification;

use crate::collectors::DemoWorld;
use crate::poller::Update;

/// How long a process gets to exit after SIGTERM.
const TERM_GRACE: Duration = Duration::from_secs(3);
const KILL_GRACE: Duration = Duration::from_secs(1);
const STOP_BUDGET: Duration = Duration::from_secs(15);
const POLL_EVERY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("PID {0} is not running")]
    NoSuchProcess(Pid),
    #[error("cannot signal PID {pid}: permission denied or unsupported")]
    SignalFailed { pid: Pid },
    #[error("PID {0} survived SIGKILL")]
    StillRunning(Pid),
    #[error("docker stop {id} failed: {message}")]
    Docker { id: String, message: String },
    #[error("docker stop {0} timed out")]
    Timeout(String),
}

#[async_trait]
pub trait Actions: Send + Sync {
    async fn kill_process(&self, pid: Pid) -> Result<(), ActionError>;
    async fn stop_container(&self, id: &str) -> Result<(), ActionError>;
}

/// Real processes and the docker CLI.
pub struct SystemActions;

fn signal(pid: Pid, signal: Signal) -> Result<(), ActionError> {
    let mut sys = System::new();
    let spid = sysinfo::Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[spid]), true);
    let process = sys.process(spid).ok_or(ActionError::NoSuchProcess(pid))?;

    let delivered = match process.kill_with(signal) {
        Some(delivered) => delivered,
        // Platform has no such signal; fall back to its hard kill
        None => process.kill(),
    };
    if delivered {
        Ok(())
    } else {
        Err(ActionError::SignalFailed { pid })
    }
}

fn is_alive(pid: Pid) -> bool {
    let mut sys = System::new();
    let spid = sysinfo::Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[spid]), true);
    sys.process(spid)
        .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
}

async fn wait_for_exit(pid: Pid, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        tokio::time::sleep(POLL_EVERY).await;
    }
    !is_alive(pid)
}

#[async_trait]
impl Actions for SystemActions {
    async fn kill_process(&self, pid: Pid) -> Result<(), ActionError> {
        signal(pid, Signal::Term)?;
        if wait_for_exit(pid, TERM_GRACE).await {
            return Ok(());
        }

        log::warn!("PID {} ignored SIGTERM, sending SIGKILL", pid);
        match signal(pid, Signal::Kill) {
            Ok(()) => {}
            // exited between the last check and the signal
            Err(ActionError::NoSuchProcess(_)) => return Ok(()),
            Err(e) => return Err(e),
        }
        if wait_for_exit(pid, KILL_GRACE).await {
            Ok(())
        } else {
            Err(ActionError::StillRunning(pid))
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), ActionError> {
        let short = short_container_id(id).to_string();
        let output = Command::new("docker")
            .args(["stop", id])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(STOP_BUDGET, output).await {
            Err(_) => Err(ActionError::Timeout(short)),
            Ok(Err(e)) => Err(ActionError::Docker {
                id: short,
                message: e.to_string(),
            }),
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(ActionError::Docker {
                id: short,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

/// Removes things from the demo world instead of touching the machine.
pub struct DemoActions {
    world: Arc<DemoWorld>,
}

impl DemoActions {
    pub fn new(world: Arc<DemoWorld>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl Actions for DemoActions {
    async fn kill_process(&self, pid: Pid) -> Result<(), ActionError> {
        if self.world.kill(pid) {
            Ok(())
        } else {
            Err(ActionError::NoSuchProcess(pid))
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), ActionError> {
        if self.world.stop(id) {
            Ok(())
        } else {
            Err(ActionError::Docker {
                id: short_container_id(id).to_string(),
                message: "already stopped".into(),
            })
        }
    }
}

pub fn kill_result(pid: Pid, result: &Result<(), ActionError>) -> Notification {
    match result {
        Ok(()) => Notification::success(format!("Killed PID {}", pid)),
        Err(e) => Notification::error(format!("Failed to kill PID {}: {}", pid, e)),
    }
}

pub fn stop_result(id: &str, result: &Result<(), ActionError>) -> Notification {
    match result {
        Ok(()) => Notification::success(format!("Stopped container {}", short_container_id(id))),
        Err(e) => Notification::error(format!("Failed to stop container: {}", e)),
    }
}

/// One task per pid; each result is reported separately.
pub fn spawn_kill(actions: Arc<dyn Actions>, pids: Vec<Pid>, tx: mpsc::Sender<Update>) {
    for pid in pids {
        let actions = Arc::clone(&actions);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = actions.kill_process(pid).await;
            match &result {
                Ok(()) => log::info!("killed PID {}", pid),
                Err(e) => log::warn!("kill PID {} failed: {}", pid, e),
            }
            let _ = tx.send(Update::Action(kill_result(pid, &result))).await;
        });
    }
}

pub fn spawn_stop(actions: Arc<dyn Actions>, ids: Vec<String>, tx: mpsc::Sender<Update>) {
    for id in ids {
        let actions = Arc::clone(&actions);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = actions.stop_container(&id).await;
            match &result {
                Ok(()) => log::info!("stopped container {}", short_container_id(&id)),
                Err(e) => log::warn!("{}", e),
            }
            let _ = tx.send(Update::Action(stop_result(&id, &result))).await;
        });
    }
}
