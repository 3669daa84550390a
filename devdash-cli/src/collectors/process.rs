use std::sync::Arc;

use async_trait::async_trait;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::sync::RwLock;

use devdash_core::model::{Pid, ProcessRecord};
use devdash_core::process::{RawProcess, RuntimeMatcher};
use devdash_core::source::ProcessSource;

use super::sockets::SocketBackend;

/// Dev processes from the OS process table, with their listening ports.
pub struct SysinfoProcessSource {
    sys: Arc<RwLock<System>>,
    matcher: RuntimeMatcher,
    sockets: SocketBackend,
}

impl SysinfoProcessSource {
    pub fn new(matcher: RuntimeMatcher) -> Self {
        Self {
            sys: Arc::new(RwLock::new(System::new())),
            matcher,
            sockets: SocketBackend::detect(),
        }
    }

    pub fn socket_backend(&self) -> SocketBackend {
        self.sockets
    }
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_cpu()
        .with_memory()
        .with_cmd(UpdateKind::OnlyIfNotSet)
        .with_cwd(UpdateKind::OnlyIfNotSet)
}

/// Everything in the table that belongs to the runtime family.
fn scan(sys: &System, matcher: &RuntimeMatcher) -> Vec<RawProcess> {
    let mut out = Vec::new();
    for (pid, process) in sys.processes() {
        // Linux lists threads as tasks; only whole processes count
        if process.thread_kind().is_some() {
            continue;
        }
        let name = process.name().to_string_lossy().into_owned();
        let cmdline: Vec<String> = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        if !matcher.matches(&name, &cmdline) {
            continue;
        }
        out.push(RawProcess {
            pid: pid.as_u32(),
            name,
            cmdline,
            cwd: process.cwd().map(|p| p.to_path_buf()),
            memory_bytes: process.memory(),
            cpu_percent: process.cpu_usage(),
            start_time_secs: process.start_time(),
        });
    }
    out
}

#[async_trait]
impl ProcessSource for SysinfoProcessSource {
    async fn collect(&self) -> Vec<ProcessRecord> {
        let sys = Arc::clone(&self.sys);
        let matcher = self.matcher.clone();
        let sockets = self.sockets;

        let result = tokio::task::spawn_blocking(move || {
            let raw = {
                let mut sys = sys.blocking_write();
                sys.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
                scan(&sys, &matcher)
            };

            // Pids that exit before the socket lookup simply get no ports
            let pids: Vec<Pid> = raw.iter().map(|p| p.pid).collect();
            let mut listeners = sockets.listeners(&pids);

            raw.into_iter()
                .map(|p| {
                    let ports = listeners.remove(&p.pid).unwrap_or_default();
                    p.into_record(ports)
                })
                .collect::<Vec<_>>()
        })
        .await;

        match result {
            Ok(processes) => processes,
            Err(e) => {
                log::error!("process scan task failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn own_exe_name() -> String {
        std::env::current_exe()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn test_collects_own_process() {
        let source = SysinfoProcessSource::new(RuntimeMatcher::new([own_exe_name()]));
        let records = source.collect().await;

        let me = std::process::id();
        let own: Vec<_> = records.iter().filter(|r| r.pid == me).collect();
        assert_eq!(own.len(), 1, "own pid listed once, threads skipped");

        let record = own[0];
        assert_eq!(
            record.working_directory.as_deref(),
            Some(std::env::current_dir().unwrap().as_path())
        );
        let started = record.start_time.expect("start time");
        assert!(started <= chrono::Utc::now());
        assert!(record.project_name.is_none());

        let unique: BTreeSet<_> = records.iter().map(|r| r.pid).collect();
        assert_eq!(unique.len(), records.len());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_own_listening_port_is_attached() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let source = SysinfoProcessSource::new(RuntimeMatcher::new([own_exe_name()]));
        if source.socket_backend() == SocketBackend::Unavailable {
            return;
        }
        let records = source.collect().await;
        let me = std::process::id();
        let record = records.iter().find(|r| r.pid == me).unwrap();
        assert!(record.listening_ports.contains(&port));
    }

    #[tokio::test]
    async fn test_unmatched_family_collects_nothing() {
        let source =
            SysinfoProcessSource::new(RuntimeMatcher::new(["devdash-no-such-runtime-xyz"]));
        assert!(source.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_collects_keep_cached_fields() {
        let source = SysinfoProcessSource::new(RuntimeMatcher::new([own_exe_name()]));
        let me = std::process::id();

        let first = source.collect().await;
        let second = source.collect().await;
        let cwd = |records: &[ProcessRecord]| {
            records
                .iter()
                .find(|r| r.pid == me)
                .and_then(|r| r.working_directory.clone())
        };
        assert!(cwd(&first).is_some());
        assert_eq!(cwd(&first), cwd(&second));
    }
}
