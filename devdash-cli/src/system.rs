use std::path::Path;
use std::time::{Duration, Instant};

use sysinfo::{
    Disks, Networks, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users,
};
use tokio::sync::mpsc;

use devdash_core::host::{NetCounters, NetRateTracker, NetRates, SystemProcess};
use devdash_core::process::shorten_command;

use crate::poller::Update;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Host-wide numbers for the status bar and the System tab.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HostStats {
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub memory_used: u64,
    pub memory_total: u64,
    pub swap_used: u64,
    pub swap_total: u64,
    pub disk_used: u64,
    pub disk_total: u64,
    pub disk_percent: f64,
    /// `None` until two readings are available
    pub net: Option<NetRates>,
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

impl HostStats {
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used, self.memory_total)
    }

    pub fn swap_percent(&self) -> f64 {
        percent(self.swap_used, self.swap_total)
    }
}

pub struct HostSampler {
    system: System,
    networks: Networks,
    users: Users,
    rates: NetRateTracker,
}

impl HostSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            users: Users::new_with_refreshed_list(),
            rates: NetRateTracker::new(),
        }
    }

    pub fn sample(&mut self) -> HostStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.networks.refresh();

        let counters = self
            .networks
            .list()
            .values()
            .fold(NetCounters::default(), |acc, data| NetCounters {
                received: acc.received.saturating_add(data.total_received()),
                transmitted: acc.transmitted.saturating_add(data.total_transmitted()),
            });
        let (disk_used, disk_total) = root_disk_usage();

        HostStats {
            cpu_percent: self.system.global_cpu_usage(),
            cpu_count: self.system.cpus().len(),
            memory_used: self.system.used_memory(),
            memory_total: self.system.total_memory(),
            swap_used: self.system.used_swap(),
            swap_total: self.system.total_swap(),
            disk_used,
            disk_total,
            disk_percent: percent(disk_used, disk_total),
            net: self.rates.update(Instant::now(), counters),
        }
    }

    /// Every process on the host. Row limits are applied by the view.
    pub fn processes(&mut self) -> Vec<SystemProcess> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_cpu()
                .with_memory()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_user(UpdateKind::OnlyIfNotSet),
        );
        let total_memory = self.system.total_memory();

        self.system
            .processes()
            .iter()
            .filter(|(_, p)| p.thread_kind().is_none())
            .map(|(pid, p)| {
                let name = p.name().to_string_lossy().into_owned();
                let cmdline: Vec<String> = p
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect();
                SystemProcess {
                    pid: pid.as_u32(),
                    command: if cmdline.is_empty() {
                        name.clone()
                    } else {
                        shorten_command(&cmdline)
                    },
                    name,
                    user: p
                        .user_id()
                        .and_then(|uid| self.users.get_user_by_id(uid))
                        .map(|u| u.name().to_string()),
                    status: p.status().to_string(),
                    memory_bytes: p.memory(),
                    memory_percent: percent(p.memory(), total_memory) as f32,
                    cpu_percent: p.cpu_usage(),
                }
            })
            .collect()
    }

    pub async fn run(mut self, tx: mpsc::Sender<Update>) {
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let stats = self.sample();
            let processes = self.processes();
            if tx.send(Update::Host(stats)).await.is_err()
                || tx.send(Update::System(processes)).await.is_err()
            {
                break;
            }
        }
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Used and total bytes of the disk mounted at `/`, or of the largest disk
/// when there is no root mount (Windows).
fn root_disk_usage() -> (u64, u64) {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));

    match disk {
        Some(d) => (
            d.total_space().saturating_sub(d.available_space()),
            d.total_space(),
        ),
        None => (0, 0),
    }
}

pub fn spawn_host_sampler(tx: mpsc::Sender<Update>) {
    let sampler = HostSampler::new();
    tokio::spawn(async move {
        sampler.run(tx).await;
    });
}
