//! Whole-machine view
//!
//! The System tab lists every process on the host, not only the runtime
//! family, next to network throughput. The details view digs into a single
//! pid on demand.

use std::cmp::Ordering;
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::format::{format_bytes, format_memory_mb, format_percent, format_ports, uptime_since};
use crate::model::Pid;
use crate::process::shorten_home;
use crate::view::{DisplayContext, TableRow, ViewState, cmp_opt_text, cmp_text};

/// Environment entries listed in the details view.
pub const MAX_ENV_LINES: usize = 30;
const MAX_ENV_VALUE: usize = 80;

/// Any process on the host.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemProcess {
    pub pid: Pid,
    pub name: String,
    pub user: Option<String>,
    pub status: String,
    pub command: String,
    pub memory_bytes: u64,
    /// Share of total physical memory
    pub memory_percent: f32,
    pub cpu_percent: f32,
}

impl SystemProcess {
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemColumn {
    Pid,
    Name,
    Cpu,
    Memory,
    MemoryPercent,
    User,
    Status,
    Command,
}

impl SystemColumn {
    pub const ALL: [SystemColumn; 8] = [
        SystemColumn::Pid,
        SystemColumn::Name,
        SystemColumn::Cpu,
        SystemColumn::Memory,
        SystemColumn::MemoryPercent,
        SystemColumn::User,
        SystemColumn::Status,
        SystemColumn::Command,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            SystemColumn::Pid => "PID",
            SystemColumn::Name => "Name",
            SystemColumn::Cpu => "CPU",
            SystemColumn::Memory => "Memory",
            SystemColumn::MemoryPercent => "Mem %",
            SystemColumn::User => "User",
            SystemColumn::Status => "Status",
            SystemColumn::Command => "Command",
        }
    }
}

impl TableRow for SystemProcess {
    type Id = Pid;
    type Column = SystemColumn;

    fn row_id(&self) -> Pid {
        self.pid
    }

    fn cells(&self, _ctx: &DisplayContext) -> Vec<String> {
        vec![
            self.pid.to_string(),
            self.name.clone(),
            format_percent(self.cpu_percent),
            format_memory_mb(self.memory_mb()),
            format_percent(self.memory_percent),
            self.user.clone().unwrap_or_else(|| "-".into()),
            self.status.clone(),
            self.command.clone(),
        ]
    }

    fn compare_by(&self, other: &Self, column: SystemColumn) -> Ordering {
        match column {
            SystemColumn::Pid => self.pid.cmp(&other.pid),
            SystemColumn::Name => cmp_text(&self.name, &other.name),
            SystemColumn::Cpu => self.cpu_percent.total_cmp(&other.cpu_percent),
            SystemColumn::Memory => self.memory_bytes.cmp(&other.memory_bytes),
            SystemColumn::MemoryPercent => self.memory_percent.total_cmp(&other.memory_percent),
            SystemColumn::User => cmp_opt_text(self.user.as_deref(), other.user.as_deref()),
            SystemColumn::Status => cmp_text(&self.status, &other.status),
            SystemColumn::Command => cmp_text(&self.command, &other.command),
        }
    }

    fn default_order(&self, other: &Self) -> Ordering {
        other.memory_bytes.cmp(&self.memory_bytes)
    }
}

pub type SystemView = ViewState<SystemProcess>;

/// Byte totals across all interfaces since boot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub received: u64,
    pub transmitted: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetRates {
    pub received_per_sec: f64,
    pub transmitted_per_sec: f64,
}

/// Turns successive counter readings into per-second rates.
#[derive(Debug, Default)]
pub struct NetRateTracker {
    last: Option<(Instant, NetCounters)>,
}

impl NetRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` for the first reading and when no time has passed.
    pub fn update(&mut self, at: Instant, counters: NetCounters) -> Option<NetRates> {
        let (then, before) = self.last.replace((at, counters))?;
        let secs = at.checked_duration_since(then)?.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        // Totals drop when an interface disappears
        Some(NetRates {
            received_per_sec: counters.received.saturating_sub(before.received) as f64 / secs,
            transmitted_per_sec: counters.transmitted.saturating_sub(before.transmitted) as f64
                / secs,
        })
    }
}

/// Row of the process table used to find descendants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentLink {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub name: String,
}

/// Every process below `root` in the parent tree, ordered by pid.
pub fn descendants(root: Pid, table: &[ParentLink]) -> Vec<(Pid, String)> {
    let mut seen = BTreeSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut out = Vec::new();

    while let Some(parent) = queue.pop_front() {
        for link in table.iter().filter(|l| l.parent == Some(parent)) {
            if seen.insert(link.pid) {
                out.push((link.pid, link.name.clone()));
                queue.push_back(link.pid);
            }
        }
    }

    out.sort();
    out
}

/// Everything known about one pid at the moment it was inspected.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessDetails {
    pub pid: Pid,
    pub name: String,
    pub status: String,
    pub user: Option<String>,
    pub parent: Option<Pid>,
    pub cwd: Option<PathBuf>,
    pub exe: Option<PathBuf>,
    pub cmdline: Vec<String>,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub virtual_memory_bytes: u64,
    pub threads: Option<usize>,
    pub start_time: Option<DateTime<Utc>>,
    pub listening_ports: BTreeSet<u16>,
    pub children: Vec<(Pid, String)>,
    /// `KEY=value` entries
    pub environ: Vec<String>,
}

impl ProcessDetails {
    pub fn title(&self) -> String {
        format!("{} (PID {})", self.name, self.pid)
    }

    /// Text for the details view, one entry per line.
    pub fn lines(&self, home: Option<&Path>, now: DateTime<Utc>) -> Vec<String> {
        let path = |p: &Option<PathBuf>| {
            p.as_deref()
                .map(|p| shorten_home(p, home))
                .unwrap_or_else(|| "N/A".into())
        };
        let command = if self.cmdline.is_empty() {
            self.name.clone()
        } else {
            self.cmdline.join(" ")
        };

        let mut out = vec![
            format!("PID:      {}", self.pid),
            format!("Name:     {}", self.name),
            format!("Status:   {}", self.status),
            format!("User:     {}", self.user.as_deref().unwrap_or("N/A")),
            format!(
                "Parent:   {}",
                self.parent.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
            ),
            format!("CWD:      {}", path(&self.cwd)),
            format!("Exe:      {}", path(&self.exe)),
            format!("CPU:      {}", format_percent(self.cpu_percent)),
            format!(
                "RSS:      {}",
                format_memory_mb(self.memory_bytes as f64 / (1024.0 * 1024.0))
            ),
            format!("Virtual:  {}", format_bytes(self.virtual_memory_bytes)),
            format!(
                "Threads:  {}",
                self.threads.map(|n| n.to_string()).unwrap_or_else(|| "N/A".into())
            ),
            format!("Uptime:   {}", uptime_since(self.start_time, now)),
            format!("Ports:    {}", format_ports(self.listening_ports.iter().copied())),
            String::new(),
            format!("Command:  {}", command),
        ];

        if !self.children.is_empty() {
            out.push(String::new());
            out.push(format!("Children ({}):", self.children.len()));
            out.extend(
                self.children
                    .iter()
                    .map(|(pid, name)| format!("  PID {}: {}", pid, name)),
            );
        }

        if !self.environ.is_empty() {
            let mut env: Vec<&String> = self.environ.iter().collect();
            env.sort();
            out.push(String::new());
            out.push(format!(
                "Environment ({} vars, first {}):",
                env.len(),
                MAX_ENV_LINES.min(env.len())
            ));
            out.extend(
                env.into_iter()
                    .take(MAX_ENV_LINES)
                    .map(|entry| format!("  {}", clip_env(entry))),
            );
        }

        out
    }
}

fn clip_env(entry: &str) -> String {
    let Some((key, value)) = entry.split_once('=') else {
        return entry.to_string();
    };
    if value.chars().count() <= MAX_ENV_VALUE {
        return entry.to_string();
    }
    let kept: String = value.chars().take(MAX_ENV_VALUE - 3).collect();
    format!("{}={}...", key, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sys(pid: Pid, name: &str, mb: u64, cpu: f32) -> SystemProcess {
        SystemProcess {
            pid,
            name: name.into(),
            user: Some("dev".into()),
            status: "Sleeping".into(),
            command: name.into(),
            memory_bytes: mb * 1024 * 1024,
            memory_percent: mb as f32 / 160.0,
            cpu_percent: cpu,
        }
    }

    #[test]
    fn test_system_view_limits_after_filter() {
        let rows = vec![
            sys(1, "init", 10, 0.0),
            sys(2, "postgres", 500, 3.0),
            sys(3, "chrome", 900, 20.0),
            sys(4, "postgres", 50, 0.5),
        ];
        let ctx = DisplayContext::default();
        let mut view = SystemView::new().with_row_limit(2);

        let all = view.apply_rows(rows.iter().collect(), &ctx);
        assert_eq!(all.rows, vec![3, 2]);
        assert_eq!(all.total, 4);

        view.set_filter("postgres");
        let filtered = view.apply_rows(rows.iter().collect(), &ctx);
        assert_eq!(filtered.rows, vec![2, 4]);

        view.set_filter("");
        view.toggle_sort(SystemColumn::Cpu);
        let by_cpu = view.apply_rows(rows.iter().collect(), &ctx);
        assert_eq!(by_cpu.rows, vec![1, 4]);
    }

    #[test]
    fn test_net_rates_from_counters() {
        let mut tracker = NetRateTracker::new();
        let t0 = Instant::now();
        let first = NetCounters {
            received: 1_000,
            transmitted: 500,
        };
        assert_eq!(tracker.update(t0, first), None);

        let rates = tracker
            .update(
                t0 + Duration::from_secs(2),
                NetCounters {
                    received: 5_000,
                    transmitted: 700,
                },
            )
            .unwrap();
        assert_eq!(rates.received_per_sec, 2_000.0);
        assert_eq!(rates.transmitted_per_sec, 100.0);

        // An interface went away and the totals shrank
        let rates = tracker
            .update(t0 + Duration::from_secs(3), NetCounters::default())
            .unwrap();
        assert_eq!(rates.received_per_sec, 0.0);
    }

    #[test]
    fn test_descendants_walk_the_tree() {
        let link = |pid, parent, name: &str| ParentLink {
            pid,
            parent,
            name: name.into(),
        };
        let table = vec![
            link(1, None, "init"),
            link(10, Some(1), "npm"),
            link(12, Some(10), "node"),
            link(11, Some(10), "sh"),
            link(20, Some(12), "esbuild"),
            link(30, Some(1), "sshd"),
        ];
        assert_eq!(
            descendants(10, &table),
            vec![(11, "sh".into()), (12, "node".into()), (20, "esbuild".into())]
        );
        assert!(descendants(20, &table).is_empty());
    }

    #[test]
    fn test_details_lines() {
        let now = Utc::now();
        let details = ProcessDetails {
            pid: 4242,
            name: "node".into(),
            status: "Sleeping".into(),
            user: Some("dev".into()),
            parent: Some(1),
            cwd: Some("/home/dev/api".into()),
            cmdline: vec!["node".into(), "server.js".into()],
            memory_bytes: 64 * 1024 * 1024,
            start_time: Some(now - chrono::Duration::seconds(90)),
            listening_ports: [3000].into_iter().collect(),
            children: vec![(4300, "esbuild".into())],
            environ: vec![
                "PORT=3000".into(),
                format!("TOKEN={}", "x".repeat(200)),
                "NODE_ENV=development".into(),
            ],
            ..Default::default()
        };

        let lines = details.lines(Some(Path::new("/home/dev")), now);
        assert!(lines.contains(&"CWD:      ~/api".to_string()));
        assert!(lines.contains(&"Exe:      N/A".to_string()));
        assert!(lines.contains(&"RSS:      64 MB".to_string()));
        assert!(lines.contains(&"Uptime:   1m".to_string()));
        assert!(lines.contains(&"Ports:    3000".to_string()));
        assert!(lines.contains(&"Command:  node server.js".to_string()));
        assert!(lines.contains(&"  PID 4300: esbuild".to_string()));

        let env_at = lines
            .iter()
            .position(|l| l == "Environment (3 vars, first 3):")
            .unwrap();
        assert_eq!(lines[env_at + 1], "  NODE_ENV=development");
        assert_eq!(lines[env_at + 2], "  PORT=3000");
        assert!(lines[env_at + 3].ends_with("..."));
        assert_eq!(lines[env_at + 3].len(), "  TOKEN=".len() + MAX_ENV_VALUE);
    }
}
