//! Runtime-family filtering and process record shaping
//!
//! The OS gives us a flat process table; only processes of the runtime family
//! we care about (node by default) become `ProcessRecord`s.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::model::{Pid, ProcessRecord};

/// Longest command line kept on a record.
pub const MAX_COMMAND_LEN: usize = 120;

/// Decides which processes belong to the tracked runtime family.
#[derive(Clone, Debug)]
pub struct RuntimeMatcher {
    needles: Vec<String>,
}

impl RuntimeMatcher {
    pub fn new<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            needles: needles
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Label used in notifications ("node", "deno", ...).
    pub fn family_label(&self) -> &str {
        self.needles.first().map(String::as_str).unwrap_or("dev")
    }

    /// Name match first, then the basename of `argv[0]`.
    pub fn matches(&self, name: &str, cmdline: &[String]) -> bool {
        let name = name.to_lowercase();
        if self.needles.iter().any(|n| name.contains(n.as_str())) {
            return true;
        }

        let Some(argv0) = cmdline.first() else {
            return false;
        };
        let base = argv0.rsplit('/').next().unwrap_or(argv0).to_lowercase();
        self.needles.iter().any(|n| base.contains(n.as_str()))
    }
}

impl Default for RuntimeMatcher {
    fn default() -> Self {
        Self::new(["node"])
    }
}

/// What the OS reports about a process before correlation.
#[derive(Clone, Debug, Default)]
pub struct RawProcess {
    pub pid: Pid,
    pub name: String,
    pub cmdline: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    /// Seconds since the epoch; 0 when unknown.
    pub start_time_secs: u64,
}

impl RawProcess {
    pub fn into_record(self, listening_ports: BTreeSet<u16>) -> ProcessRecord {
        let start_time = if self.start_time_secs == 0 {
            None
        } else {
            DateTime::<Utc>::from_timestamp(self.start_time_secs as i64, 0)
        };

        let command = if self.cmdline.is_empty() {
            self.name.clone()
        } else {
            shorten_command(&self.cmdline)
        };

        ProcessRecord {
            pid: self.pid,
            name: self.name,
            command,
            working_directory: self.cwd.filter(|p| !p.as_os_str().is_empty()),
            listening_ports,
            memory_bytes: self.memory_bytes,
            cpu_percent: self.cpu_percent,
            start_time,
            project_name: None,
        }
    }
}

pub fn shorten_command(cmdline: &[String]) -> String {
    let cmd = cmdline.join(" ");
    if cmd.chars().count() > MAX_COMMAND_LEN {
        let head: String = cmd.chars().take(MAX_COMMAND_LEN - 3).collect();
        format!("{}...", head)
    } else {
        cmd
    }
}

/// `/home/me/src/api` → `~/src/api` when `home` is `/home/me`.
pub fn shorten_home(path: &Path, home: Option<&Path>) -> String {
    if let Some(home) = home {
        if let Ok(rest) = path.strip_prefix(home) {
            if rest.as_os_str().is_empty() {
                return "~".to_string();
            }
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matcher_by_name_and_argv0() {
        let m = RuntimeMatcher::default();
        assert!(m.matches("node", &[]));
        assert!(m.matches("Node Helper", &[]));
        assert!(m.matches("MainThread", &argv(&["/usr/local/bin/node", "server.js"])));
        assert!(!m.matches("bash", &argv(&["bash", "-c", "node server.js"])));
        assert!(!m.matches("python3", &argv(&["python3", "app.py"])));
    }

    #[test]
    fn test_matcher_custom_needles() {
        let m = RuntimeMatcher::new(["Bun", "deno", " "]);
        assert_eq!(m.family_label(), "bun");
        assert!(m.matches("deno", &[]));
        assert!(!m.matches("node", &[]));
    }

    #[test]
    fn test_shorten_command() {
        let short = argv(&["node", "server.js"]);
        assert_eq!(shorten_command(&short), "node server.js");

        let long = vec!["x".repeat(200)];
        let shortened = shorten_command(&long);
        assert_eq!(shortened.chars().count(), MAX_COMMAND_LEN);
        assert!(shortened.ends_with("..."));
    }

    #[test]
    fn test_into_record() {
        let raw = RawProcess {
            pid: 42,
            name: "node".into(),
            cmdline: argv(&["node", "index.js"]),
            cwd: Some(PathBuf::from("/srv/api")),
            memory_bytes: 64 * 1024 * 1024,
            cpu_percent: 1.5,
            start_time_secs: 1_700_000_000,
        };
        let record = raw.into_record(BTreeSet::from([3000]));
        assert_eq!(record.command, "node index.js");
        assert_eq!(record.memory_mb(), 64.0);
        assert!(record.binds(3000));
        assert_eq!(record.start_time.map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(record.project_name, None);
    }

    #[test]
    fn test_shorten_home() {
        let home = Path::new("/home/dev");
        assert_eq!(shorten_home(Path::new("/home/dev/src/api"), Some(home)), "~/src/api");
        assert_eq!(shorten_home(Path::new("/home/dev"), Some(home)), "~");
        assert_eq!(shorten_home(Path::new("/srv/web"), Some(home)), "/srv/web");
        assert_eq!(shorten_home(Path::new("/srv/web"), None), "/srv/web");
    }
}
