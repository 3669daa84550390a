//! Reads which ports each process listens on.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use devdash_core::model::Pid;
use devdash_core::sockets::{
    ListenerTable, parse_lsof_listeners, parse_proc_net_listeners, parse_socket_link,
    ports_for_inodes,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketBackend {
    /// `/proc/net/tcp{,6}` plus `/proc/<pid>/fd`
    Procfs,
    /// `lsof -iTCP -sTCP:LISTEN`
    Lsof,
    /// Nothing usable; every process reports no ports
    Unavailable,
}

impl SocketBackend {
    pub fn detect() -> Self {
        if Path::new("/proc/net/tcp").exists() {
            SocketBackend::Procfs
        } else if lsof_available() {
            SocketBackend::Lsof
        } else {
            SocketBackend::Unavailable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SocketBackend::Procfs => "procfs",
            SocketBackend::Lsof => "lsof",
            SocketBackend::Unavailable => "none",
        }
    }

    /// Listening ports for the given pids. Pids that vanish or cannot be
    /// inspected get no entry.
    pub fn listeners(&self, pids: &[Pid]) -> ListenerTable {
        match self {
            SocketBackend::Procfs => procfs_listeners(Path::new("/proc"), pids),
            SocketBackend::Lsof => lsof_listeners(pids),
            SocketBackend::Unavailable => ListenerTable::new(),
        }
    }
}

fn lsof_available() -> bool {
    std::process::Command::new("lsof")
        .arg("-v")
        .output()
        .map(|_| true)
        .unwrap_or(false)
}

/// Reads listening inodes once, then walks each pid's fd links.
pub(crate) fn procfs_listeners(proc_root: &Path, pids: &[Pid]) -> ListenerTable {
    let mut listeners: BTreeMap<u64, u16> = BTreeMap::new();
    for table in ["net/tcp", "net/tcp6"] {
        match std::fs::read_to_string(proc_root.join(table)) {
            Ok(content) => listeners.extend(parse_proc_net_listeners(&content)),
            Err(e) => log::debug!("cannot read {}: {}", table, e),
        }
    }

    let mut out = ListenerTable::new();
    if listeners.is_empty() {
        return out;
    }

    for &pid in pids {
        let fd_dir = proc_root.join(pid.to_string()).join("fd");
        let Ok(entries) = std::fs::read_dir(&fd_dir) else {
            // gone, or owned by another user
            continue;
        };
        let inodes = entries.filter_map(|entry| {
            let target = std::fs::read_link(entry.ok()?.path()).ok()?;
            parse_socket_link(&target.to_string_lossy())
        });
        let ports: BTreeSet<u16> = ports_for_inodes(inodes, &listeners);
        if !ports.is_empty() {
            out.insert(pid, ports);
        }
    }

    out
}

fn lsof_listeners(pids: &[Pid]) -> ListenerTable {
    if pids.is_empty() {
        return ListenerTable::new();
    }
    let pid_list = pids
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");

    match std::process::Command::new("lsof")
        .args(["-nP", "-a", "-iTCP", "-sTCP:LISTEN", "-F", "pn", "-p", &pid_list])
        .output()
    {
        // lsof exits 1 when nothing matched
        Ok(output) => parse_lsof_listeners(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            log::warn!("lsof failed: {}", e);
            ListenerTable::new()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0BB8 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 4242 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1435 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 5151 1 0000000000000000 100 0 0 10 0
";

    #[test]
    fn test_procfs_listeners_from_fake_root() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("net")).unwrap();
        std::fs::write(root.path().join("net/tcp"), TCP).unwrap();

        let fd = root.path().join("100/fd");
        std::fs::create_dir_all(&fd).unwrap();
        std::os::unix::fs::symlink("socket:[4242]", fd.join("3")).unwrap();
        std::os::unix::fs::symlink("/dev/null", fd.join("0")).unwrap();

        let other = root.path().join("200/fd");
        std::fs::create_dir_all(&other).unwrap();
        std::os::unix::fs::symlink("socket:[9999]", other.join("3")).unwrap();

        let table = procfs_listeners(root.path(), &[100, 200, 300]);
        assert_eq!(table.get(&100), Some(&BTreeSet::from([3000])));
        assert!(!table.contains_key(&200));
        assert!(!table.contains_key(&300));
    }

    #[test]
    fn test_procfs_without_tables_is_empty() {
        let root = tempfile::tempdir().unwrap();
        assert!(procfs_listeners(root.path(), &[1]).is_empty());
    }
}
