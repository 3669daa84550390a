//! Listening-socket tables
//!
//! Two sources are understood: the Linux `/proc/net/tcp{,6}` tables joined with
//! the `socket:[inode]` links under `/proc/<pid>/fd`, and `lsof -F pn` output on
//! everything else. Both reduce to a pid → listening ports map.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::Pid;

pub type ListenerTable = BTreeMap<Pid, BTreeSet<u16>>;

/// TCP state code for LISTEN in `/proc/net/tcp`.
const TCP_LISTEN: &str = "0A";

/// Parse `/proc/net/tcp` (or `tcp6`) into socket inode → listening port.
pub fn parse_proc_net_listeners(content: &str) -> BTreeMap<u64, u16> {
    let mut out = BTreeMap::new();

    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || fields[3] != TCP_LISTEN {
            continue;
        }

        let Some((_, port_hex)) = fields[1].rsplit_once(':') else {
            continue;
        };
        let Ok(port) = u16::from_str_radix(port_hex, 16) else {
            continue;
        };
        let Ok(inode) = fields[9].parse::<u64>() else {
            continue;
        };
        if port == 0 || inode == 0 {
            continue;
        }
        out.insert(inode, port);
    }

    out
}

/// `socket:[12345]` → 12345
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Ports owned by one process given the inodes of its open sockets.
pub fn ports_for_inodes(
    inodes: impl IntoIterator<Item = u64>,
    listeners: &BTreeMap<u64, u16>,
) -> BTreeSet<u16> {
    inodes
        .into_iter()
        .filter_map(|inode| listeners.get(&inode).copied())
        .collect()
}

/// Parse `lsof -nP -iTCP -sTCP:LISTEN -F pn` output.
///
/// Records are `p<pid>` followed by one `n<addr>:<port>` per socket.
pub fn parse_lsof_listeners(output: &str) -> ListenerTable {
    let mut table = ListenerTable::new();
    let mut current: Option<Pid> = None;

    for line in output.lines() {
        if let Some(pid) = line.strip_prefix('p') {
            current = pid.trim().parse().ok();
        } else if let Some(name) = line.strip_prefix('n') {
            let Some(pid) = current else {
                continue;
            };
            // `*:3000`, `127.0.0.1:5173`, `[::1]:8080`; connected sockets carry `->`
            if name.contains("->") {
                continue;
            }
            if let Some(port) = name.rsplit(':').next().and_then(|p| p.parse::<u16>().ok()) {
                table.entry(pid).or_default().insert(port);
            }
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_NET_TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0BB8 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 41234 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1435 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 41300 1 0000000000000000 100 0 0 10 0
   2: 0100007F:0BB8 0100007F:D2F0 01 00000000:00000000 00:00000000 00000000  1000        0 41399 1 0000000000000000 20 4 30 10 -1
";

    #[test]
    fn test_parse_proc_net_only_listeners() {
        let listeners = parse_proc_net_listeners(PROC_NET_TCP);
        assert_eq!(listeners.len(), 2);
        assert_eq!(listeners.get(&41234), Some(&3000));
        assert_eq!(listeners.get(&41300), Some(&5173));
        assert_eq!(listeners.get(&41399), None);
    }

    #[test]
    fn test_parse_proc_net_tcp6() {
        let tcp6 = "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000000000000:1F90 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 5555 1 0000000000000000 100 0 0 10 0
";
        let listeners = parse_proc_net_listeners(tcp6);
        assert_eq!(listeners.get(&5555), Some(&8080));
    }

    #[test]
    fn test_socket_link_and_ports() {
        assert_eq!(parse_socket_link("socket:[41234]"), Some(41234));
        assert_eq!(parse_socket_link("pipe:[41234]"), None);
        assert_eq!(parse_socket_link("/dev/null"), None);

        let listeners = parse_proc_net_listeners(PROC_NET_TCP);
        let ports = ports_for_inodes([41234, 999, 41399], &listeners);
        assert_eq!(ports, BTreeSet::from([3000]));
    }

    #[test]
    fn test_parse_lsof_listeners() {
        let output = "p812\nn*:3000\nn[::1]:3000\np913\nn127.0.0.1:5173\nn127.0.0.1:5173->127.0.0.1:50123\npbogus\nn*:9999\n";
        let table = parse_lsof_listeners(output);
        assert_eq!(table.get(&812), Some(&BTreeSet::from([3000])));
        assert_eq!(table.get(&913), Some(&BTreeSet::from([5173])));
        assert_eq!(table.len(), 2);
    }
}
