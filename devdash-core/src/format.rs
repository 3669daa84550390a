//! Display formatting shared by the table views and the filter.

use chrono::{DateTime, Utc};

pub fn format_uptime(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86_400, (seconds % 86_400) / 3600)
    }
}

/// Uptime measured against `now`, `-` when the start time is unknown.
pub fn uptime_since(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match start {
        Some(start) => format_uptime((now - start).num_seconds()),
        None => "-".to_string(),
    }
}

pub fn format_memory_mb(mb: f64) -> String {
    format!("{:.0} MB", mb)
}

pub fn format_percent(value: f32) -> String {
    format!("{:.1}%", value)
}

pub fn format_ports<I: IntoIterator<Item = u16>>(ports: I) -> String {
    let joined = ports
        .into_iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() { "-".to_string() } else { joined }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.1}GB", b / GB)
    } else if b >= MB {
        format!("{:.0}MB", b / MB)
    } else if b >= KB {
        format!("{:.0}KB", b / KB)
    } else {
        format!("{}B", bytes)
    }
}

/// Throughput in bytes per second.
pub fn format_rate(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let b = bytes_per_sec.max(0.0);
    if b < KB {
        format!("{:.0} B/s", b)
    } else if b < MB {
        format!("{:.1} KB/s", b / KB)
    } else {
        format!("{:.1} MB/s", b / MB)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Warn,
    Critical,
}

/// Colour thresholds in percent. `low < high` is enforced by config validation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    pub fn severity(&self, percent: f64) -> Severity {
        if percent < self.low {
            Severity::Ok
        } else if percent < self.high {
            Severity::Warn
        } else {
            Severity::Critical
        }
    }

    /// Memory is rated against 1 GiB.
    pub fn memory_severity(&self, mb: f64) -> Severity {
        self.severity((mb / 1024.0 * 100.0).min(100.0))
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 50.0,
            high: 80.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(-5), "0s");
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m");
        assert_eq!(format_uptime(3 * 3600 + 14 * 60 + 9), "3h 14m");
        assert_eq!(format_uptime(2 * 86_400 + 5 * 3600), "2d 5h");
    }

    #[test]
    fn test_format_ports() {
        assert_eq!(format_ports([3000, 9229]), "3000, 9229");
        assert_eq!(format_ports(Vec::<u16>::new()), "-");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0GB");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(0.0), "0 B/s");
        assert_eq!(format_rate(-3.0), "0 B/s");
        assert_eq!(format_rate(1536.0), "1.5 KB/s");
        assert_eq!(format_rate(3.0 * 1024.0 * 1024.0), "3.0 MB/s");
    }

    #[test]
    fn test_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.severity(10.0), Severity::Ok);
        assert_eq!(t.severity(50.0), Severity::Warn);
        assert_eq!(t.severity(80.0), Severity::Critical);
        assert_eq!(t.memory_severity(256.0), Severity::Ok);
        assert_eq!(t.memory_severity(900.0), Severity::Critical);
        assert_eq!(t.memory_severity(4096.0), Severity::Critical);
    }
}
