use std::path::Path;
use std::process::Command;

use devdash_core::config::DevdashConfig;
use devdash_core::source::{ContainerSource, RuntimeAvailability};

use crate::collectors::sockets::SocketBackend;

#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl Check {
    fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub async fn run_doctor(
    containers: &dyn ContainerSource,
    config_path: &Path,
    data_dir: &Path,
) -> Result<(), String> {
    println!("devdash doctor\n");

    let mut checks = vec![
        check_docker_cli(),
        check_runtime(containers).await,
        check_sockets(SocketBackend::detect()),
    ];
    checks.push(check_config(config_path));
    checks.push(check_data_dir(data_dir));

    for check in &checks {
        print_check(check);
    }
    println!();

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed).collect();
    if failed.is_empty() {
        println!("All checks passed!");
        return Ok(());
    }

    println!("Issues found:");
    for check in &failed {
        println!("  - {}: {}", check.name, check.message);
        if let Some(hint) = &check.hint {
            println!("    Hint: {}", hint);
        }
    }
    Err(format!("{} check(s) failed", failed.len()))
}

fn print_check(check: &Check) {
    let icon = if check.passed { "✓" } else { "✗" };
    let color = if check.passed { "\x1b[32m" } else { "\x1b[31m" };
    let reset = "\x1b[0m";

    println!(
        "  {}{}{} {}: {}",
        color, icon, reset, check.name, check.message
    );

    if let Some(hint) = &check.hint {
        println!("    └─ {}", hint);
    }
}

fn check_docker_cli() -> Check {
    match Command::new("docker").arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            let version = version
                .trim()
                .trim_start_matches("Docker version ")
                .split(',')
                .next()
                .unwrap_or("")
                .to_string();
            Check::ok("docker cli", format!("v{}", version))
        }
        Ok(_) => Check::fail("docker cli", "error running docker"),
        Err(_) => Check::fail("docker cli", "not installed")
            .with_hint("Install from https://docker.com; the containers tab stays empty without it"),
    }
}

async fn check_runtime(containers: &dyn ContainerSource) -> Check {
    let name = format!("container runtime ({})", containers.name());
    if containers.is_runtime_available().await {
        return Check::ok(name, "answering");
    }
    let reason = match containers.collect().await.runtime {
        RuntimeAvailability::Unavailable { reason } => reason,
        RuntimeAvailability::Available => "not answering".into(),
    };
    Check::fail(name, reason).with_hint("Start Docker Desktop or run `dockerd`")
}

fn check_sockets(backend: SocketBackend) -> Check {
    match backend {
        SocketBackend::Unavailable => Check::fail("listening ports", "no socket table reader")
            .with_hint("Install lsof so ports can be matched to processes"),
        backend => Check::ok("listening ports", format!("via {}", backend.label())),
    }
}

fn check_config(path: &Path) -> Check {
    if !path.exists() {
        return Check::ok(
            "config",
            format!("{} not found, using defaults", path.display()),
        );
    }
    match DevdashConfig::load(path) {
        Ok(config) => Check::ok(
            "config",
            format!(
                "{} (refresh {}s, {} watched port(s))",
                path.display(),
                config.refresh_rate,
                config.watched_ports.len()
            ),
        ),
        Err(e) => Check::fail("config", e.to_string())
            .with_hint(format!("Fix or remove {}", path.display())),
    }
}

fn check_data_dir(dir: &Path) -> Check {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Check::ok("data dir", dir.display().to_string()),
        Err(e) => Check::fail("data dir", format!("{}: {}", dir.display(), e))
            .with_hint("Logs and exported snapshots are written here"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_config(&dir.path().join("config.toml"));
        assert!(check.passed);
        assert!(check.message.contains("using defaults"));
    }

    #[test]
    fn test_valid_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "refresh_rate = 1.5\nwatched_ports = [3000, 5173]\n").unwrap();

        let check = check_config(&path);
        assert!(check.passed);
        assert!(check.message.contains("refresh 1.5s, 2 watched port(s)"));
    }

    #[test]
    fn test_invalid_config_fails_with_hint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "color_threshold_low = 90\ncolor_threshold_high = 10\n").unwrap();

        let check = check_config(&path);
        assert!(!check.passed);
        assert!(check.message.contains("color_threshold_low"));
        assert!(check.hint.is_some());
    }

    #[tokio::test]
    async fn test_runtime_check_reports_reason() {
        use devdash_core::source::{ContainerScan, FakeContainerSource};

        let down = FakeContainerSource::new([ContainerScan::unavailable("daemon not running")]);
        let check = check_runtime(&down).await;
        assert!(!check.passed);
        assert_eq!(check.message, "daemon not running");

        let up = FakeContainerSource::new([ContainerScan::available(vec![])]);
        assert!(check_runtime(&up).await.passed);
    }

    #[test]
    fn test_socket_backend_check() {
        assert!(!check_sockets(SocketBackend::Unavailable).passed);
        let ok = check_sockets(SocketBackend::Procfs);
        assert!(ok.passed);
        assert_eq!(ok.message, "via procfs");
    }

    #[test]
    fn test_data_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("share").join("devdash");
        assert!(check_data_dir(&data).passed);
        assert!(data.is_dir());
    }
}
