//! Container source backed by the `docker` CLI.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use devdash_core::container::parse_ps_output;
use devdash_core::source::{ContainerScan, ContainerSource};

const VERSION_TIMEOUT: Duration = Duration::from_secs(3);

pub struct DockerCliSource {
    binary: String,
}

impl DockerCliSource {
    pub fn new() -> Self {
        Self {
            binary: "docker".into(),
        }
    }

    #[cfg(test)]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for DockerCliSource {
    fn default() -> Self {
        Self::new()
    }
}

/// First line of stderr, or the exit status when stderr is empty.
fn failure_reason(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| format!("docker exited with {}", output.status))
}

#[async_trait]
impl ContainerSource for DockerCliSource {
    async fn collect(&self) -> ContainerScan {
        let output = self
            .command()
            .args(["ps", "--no-trunc", "--format", "{{json .}}"])
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                ContainerScan::available(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
            }
            Ok(output) => ContainerScan::unavailable(failure_reason(&output)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ContainerScan::unavailable("docker CLI not installed")
            }
            Err(e) => ContainerScan::unavailable(format!("cannot run docker: {}", e)),
        }
    }

    async fn is_runtime_available(&self) -> bool {
        let version = self
            .command()
            .args(["version", "--format", "{{.Server.Version}}"])
            .output();
        matches!(
            tokio::time::timeout(VERSION_TIMEOUT, version).await,
            Ok(Ok(output)) if output.status.success()
        )
    }

    fn name(&self) -> &'static str {
        "docker-cli"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &std::path::Path, body: &str) -> String {
        let path = dir.join("docker");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let source = DockerCliSource::new().with_binary("/nonexistent/docker-binary");
        let scan = source.collect().await;
        assert!(scan.containers.is_empty());
        assert!(!scan.runtime.is_available());
        assert!(!source.is_runtime_available().await);
    }

    #[tokio::test]
    async fn test_daemon_down_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(
            dir.path(),
            "echo 'Cannot connect to the Docker daemon at unix:///var/run/docker.sock.' >&2\nexit 1",
        );
        let scan = DockerCliSource::new().with_binary(bin).collect().await;
        assert!(scan.containers.is_empty());
        match scan.runtime {
            devdash_core::source::RuntimeAvailability::Unavailable { reason } => {
                assert!(reason.starts_with("Cannot connect"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parses_ps_output() {
        let dir = tempfile::tempdir().unwrap();
        let line = r#"{"ID":"abc123","Names":"shop-db-1","Image":"postgres:16","State":"running","Status":"Up 2 hours","Ports":"0.0.0.0:5432->5432/tcp","Labels":"com.docker.compose.project=shop,com.docker.compose.service=db","CreatedAt":"2024-03-09 14:05:07 +0000 UTC"}"#;
        let bin = script(dir.path(), &format!("echo '{}'", line));
        let scan = DockerCliSource::new().with_binary(bin).collect().await;
        assert!(scan.runtime.is_available());
        assert_eq!(scan.containers.len(), 1);
        assert_eq!(scan.containers[0].compose_service(), Some("db"));
    }
}
