//! Collection source traits
//!
//! Sources are the effectful edges of the pipeline: one enumerates OS
//! processes, the other asks a container runtime. Both are infallible from the
//! pipeline's point of view; an unreachable runtime is a value, not an error.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{ContainerRecord, ProcessRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeAvailability {
    Available,
    Unavailable { reason: String },
}

impl RuntimeAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, RuntimeAvailability::Available)
    }
}

/// One container-runtime query result.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerScan {
    pub containers: Vec<ContainerRecord>,
    pub runtime: RuntimeAvailability,
}

impl ContainerScan {
    pub fn available(containers: Vec<ContainerRecord>) -> Self {
        Self {
            containers,
            runtime: RuntimeAvailability::Available,
        }
    }

    /// Empty result for a runtime that could not be reached.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            containers: Vec::new(),
            runtime: RuntimeAvailability::Unavailable {
                reason: reason.into(),
            },
        }
    }
}

/// Enumerates the dev processes on this machine. Processes that vanish while
/// being inspected are left out.
#[async_trait]
pub trait ProcessSource: Send + Sync {
    async fn collect(&self) -> Vec<ProcessRecord>;
}

#[async_trait]
pub trait ContainerSource: Send + Sync {
    async fn collect(&self) -> ContainerScan;

    /// Cheap reachability check, used by `doctor` and the status bar.
    async fn is_runtime_available(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Replays scripted process lists. The last entry repeats once the script
/// runs out.
#[derive(Default)]
pub struct FakeProcessSource {
    script: Mutex<VecDeque<Vec<ProcessRecord>>>,
    last: Mutex<Vec<ProcessRecord>>,
    delay: Option<Duration>,
}

impl FakeProcessSource {
    pub fn new<I: IntoIterator<Item = Vec<ProcessRecord>>>(script: I) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every collect sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ProcessSource for FakeProcessSource {
    async fn collect(&self) -> Vec<ProcessRecord> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let Ok(mut last) = self.last.lock() else {
            return next.unwrap_or_default();
        };
        if let Some(next) = next {
            *last = next;
        }
        last.clone()
    }
}

/// Replays scripted container scans, the same way as `FakeProcessSource`.
pub struct FakeContainerSource {
    script: Mutex<VecDeque<ContainerScan>>,
    last: Mutex<ContainerScan>,
    delay: Option<Duration>,
}

impl FakeContainerSource {
    pub fn new<I: IntoIterator<Item = ContainerScan>>(script: I) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(ContainerScan::available(Vec::new())),
            delay: None,
        }
    }

    /// A runtime that is never reachable.
    pub fn unreachable() -> Self {
        Self::new([ContainerScan::unavailable("runtime not running")])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ContainerSource for FakeContainerSource {
    async fn collect(&self) -> ContainerScan {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let Ok(mut last) = self.last.lock() else {
            return next.unwrap_or_else(|| ContainerScan::unavailable("poisoned"));
        };
        if let Some(next) = next {
            *last = next;
        }
        last.clone()
    }

    async fn is_runtime_available(&self) -> bool {
        let pending = self
            .script
            .lock()
            .ok()
            .and_then(|s| s.front().map(|scan| scan.runtime.is_available()));
        match pending {
            Some(available) => available,
            None => self
                .last
                .lock()
                .map(|l| l.runtime.is_available())
                .unwrap_or(false),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::tests::{container, process};

    #[tokio::test]
    async fn test_fake_process_source_repeats_last() {
        let source = FakeProcessSource::new([vec![process(1, "/a", &[])], vec![]]);
        assert_eq!(source.collect().await.len(), 1);
        assert!(source.collect().await.is_empty());
        assert!(source.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_runtime_is_empty_and_unavailable() {
        let source = FakeContainerSource::unreachable();
        assert!(!source.is_runtime_available().await);
        let scan = source.collect().await;
        assert!(scan.containers.is_empty());
        assert!(!scan.runtime.is_available());
        assert!(!source.is_runtime_available().await);
    }

    #[tokio::test]
    async fn test_fake_container_source_script() {
        let source = FakeContainerSource::new([
            ContainerScan::available(vec![container("a", "db", None)]),
            ContainerScan::unavailable("daemon stopped"),
        ]);
        assert!(source.is_runtime_available().await);
        assert_eq!(source.collect().await.containers.len(), 1);
        assert!(!source.is_runtime_available().await);
        assert!(source.collect().await.containers.is_empty());
    }
}
