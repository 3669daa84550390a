//! Background collection loop
//!
//! The poller only gathers. It runs one bounded cycle per tick and hands the
//! outcome to the UI loop, which owns the pipeline and the view state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use devdash_core::cycle::{CycleOutcome, collect_cycle};
use devdash_core::host::{ProcessDetails, SystemProcess};
use devdash_core::model::{ContainerId, Pid};
use devdash_core::notify::Notification;
use devdash_core::source::{ContainerSource, ProcessSource};

use crate::system::HostStats;

/// Messages from background tasks to the UI loop.
#[derive(Debug)]
pub enum Update {
    Cycle(CycleOutcome),
    Host(HostStats),
    /// Every process on the host, for the System tab
    System(Vec<SystemProcess>),
    /// Result of a kill or stop action
    Action(Notification),
    Details {
        pid: Pid,
        details: Option<ProcessDetails>,
    },
    Log {
        id: ContainerId,
        line: String,
    },
    LogEnded {
        id: ContainerId,
        reason: String,
    },
}

pub struct Poller {
    processes: Arc<dyn ProcessSource>,
    containers: Arc<dyn ContainerSource>,
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(
        processes: Arc<dyn ProcessSource>,
        containers: Arc<dyn ContainerSource>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            processes,
            containers,
            interval,
            timeout,
        }
    }

    pub async fn cycle(&self) -> CycleOutcome {
        collect_cycle(self.processes.as_ref(), self.containers.as_ref(), self.timeout).await
    }

    /// Poll until the UI drops its receiver. A message on `refresh_rx` runs a
    /// cycle immediately and restarts the timer.
    pub async fn run(self, tx: mpsc::Sender<Update>, mut refresh_rx: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        log::info!(
            "poller started: every {:?}, cycle timeout {:?}, containers via {}",
            self.interval,
            self.timeout,
            self.containers.name()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                maybe = refresh_rx.recv() => {
                    if maybe.is_none() {
                        break;
                    }
                    interval.reset();
                }
            }

            let outcome = self.cycle().await;
            if tx.send(Update::Cycle(outcome)).await.is_err() {
                break;
            }
        }

        log::info!("poller stopped");
    }
}

pub fn spawn_poller(
    poller: Poller,
    tx: mpsc::Sender<Update>,
    refresh_rx: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        poller.run(tx, refresh_rx).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::model::ProcessRecord;
    use devdash_core::source::{ContainerScan, FakeContainerSource, FakeProcessSource};

    fn record(pid: u32) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: "node".into(),
            command: "node index.js".into(),
            working_directory: None,
            listening_ports: Default::default(),
            memory_bytes: 0,
            cpu_percent: 0.0,
            start_time: None,
            project_name: None,
        }
    }

    #[tokio::test]
    async fn test_poller_sends_cycles_until_receiver_drops() {
        let poller = Poller::new(
            Arc::new(FakeProcessSource::new([vec![record(1)], vec![record(1), record(2)]])),
            Arc::new(FakeContainerSource::unreachable()),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        let (tx, mut rx) = mpsc::channel(4);
        let (_refresh_tx, refresh_rx) = mpsc::channel(1);
        let handle = spawn_poller(poller, tx, refresh_rx);

        let mut sizes = Vec::new();
        while sizes.len() < 2 {
            if let Some(Update::Cycle(CycleOutcome::Collected { processes, .. })) = rx.recv().await {
                sizes.push(processes.len());
            }
        }
        assert_eq!(sizes, vec![1, 2]);

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller should stop once the receiver is gone")
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_request_runs_a_cycle() {
        let poller = Poller::new(
            Arc::new(FakeProcessSource::new([vec![record(7)]])),
            Arc::new(FakeContainerSource::new([ContainerScan::available(vec![])])),
            Duration::from_secs(3600),
            Duration::from_secs(1),
        );
        let (tx, mut rx) = mpsc::channel(4);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        spawn_poller(poller, tx, refresh_rx);

        // First tick fires immediately
        assert!(matches!(rx.recv().await, Some(Update::Cycle(_))));

        refresh_tx.send(()).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(next, Ok(Some(Update::Cycle(_)))));
    }
}
