//! One bounded collection cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::ProcessRecord;
use crate::source::{ContainerScan, ContainerSource, ProcessSource};

#[derive(Clone, Debug)]
pub enum CycleOutcome {
    /// Both sources finished inside the timeout.
    Collected {
        processes: Vec<ProcessRecord>,
        containers: ContainerScan,
        taken_at: DateTime<Utc>,
    },
    /// The cycle was abandoned; nothing it gathered is used.
    TimedOut { after: Duration },
}

/// Run both sources concurrently. Either both results come back within
/// `timeout` or the whole cycle is dropped, so a half-updated pair is never
/// handed to the correlator.
pub async fn collect_cycle(
    processes: &dyn ProcessSource,
    containers: &dyn ContainerSource,
    timeout: Duration,
) -> CycleOutcome {
    let work = async { tokio::join!(processes.collect(), containers.collect()) };

    match tokio::time::timeout(timeout, work).await {
        Ok((processes, containers)) => CycleOutcome::Collected {
            processes,
            containers,
            taken_at: Utc::now(),
        },
        Err(_) => {
            log::warn!("collection cycle exceeded {:?}, abandoned", timeout);
            CycleOutcome::TimedOut { after: timeout }
        }
    }
}
