//! Poll → correlate → diff, owned by a single driver
//!
//! The pipeline holds the previous and current snapshot as immutable
//! `Arc<Snapshot>` values and swaps them on every successful cycle. Readers
//! clone the `Arc` and always see a complete snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::correlate::correlate;
use crate::cycle::CycleOutcome;
use crate::diff::{LifecycleEvent, diff};
use crate::model::Snapshot;
use crate::resolver::ProjectResolver;
use crate::source::RuntimeAvailability;

/// Consecutive failed cycles before the user is warned.
pub const ESCALATE_AFTER: u32 = 3;

/// Pipeline health changes worth telling the user about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthNotice {
    RuntimeUnavailable { reason: String },
    RuntimeRestored,
    CollectionDegraded { consecutive: u32 },
    CollectionRecovered,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub events: Vec<LifecycleEvent>,
    pub notices: Vec<HealthNotice>,
    /// A new snapshot became current.
    pub published: bool,
}

pub struct Pipeline {
    resolver: ProjectResolver,
    watched_ports: BTreeSet<u16>,
    previous: Option<Arc<Snapshot>>,
    current: Option<Arc<Snapshot>>,
    runtime: Option<RuntimeAvailability>,
    consecutive_failures: u32,
    degraded_cycles: u64,
}

impl Pipeline {
    pub fn new(resolver: ProjectResolver, watched_ports: BTreeSet<u16>) -> Self {
        Self {
            resolver,
            watched_ports,
            previous: None,
            current: None,
            runtime: None,
            consecutive_failures: 0,
            degraded_cycles: 0,
        }
    }

    pub fn ingest(&mut self, outcome: CycleOutcome) -> CycleReport {
        let mut report = CycleReport::default();

        match outcome {
            CycleOutcome::TimedOut { after } => {
                self.consecutive_failures += 1;
                self.degraded_cycles += 1;
                log::warn!(
                    "cycle timed out after {:?} ({} in a row), keeping previous snapshot",
                    after,
                    self.consecutive_failures
                );
                if self.consecutive_failures == ESCALATE_AFTER {
                    report.notices.push(HealthNotice::CollectionDegraded {
                        consecutive: self.consecutive_failures,
                    });
                }
            }
            CycleOutcome::Collected {
                processes,
                containers,
                taken_at,
            } => {
                if self.consecutive_failures >= ESCALATE_AFTER {
                    report.notices.push(HealthNotice::CollectionRecovered);
                }
                self.consecutive_failures = 0;

                if let Some(notice) = self.track_runtime(containers.runtime) {
                    report.notices.push(notice);
                }
                if !self.runtime_available() {
                    self.degraded_cycles += 1;
                }

                let snapshot = Arc::new(correlate(
                    processes,
                    containers.containers,
                    &mut self.resolver,
                    taken_at,
                ));
                report.events = diff(self.current.as_deref(), &snapshot, &self.watched_ports);
                log::debug!(
                    "cycle: {} processes, {} containers, {} events",
                    snapshot.processes.len(),
                    snapshot.containers.len(),
                    report.events.len()
                );

                self.previous = self.current.replace(snapshot);
                report.published = true;
            }
        }

        report
    }

    fn track_runtime(&mut self, now: RuntimeAvailability) -> Option<HealthNotice> {
        let was_available = self.runtime.as_ref().map(RuntimeAvailability::is_available);
        let notice = match (was_available, &now) {
            (Some(false), RuntimeAvailability::Available) => {
                log::info!("container runtime reachable again");
                Some(HealthNotice::RuntimeRestored)
            }
            (None | Some(true), RuntimeAvailability::Unavailable { reason }) => {
                log::warn!("container runtime unavailable: {}", reason);
                Some(HealthNotice::RuntimeUnavailable {
                    reason: reason.clone(),
                })
            }
            _ => None,
        };
        self.runtime = Some(now);
        notice
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.clone()
    }

    pub fn previous(&self) -> Option<Arc<Snapshot>> {
        self.previous.clone()
    }

    pub fn runtime(&self) -> Option<&RuntimeAvailability> {
        self.runtime.as_ref()
    }

    pub fn runtime_available(&self) -> bool {
        self.runtime.as_ref().is_none_or(RuntimeAvailability::is_available)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Cycles that timed out or ran without the container runtime.
    pub fn degraded_cycles(&self) -> u64 {
        self.degraded_cycles
    }

    pub fn watched_ports(&self) -> &BTreeSet<u16> {
        &self.watched_ports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::tests::{FixedReader, container, process};
    use crate::source::ContainerScan;
    use chrono::Utc;
    use std::time::Duration;

    fn pipeline(watched: &[u16]) -> Pipeline {
        Pipeline::new(
            ProjectResolver::new(Box::new(FixedReader)),
            watched.iter().copied().collect(),
        )
    }

    fn collected(processes: Vec<crate::model::ProcessRecord>, scan: ContainerScan) -> CycleOutcome {
        CycleOutcome::Collected {
            processes,
            containers: scan,
            taken_at: Utc::now(),
        }
    }

    fn timed_out() -> CycleOutcome {
        CycleOutcome::TimedOut {
            after: Duration::from_secs(6),
        }
    }

    #[test]
    fn test_first_cycle_is_baseline() {
        let mut p = pipeline(&[3000]);
        let report = p.ingest(collected(
            vec![process(1, "/work/api", &[3000])],
            ContainerScan::available(vec![container("a", "db", None)]),
        ));
        assert!(report.events.is_empty());
        assert!(report.notices.is_empty());
        assert!(report.published);
        assert!(p.previous().is_none());
        let current = p.current().unwrap();
        assert_eq!(current.processes[&1].project_name.as_deref(), Some("api"));
    }

    #[test]
    fn test_second_cycle_diffs_and_swaps() {
        let mut p = pipeline(&[]);
        p.ingest(collected(vec![process(100, "/work/api", &[3000])], ContainerScan::available(vec![])));
        let first = p.current().unwrap();

        let report = p.ingest(collected(
            vec![process(100, "/work/api", &[3000]), process(200, "/work/web", &[5173])],
            ContainerScan::available(vec![]),
        ));
        assert_eq!(report.events.len(), 1);
        assert!(matches!(
            &report.events[0],
            LifecycleEvent::ProcessAppeared { process } if process.pid == 200
                && process.project_name.as_deref() == Some("web")
        ));
        assert!(Arc::ptr_eq(&p.previous().unwrap(), &first));
        // the old snapshot is untouched by the swap
        assert_eq!(first.processes.len(), 1);
    }

    #[test]
    fn test_timeout_keeps_current_and_escalates_once() {
        let mut p = pipeline(&[]);
        p.ingest(collected(vec![process(1, "/a", &[])], ContainerScan::available(vec![])));
        let before = p.current().unwrap();

        assert!(p.ingest(timed_out()).notices.is_empty());
        assert!(p.ingest(timed_out()).notices.is_empty());
        let third = p.ingest(timed_out());
        assert!(!third.published);
        assert_eq!(third.notices, vec![HealthNotice::CollectionDegraded { consecutive: 3 }]);
        assert!(p.ingest(timed_out()).notices.is_empty());

        assert!(Arc::ptr_eq(&p.current().unwrap(), &before));
        assert_eq!(p.consecutive_failures(), 4);
        assert_eq!(p.degraded_cycles(), 4);

        let recovered = p.ingest(collected(vec![process(1, "/a", &[])], ContainerScan::available(vec![])));
        assert_eq!(recovered.notices, vec![HealthNotice::CollectionRecovered]);
        assert_eq!(p.consecutive_failures(), 0);
        assert!(recovered.events.is_empty());
    }

    #[test]
    fn test_short_failure_streak_resets_quietly() {
        let mut p = pipeline(&[]);
        p.ingest(timed_out());
        p.ingest(timed_out());
        let report = p.ingest(collected(vec![], ContainerScan::available(vec![])));
        assert!(report.notices.is_empty());
        assert_eq!(p.consecutive_failures(), 0);
        p.ingest(timed_out());
        assert_eq!(p.consecutive_failures(), 1);
    }

    #[test]
    fn test_runtime_transitions_notice_once() {
        let mut p = pipeline(&[]);
        let r1 = p.ingest(collected(vec![process(1, "/a", &[])], ContainerScan::unavailable("daemon down")));
        assert_eq!(
            r1.notices,
            vec![HealthNotice::RuntimeUnavailable {
                reason: "daemon down".into()
            }]
        );
        assert!(!p.runtime_available());
        assert_eq!(p.current().unwrap().processes.len(), 1);
        assert!(p.current().unwrap().containers.is_empty());

        let r2 = p.ingest(collected(vec![process(1, "/a", &[])], ContainerScan::unavailable("daemon down")));
        assert!(r2.notices.is_empty());

        let r3 = p.ingest(collected(
            vec![process(1, "/a", &[])],
            ContainerScan::available(vec![container("c", "db", None)]),
        ));
        assert_eq!(r3.notices, vec![HealthNotice::RuntimeRestored]);
        assert!(matches!(&r3.events[..], [LifecycleEvent::ContainerAppeared { .. }]));
        assert_eq!(p.degraded_cycles(), 2);
    }
}
