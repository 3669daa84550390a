//! Snapshot diffing
//!
//! `diff` is a pure function from (previous, current, watched ports) to the
//! lifecycle events that happened in between. Delivering the events is the
//! caller's business.
//!
//! Identity is the pid for processes and the container id for containers. A
//! pid recycled by an unrelated process between two cycles looks exactly like
//! continuity and produces no events; that false negative is accepted.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{ContainerRecord, Pid, ProcessRecord, Snapshot};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ProcessAppeared { process: ProcessRecord },
    /// Carries the last-known record from the previous snapshot.
    ProcessDisappeared { process: ProcessRecord },
    ContainerAppeared { container: ContainerRecord },
    ContainerDisappeared { container: ContainerRecord },
    /// A watched port is now bound by a pid that did not hold it last cycle.
    PortBoundByUntracked { port: u16, pid: Pid },
}

impl LifecycleEvent {
    /// Identity key used to check that no identity both appears and disappears.
    pub fn identity(&self) -> String {
        match self {
            LifecycleEvent::ProcessAppeared { process }
            | LifecycleEvent::ProcessDisappeared { process } => format!("pid:{}", process.pid),
            LifecycleEvent::ContainerAppeared { container }
            | LifecycleEvent::ContainerDisappeared { container } => {
                format!("container:{}", container.id)
            }
            LifecycleEvent::PortBoundByUntracked { pid, .. } => format!("pid:{}", pid),
        }
    }
}

/// Events are ordered: process disappearances, process appearances, container
/// disappearances, container appearances, port bindings. Each group is in
/// identity order.
///
/// With no previous snapshot this is the baseline cycle and nothing is emitted.
pub fn diff(
    previous: Option<&Snapshot>,
    current: &Snapshot,
    watched_ports: &BTreeSet<u16>,
) -> Vec<LifecycleEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let mut events = Vec::new();

    let prev_pids = previous.pids();
    let curr_pids = current.pids();

    for pid in prev_pids.difference(&curr_pids) {
        if let Some(process) = previous.process(*pid) {
            events.push(LifecycleEvent::ProcessDisappeared {
                process: process.clone(),
            });
        }
    }
    for pid in curr_pids.difference(&prev_pids) {
        if let Some(process) = current.process(*pid) {
            events.push(LifecycleEvent::ProcessAppeared {
                process: process.clone(),
            });
        }
    }

    let prev_ids = previous.container_ids();
    let curr_ids = current.container_ids();

    for id in prev_ids.difference(&curr_ids) {
        if let Some(container) = previous.container(id) {
            events.push(LifecycleEvent::ContainerDisappeared {
                container: container.clone(),
            });
        }
    }
    for id in curr_ids.difference(&prev_ids) {
        if let Some(container) = current.container(id) {
            events.push(LifecycleEvent::ContainerAppeared {
                container: container.clone(),
            });
        }
    }

    if !watched_ports.is_empty() {
        for process in current.processes.values() {
            for port in process.listening_ports.intersection(watched_ports) {
                let held_before = previous
                    .process(process.pid)
                    .is_some_and(|p| p.binds(*port));
                if !held_before {
                    events.push(LifecycleEvent::PortBoundByUntracked {
                        port: *port,
                        pid: process.pid,
                    });
                }
            }
        }
    }

    events
}
