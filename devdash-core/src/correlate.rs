//! Joins collector output into one snapshot.
//!
//! Pure apart from resolver memoization: processes get their project name,
//! containers are keyed by id. Compose grouping is a derived view computed on
//! demand from the two label fields; nothing extra is stored per record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{ContainerRecord, ProcessRecord, Snapshot};
use crate::resolver::ProjectResolver;

pub fn correlate(
    processes: Vec<ProcessRecord>,
    containers: Vec<ContainerRecord>,
    resolver: &mut ProjectResolver,
    taken_at: DateTime<Utc>,
) -> Snapshot {
    let mut snapshot = Snapshot::empty(taken_at);

    for mut process in processes {
        if snapshot.processes.contains_key(&process.pid) {
            log::warn!("duplicate pid {} in one collection, keeping first", process.pid);
            continue;
        }
        process.project_name = process
            .working_directory
            .as_deref()
            .and_then(|dir| resolver.resolve(dir));
        snapshot.processes.insert(process.pid, process);
    }

    for container in containers {
        if snapshot.containers.contains_key(&container.id) {
            log::warn!("duplicate container id {}, keeping first", container.short_id());
            continue;
        }
        snapshot.containers.insert(container.id.clone(), container);
    }

    snapshot
}

/// Containers sharing one compose project. `project == None` collects the
/// standalone containers.
#[derive(Debug)]
pub struct ComposeGroup<'a> {
    pub project: Option<&'a str>,
    pub containers: Vec<&'a ContainerRecord>,
}

/// Compose stacks first (by project name), standalone containers last. Within
/// a group containers are ordered by service, then name.
pub fn compose_groups(snapshot: &Snapshot) -> Vec<ComposeGroup<'_>> {
    let mut stacks: BTreeMap<&str, Vec<&ContainerRecord>> = BTreeMap::new();
    let mut standalone: Vec<&ContainerRecord> = Vec::new();

    for container in snapshot.containers.values() {
        match container.compose_project() {
            Some(project) => stacks.entry(project).or_default().push(container),
            None => standalone.push(container),
        }
    }

    let mut groups: Vec<ComposeGroup<'_>> = stacks
        .into_iter()
        .map(|(project, mut containers)| {
            containers.sort_by(|a, b| {
                a.compose_service()
                    .cmp(&b.compose_service())
                    .then_with(|| a.name.cmp(&b.name))
            });
            ComposeGroup {
                project: Some(project),
                containers,
            }
        })
        .collect();

    if !standalone.is_empty() {
        standalone.sort_by(|a, b| a.name.cmp(&b.name));
        groups.push(ComposeGroup {
            project: None,
            containers: standalone,
        });
    }

    groups
}

/// Dev processes grouped by resolved project; unresolved ones under `None`.
pub fn processes_by_project(snapshot: &Snapshot) -> BTreeMap<Option<&str>, Vec<&ProcessRecord>> {
    let mut out: BTreeMap<Option<&str>, Vec<&ProcessRecord>> = BTreeMap::new();
    for process in snapshot.processes.values() {
        out.entry(process.project_name.as_deref())
            .or_default()
            .push(process);
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{ComposeLabels, ContainerStatus};
    use crate::resolver::ManifestReader;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};

    /// Resolves `/work/<name>/...` to `<name>`.
    pub(crate) struct FixedReader;

    impl ManifestReader for FixedReader {
        fn read_name(&self, dir: &Path) -> Option<String> {
            let mut parts = dir.components().skip(1);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(work), Some(name), None) if work.as_os_str() == "work" => {
                    Some(name.as_os_str().to_string_lossy().into_owned())
                }
                _ => None,
            }
        }
    }

    pub(crate) fn process(pid: u32, cwd: &str, ports: &[u16]) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: "node".into(),
            command: format!("node server-{}.js", pid),
            working_directory: Some(PathBuf::from(cwd)),
            listening_ports: ports.iter().copied().collect::<BTreeSet<_>>(),
            memory_bytes: pid as u64 * 1024 * 1024,
            cpu_percent: 0.5,
            start_time: None,
            project_name: None,
        }
    }

    pub(crate) fn container(id: &str, name: &str, compose: Option<(&str, &str)>) -> ContainerRecord {
        ContainerRecord {
            id: id.into(),
            name: name.into(),
            image: "redis:7".into(),
            status: ContainerStatus::Running,
            ports: vec![],
            start_time: None,
            compose: compose.map(|(project, service)| ComposeLabels {
                project: project.into(),
                service: service.into(),
            }),
        }
    }

    #[test]
    fn test_correlate_sets_project_names() {
        let mut resolver = ProjectResolver::new(Box::new(FixedReader));
        let snapshot = correlate(
            vec![
                process(100, "/work/api/src", &[3000]),
                process(200, "/tmp/scratch", &[]),
            ],
            vec![],
            &mut resolver,
            Utc::now(),
        );

        assert_eq!(snapshot.processes[&100].project_name.as_deref(), Some("api"));
        assert_eq!(snapshot.processes[&200].project_name, None);
    }

    #[test]
    fn test_correlate_keeps_first_duplicate() {
        let mut resolver = ProjectResolver::new(Box::new(FixedReader));
        let mut dup = process(100, "/work/other", &[]);
        dup.name = "imposter".into();
        let snapshot = correlate(
            vec![process(100, "/work/api", &[]), dup],
            vec![container("c1", "a", None), container("c1", "b", None)],
            &mut resolver,
            Utc::now(),
        );

        assert_eq!(snapshot.processes.len(), 1);
        assert_eq!(snapshot.processes[&100].name, "node");
        assert_eq!(snapshot.containers.len(), 1);
        assert_eq!(snapshot.containers["c1"].name, "a");
    }

    #[test]
    fn test_correlate_without_containers() {
        let mut resolver = ProjectResolver::new(Box::new(FixedReader));
        let snapshot = correlate(
            vec![process(100, "/work/api", &[3000])],
            vec![],
            &mut resolver,
            Utc::now(),
        );
        assert!(snapshot.containers.is_empty());
        assert_eq!(snapshot.processes[&100].project_name.as_deref(), Some("api"));
        assert!(snapshot.processes[&100].binds(3000));
    }

    #[test]
    fn test_compose_pairing_holds_for_every_record() {
        let mut resolver = ProjectResolver::new(Box::new(FixedReader));
        let snapshot = correlate(
            vec![],
            vec![
                container("a", "shop-db-1", Some(("shop", "db"))),
                container("b", "lonely", None),
            ],
            &mut resolver,
            Utc::now(),
        );
        for c in snapshot.containers.values() {
            assert_eq!(c.compose_project().is_none(), c.compose_service().is_none());
        }
    }

    #[test]
    fn test_compose_groups_order() {
        let mut resolver = ProjectResolver::new(Box::new(FixedReader));
        let snapshot = correlate(
            vec![],
            vec![
                container("1", "shop-web-1", Some(("shop", "web"))),
                container("2", "zeta", None),
                container("3", "shop-db-1", Some(("shop", "db"))),
                container("4", "blog-app-1", Some(("blog", "app"))),
                container("5", "alpha", None),
            ],
            &mut resolver,
            Utc::now(),
        );

        let groups = compose_groups(&snapshot);
        let shape: Vec<(Option<&str>, Vec<&str>)> = groups
            .iter()
            .map(|g| (g.project, g.containers.iter().map(|c| c.name.as_str()).collect()))
            .collect();

        assert_eq!(
            shape,
            vec![
                (Some("blog"), vec!["blog-app-1"]),
                (Some("shop"), vec!["shop-db-1", "shop-web-1"]),
                (None, vec!["alpha", "zeta"]),
            ]
        );
    }

    #[test]
    fn test_processes_by_project() {
        let mut resolver = ProjectResolver::new(Box::new(FixedReader));
        let snapshot = correlate(
            vec![
                process(1, "/work/api", &[]),
                process(2, "/work/api/src", &[]),
                process(3, "/opt/tool", &[]),
            ],
            vec![],
            &mut resolver,
            Utc::now(),
        );
        let grouped = processes_by_project(&snapshot);
        assert_eq!(grouped[&Some("api")].len(), 2);
        assert_eq!(grouped[&None].len(), 1);
    }
}
