//! Snapshot export to timestamp-named JSON files.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{ContainerRecord, ProcessRecord, Snapshot};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// On-disk shape of an export. Always the full snapshot, never a filtered view.
#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    timestamp: DateTime<Utc>,
    processes: Vec<&'a ProcessRecord>,
    containers: Vec<&'a ContainerRecord>,
}

impl<'a> From<&'a Snapshot> for ExportRecord<'a> {
    fn from(snapshot: &'a Snapshot) -> Self {
        Self {
            timestamp: snapshot.taken_at,
            processes: snapshot.processes.values().collect(),
            containers: snapshot.containers.values().collect(),
        }
    }
}

pub fn to_json(snapshot: &Snapshot) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&ExportRecord::from(snapshot))?)
}

/// Write the snapshot to exactly `path`.
pub fn export(snapshot: &Snapshot, path: &Path) -> Result<(), ExportError> {
    let body = to_json(snapshot)?;
    std::fs::write(path, body).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("exported snapshot to {}", path.display());
    Ok(())
}

/// `snapshot-YYYYMMDD-HHMMSS.json`
pub fn export_file_name(taken_at: DateTime<Utc>) -> String {
    format!("snapshot-{}.json", taken_at.format("%Y%m%d-%H%M%S"))
}

/// Write into `dir` under a timestamp name, creating `dir` if needed. Two
/// exports in the same second get `-1`, `-2`, ... suffixes.
pub fn export_to_dir(snapshot: &Snapshot, dir: &Path) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let body = to_json(snapshot)?;
    let base = export_file_name(snapshot.taken_at);
    let stem = base.trim_end_matches(".json");

    let mut n = 0;
    loop {
        let path = if n == 0 {
            dir.join(&base)
        } else {
            dir.join(format!("{}-{}.json", stem, n))
        };
        // create_new claims the name atomically
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(body.as_bytes())
                    .map_err(|source| ExportError::Io {
                        path: path.clone(),
                        source,
                    })?;
                log::info!("exported snapshot to {}", path.display());
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(source) => return Err(ExportError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::tests::{container, process};
    use chrono::TimeZone;

    fn snapshot() -> Snapshot {
        let mut s = Snapshot::empty(Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap());
        let mut p = process(42, "/work/api", &[3000]);
        p.project_name = Some("api".into());
        s.processes.insert(42, p);
        s.containers
            .insert("abc".into(), container("abc", "shop-db-1", Some(("shop", "db"))));
        s
    }

    #[test]
    fn test_file_name() {
        assert_eq!(export_file_name(snapshot().taken_at), "snapshot-20240309-140507.json");
    }

    #[test]
    fn test_export_writes_full_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_to_dir(&snapshot(), dir.path()).unwrap();
        assert_eq!(path, dir.path().join("snapshot-20240309-140507.json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["timestamp"], "2024-03-09T14:05:07Z");
        assert_eq!(value["processes"][0]["pid"], 42);
        assert_eq!(value["processes"][0]["project_name"], "api");
        assert_eq!(value["processes"][0]["listening_ports"][0], 3000);
        assert_eq!(value["containers"][0]["compose"]["project"], "shop");
        assert_eq!(value["containers"][0]["status"], "running");
    }

    #[test]
    fn test_collisions_get_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let s = snapshot();
        let first = export_to_dir(&s, dir.path()).unwrap();
        let second = export_to_dir(&s, dir.path()).unwrap();
        let third = export_to_dir(&s, dir.path()).unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("snapshot-20240309-140507-1.json"));
        assert!(third.ends_with("snapshot-20240309-140507-2.json"));
    }

    #[test]
    fn test_existing_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("snapshot-20240309-140507.json");
        std::fs::write(&taken, "keep me").unwrap();

        let path = export_to_dir(&snapshot(), dir.path()).unwrap();
        assert!(path.ends_with("snapshot-20240309-140507-1.json"));
        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "keep me");
    }

    #[test]
    fn test_concurrent_exports_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = std::sync::Arc::new(snapshot());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = std::sync::Arc::clone(&s);
                let dir = dir.path().to_path_buf();
                std::thread::spawn(move || export_to_dir(&s, &dir).unwrap())
            })
            .collect();
        let paths: std::collections::BTreeSet<_> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(paths.len(), 8);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 8);
    }

    #[test]
    fn test_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let path = export_to_dir(&snapshot(), &nested).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing-dir").join("out.json");
        let err = export(&snapshot(), &target).unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }
}
