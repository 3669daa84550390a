//! Working directory → project name resolution
//!
//! Walks a directory and its ancestors looking for a project manifest. The
//! first manifest that yields a name wins. Results are memoized per queried
//! directory for the lifetime of the resolver; the cache is never invalidated
//! and grows with the number of distinct working directories seen.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Reads a project name out of a manifest in exactly one directory.
///
/// Missing, unreadable or malformed manifests are reported as `None`; the
/// resolver then keeps walking upward.
pub trait ManifestReader: Send + Sync {
    fn read_name(&self, dir: &Path) -> Option<String>;
}

/// Reads the `name` field of `package.json`.
#[derive(Clone, Debug, Default)]
pub struct PackageJsonReader;

impl PackageJsonReader {
    pub const FILE_NAME: &'static str = "package.json";
}

impl ManifestReader for PackageJsonReader {
    fn read_name(&self, dir: &Path) -> Option<String> {
        let path = dir.join(Self::FILE_NAME);
        if !path.is_file() {
            return None;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("unreadable manifest {}: {}", path.display(), e);
                return None;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("malformed manifest {}: {}", path.display(), e);
                return None;
            }
        };

        value
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

pub struct ProjectResolver {
    reader: Box<dyn ManifestReader>,
    /// Walk stops after checking this directory (inclusive).
    boundary: Option<PathBuf>,
    cache: HashMap<PathBuf, Option<String>>,
}

impl ProjectResolver {
    pub fn new(reader: Box<dyn ManifestReader>) -> Self {
        Self {
            reader,
            boundary: None,
            cache: HashMap::new(),
        }
    }

    pub fn with_boundary(mut self, boundary: Option<PathBuf>) -> Self {
        self.boundary = boundary.map(|b| canonical(&b));
        self
    }

    /// Symlinked directories are resolved (and cached) under their real path,
    /// so the walk climbs the real ancestors.
    pub fn resolve(&mut self, directory: &Path) -> Option<String> {
        if directory.as_os_str().is_empty() {
            return None;
        }
        let directory = canonical(directory);
        if let Some(hit) = self.cache.get(&directory) {
            return hit.clone();
        }

        let resolved = self.walk(&directory);
        self.cache.insert(directory, resolved.clone());
        resolved
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn walk(&self, directory: &Path) -> Option<String> {
        let mut dir = Some(directory);
        while let Some(current) = dir {
            if let Some(name) = self.reader.read_name(current) {
                return Some(name);
            }
            if self.boundary.as_deref() == Some(current) {
                break;
            }
            dir = current.parent();
        }
        None
    }
}

/// Falls back to the path as given when it cannot be resolved (gone, or not
/// on this filesystem).
fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Default for ProjectResolver {
    fn default() -> Self {
        Self::new(Box::new(PackageJsonReader))
    }
}
