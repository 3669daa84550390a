use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use devdash_core::cycle::CycleOutcome;
use devdash_core::export::{ExportError, export_to_dir};
use devdash_core::pipeline::Pipeline;
use devdash_core::source::RuntimeAvailability;

use crate::poller::Poller;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("collection timed out after {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Collect once, correlate, and write the result into `dir`.
pub async fn run_snapshot(
    poller: &Poller,
    mut pipeline: Pipeline,
    dir: &Path,
) -> Result<PathBuf, SnapshotError> {
    let outcome = poller.cycle().await;
    if let CycleOutcome::TimedOut { after } = outcome {
        return Err(SnapshotError::TimedOut(after));
    }
    pipeline.ingest(outcome);

    if let Some(RuntimeAvailability::Unavailable { reason }) = pipeline.runtime() {
        eprintln!("warning: containers not collected: {}", reason);
    }

    let Some(snapshot) = pipeline.current() else {
        return Err(SnapshotError::TimedOut(Duration::ZERO));
    };
    let path = export_to_dir(&snapshot, dir)?;
    log::info!("snapshot exported to {}", path.display());
    Ok(path)
}
