/*!
 * Orphan Reaper
 * Removes pool temp files left behind by processes that died mid-write
 */

use crate::core::errors::{FsError, FsResult};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Temp file prefix for the current process: `{prefix}{pid}-`
pub(super) fn process_prefix(prefix: &str) -> String {
    format!("{}{}-", prefix, std::process::id())
}

/// Delete files in `dir` named `{prefix}{pid}-*` older than `grace`
///
/// Files of the current process are never touched. Returns the number of
/// files removed; individual removal failures are logged and skipped.
pub fn reap_orphans(dir: &Path, prefix: &str, grace: Duration) -> FsResult<usize> {
    let own = process_prefix(prefix);
    let now = SystemTime::now();
    let mut reaped = 0;

    let entries = std::fs::read_dir(dir)
        .map_err(|e| FsError::from_io(e, format!("list temp dir {}", dir.display())))?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !name.starts_with(prefix) || name.starts_with(&own) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < grace {
            debug!(file = name, ?age, "Temp file too young to reap");
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => reaped += 1,
            Err(e) => warn!(file = name, error = %e, "Failed to reap orphaned temp file"),
        }
    }

    if reaped > 0 {
        info!(dir = %dir.display(), reaped, "Reaped orphaned pool temp files");
    }
    Ok(reaped)
}
