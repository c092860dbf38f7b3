/*!
 * Sync Engine
 * Drives one chain through quiesce, serialize, commit and finalize
 *
 * A failure at any step leaves the pending state in place so the sync can
 * be retried; only a completed commit clears it.
 */

use super::options::{SyncOptions, SyncOutcome};
use crate::controller::{ChainContext, Controller, SyncSnapshot};
use crate::core::errors::{FsError, SyncError, SyncStep};
use crate::monitoring::{span_sync, SyncSpan};
use std::time::Instant;
use tracing::{debug, info};

/// Sync the chain whose outermost layer below the sync layer is `controller`
pub fn run(controller: &dyn Controller, ctx: &ChainContext, options: &SyncOptions) -> Result<SyncOutcome, SyncError> {
    if !controller.is_touched() {
        return Ok(SyncOutcome::Clean);
    }

    let mount_point = ctx.mount_point.to_string();
    let span = span_sync(&mount_point);
    let _entered = span.enter();

    let snapshot = match quiesce_and_prepare(controller, ctx, options, &span) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return Ok(SyncOutcome::Clean),
        Err((step, e)) => return Err(fail(&span, SyncError::new(&mount_point, step, e))),
    };

    if options.is_cancelled() {
        let touched = snapshot.touched();
        controller.abort_sync(snapshot);
        let cancelled = FsError::Busy("sync cancelled before commit".to_string());
        return Err(fail(
            &span,
            SyncError::new(&mount_point, SyncStep::Cancelled, cancelled).with_entries(touched),
        ));
    }

    span.record_step("commit");
    if let Err(e) = controller.commit_backing(&snapshot, options) {
        let touched = snapshot.touched();
        controller.abort_sync(snapshot);
        return Err(fail(
            &span,
            SyncError::new(&mount_point, SyncStep::Commit, e).with_entries(touched),
        ));
    }

    span.record_step("finalize");
    let entries = snapshot.touched_count();
    controller
        .complete_sync(snapshot)
        .map_err(|e| fail(&span, SyncError::new(&mount_point, SyncStep::Finalize, e)))?;

    span.record_committed(entries);
    info!(mount_point = %mount_point, entries, "Synced mount point");
    Ok(SyncOutcome::Committed { entries })
}

/// Wait for streams when asked to, then freeze the pending state
fn quiesce_and_prepare(
    controller: &dyn Controller,
    ctx: &ChainContext,
    options: &SyncOptions,
    span: &SyncSpan,
) -> Result<Option<SyncSnapshot>, (SyncStep, FsError)> {
    let waits = options.wait_for_streams && options.wait.is_blocking();
    let deadline = options.wait.deadline();

    loop {
        span.record_step("quiesce");
        if waits && !ctx.streams.wait_idle(deadline) {
            return Err((
                SyncStep::Quiesce,
                FsError::Busy(format!(
                    "{} streams still open on {}",
                    ctx.streams.count(),
                    ctx.mount_point
                )),
            ));
        }
        if options.is_cancelled() {
            return Err((
                SyncStep::Cancelled,
                FsError::Busy("sync cancelled before serialization".to_string()),
            ));
        }

        span.record_step("serialize");
        match controller.prepare_sync(options) {
            Ok(snapshot) => return Ok(snapshot),
            // A stream opened between the wait and the lock
            Err(e) if e.is_busy() && waits && ctx.streams.count() > 0 && !expired(deadline) => {
                debug!(mount_point = %ctx.mount_point, "Stream reopened during quiesce, waiting again");
            }
            Err(e) if e.is_busy() => return Err((SyncStep::Quiesce, e)),
            Err(e) => return Err((SyncStep::Serialize, e)),
        }
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |deadline| Instant::now() >= deadline)
}

fn fail(span: &SyncSpan, error: SyncError) -> SyncError {
    span.record_error(&error.to_string());
    error
}
