/*!
 * Sync
 * Committing pending mount point state to backing storage
 */

pub mod engine;
mod options;

pub use options::{CancelToken, SyncOptions, SyncOutcome};
