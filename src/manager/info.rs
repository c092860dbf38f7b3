/*!
 * Mount Info
 */

use crate::address::MountPoint;
use crate::controller::ChainState;
use serde::{Deserialize, Serialize};

/// Snapshot of one registered mount point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    pub mount_point: MountPoint,
    pub depth: usize,
    pub state: ChainState,
    pub touched: bool,
    pub open_streams: usize,
}
