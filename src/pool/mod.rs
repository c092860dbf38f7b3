/*!
 * I/O Buffer Pool
 * Scratch storage for pending writes, cached reads and serialized archives
 */

mod buffer;
mod pool;
mod reaper;

pub use buffer::{IoBuffer, SealedBuffer};
pub use pool::{IoBufferPool, PoolStats};
pub use reaper::reap_orphans;
