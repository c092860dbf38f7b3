/*!
 * Host Storage Module
 * Providers serving root mount points
 */

pub mod local;
pub mod memory;
pub mod traits;

pub use local::LocalStorage;
pub use memory::MemStorage;
pub use traits::HostStorage;
