/*!
 * Core Module
 * Configuration, limits and error handling shared by every subsystem
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod serde;

// Re-export for convenience
pub use config::{KernelConfig, PoolConfig};
pub use errors::*;
