/*!
 * File System Manager
 */

mod builder;
mod factory;
mod info;
#[allow(clippy::module_inception)]
mod manager;
mod registry;

pub use builder::FsManagerBuilder;
pub use info::MountInfo;
pub use manager::FsManager;
pub use registry::Registry;
