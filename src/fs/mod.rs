//! Read-only filesystem: image reader and file-kind dispatch.

pub mod file;
pub mod image;

use spin::Once;

pub use file::FileOps;
pub use image::{Dentry, FileSystem, Statistics};

use crate::error::{KernelError, KernelResult};

static FILESYSTEM: Once<FileSystem> = Once::new();

/// Parse the preloaded image and install it as the global filesystem.
/// A second call fails; the mount is permanent.
pub fn init(image: &'static [u8]) -> KernelResult<()> {
    if FILESYSTEM.get().is_some() {
        return Err(KernelError::AlreadyInitialized { subsystem: "fs" });
    }
    let parsed = FileSystem::new(image)?;
    let stats = parsed.statistics();
    FILESYSTEM.call_once(|| parsed);
    log::info!(
        target: "fs",
        "mounted image: {} dentries, {} inodes, {} data blocks",
        stats.num_dentries,
        stats.num_inodes,
        stats.num_datablocks
    );
    Ok(())
}

/// The mounted filesystem, if `init` has run.
pub fn filesystem() -> KernelResult<&'static FileSystem> {
    FILESYSTEM
        .get()
        .ok_or(KernelError::NotInitialized { subsystem: "fs" })
}
