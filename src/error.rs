//! Kernel error types.
//!
//! Fallible kernel paths return these enums instead of raw `-1` sentinels;
//! the syscall layer is the single place where an error collapses to the
//! user-visible `-1`.

use core::fmt;

/// Main kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Filesystem-related errors
    Fs(FsError),

    /// Name lookup failed (file, dentry, process)
    NotFound,

    /// An index was outside its table (FD, PID, terminal)
    OutOfRange {
        index: usize,
        limit: usize,
    },

    /// A caller-supplied argument was unusable
    InvalidArgument {
        name: &'static str,
    },

    /// The named file is not a loadable executable
    NotExecutable,

    /// A fixed table has no free slot
    ResourceExhausted {
        resource: &'static str,
    },

    /// Subsystem used before its init() ran
    NotInitialized {
        subsystem: &'static str,
    },

    /// Subsystem init() ran twice
    AlreadyInitialized {
        subsystem: &'static str,
    },
}

/// Filesystem-specific errors.
///
/// End-of-file is deliberately *not* an error: `read_data` reports it as
/// `Ok(0)` so callers can tell it apart from a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No dentry matches the requested name
    NotFound,
    /// Dentry, inode, or data-block index outside the image
    OutOfRange,
    /// Null/empty buffer or malformed name
    InvalidArgument,
    /// Image too small to hold the structures its header claims
    Truncated,
}

/// Result type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fs(e) => write!(f, "filesystem error: {}", e),
            Self::NotFound => write!(f, "not found"),
            Self::OutOfRange { index, limit } => {
                write!(f, "index {} out of range (limit {})", index, limit)
            }
            Self::InvalidArgument { name } => write!(f, "invalid argument '{}'", name),
            Self::NotExecutable => write!(f, "not an executable"),
            Self::ResourceExhausted { resource } => {
                write!(f, "resource exhausted: {}", resource)
            }
            Self::NotInitialized { subsystem } => {
                write!(f, "subsystem not initialized: {}", subsystem)
            }
            Self::AlreadyInitialized { subsystem } => {
                write!(f, "subsystem already initialized: {}", subsystem)
            }
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file"),
            Self::OutOfRange => write!(f, "block or inode index out of range"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Truncated => write!(f, "image truncated"),
        }
    }
}

impl From<FsError> for KernelError {
    fn from(err: FsError) -> Self {
        Self::Fs(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_error_converts_to_kernel_error() {
        fn helper() -> KernelResult<()> {
            Err(FsError::NotFound)?;
            Ok(())
        }
        assert_eq!(helper(), Err(KernelError::Fs(FsError::NotFound)));
    }

    #[test]
    fn display_is_stable() {
        let e = KernelError::OutOfRange { index: 9, limit: 8 };
        assert_eq!(format!("{}", e), "index 9 out of range (limit 8)");
    }
}
