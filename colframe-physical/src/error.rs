//! Error-handling module for the crate

use std::path::PathBuf;

use thiserror::Error;

/// Error-Collection for all the possible Errors occurring in this crate
#[derive(Error, Debug)]
pub enum Error {
    /// The allocator could not provide a memory region of the requested size
    #[error("Unable to allocate memory of size {size}")]
    OutOfMemory {
        /// Number of bytes that were requested
        size: usize,
    },
    /// Errors on opening, creating or resizing a file
    #[error("Failed to access \"{}\": {error}", path.display())]
    Io {
        /// Contains the wrapped error
        error: std::io::Error,
        /// File which caused the error
        path: PathBuf,
    },
    /// Memory-mapping a file failed, even after evicting other mappings
    #[error("Memory-map failed for file \"{}\" of size {size}: {error}", path.display())]
    Mmap {
        /// Contains the wrapped error, which carries the OS error code
        error: std::io::Error,
        /// File which was being mapped
        path: PathBuf,
        /// Size of the region that was being mapped
        size: usize,
    },
    /// A value passed through the public API is not acceptable
    #[error("{0}")]
    Value(String),
    /// The requested operation is not supported for the given column type
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    /// An internal consistency check failed
    #[error("Integrity check failed: {0}")]
    Integrity(String),
}

impl Error {
    /// Returns the raw OS error code carried by this error, if any.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Error::Io { error, .. } | Error::Mmap { error, .. } => error.raw_os_error(),
            _ => None,
        }
    }
}

/// Returns early with an [`Error::Integrity`] built from the format arguments
/// if the condition does not hold.
#[macro_export]
macro_rules! ensure_integrity {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::Error::Integrity(format!($($arg)+)));
        }
    };
}
