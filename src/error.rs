//! Crate-wide error type.

/// Errors that can occur anywhere in `ZipCache`.
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure (file read/write/fsync, short read/write).
    Io(std::io::Error),

    /// A key or value violated a size bound (oversized key, invalid threshold).
    InvalidSize,

    /// The requested key was not present in any tier.
    NotFound,

    /// An allocation failed (block allocator exhausted, buffer over capacity).
    OutOfMemory,

    /// A low-level probe hit a tombstone.
    ///
    /// This is never returned from the public router API; it is only used
    /// internally between the DRAM tier and the router's coordinated read.
    Tombstone,

    /// A structural invariant was violated and cannot be locally repaired
    /// (e.g. a super-leaf split could not obtain fresh blocks).
    Inconsistent(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidSize => write!(f, "invalid size"),
            Self::NotFound => write!(f, "not found"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Tombstone => write!(f, "tombstone"),
            Self::Inconsistent(msg) => write!(f, "internal consistency error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
