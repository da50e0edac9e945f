//! Error types for pools and the hive.

use std::fmt;

/// Errors returned by pool operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The backing allocator could not provide memory.
    OutOfMemory {
        /// Bytes requested from the backing allocator.
        size: usize,
        /// Alignment requested from the backing allocator.
        alignment: usize,
    },
    /// A stack pool has no room left for the request.
    Exhausted {
        /// Bytes the request needed, header included.
        requested: usize,
        /// Bytes left in the pool.
        remaining: usize,
    },
    /// A stack free was not for the most recent allocation; the block was not reclaimed.
    OutOfOrderFree,
    /// The heap block header did not carry this pool's signature.
    SignatureMismatch,
    /// Construction parameters were rejected.
    InvalidConfig(&'static str),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::OutOfMemory { size, alignment } => {
                write!(f, "Out of memory ({} bytes, alignment {})", size, alignment)
            }
            PoolError::Exhausted { requested, remaining } => write!(
                f,
                "Pool exhausted ({} bytes requested, {} remaining)",
                requested, remaining
            ),
            PoolError::OutOfOrderFree => write!(f, "Free not in LIFO order, block leaked until reset"),
            PoolError::SignatureMismatch => write!(f, "Heap block signature mismatch"),
            PoolError::InvalidConfig(msg) => write!(f, "Invalid pool configuration: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

/// Errors returned by the hive.
#[derive(Debug)]
pub enum HiveError {
    /// The worker count is outside `1..=MAX_THREADS`.
    InvalidThreadCount(usize),
    /// A worker thread could not be spawned.
    Spawn(std::io::Error),
    /// The internal semaphore arena failed.
    SemaphoreArena(PoolError),
}

impl fmt::Display for HiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HiveError::InvalidThreadCount(n) => write!(f, "Invalid hive thread count: {}", n),
            HiveError::Spawn(err) => write!(f, "Failed to spawn hive worker: {}", err),
            HiveError::SemaphoreArena(err) => write!(f, "Semaphore arena error: {}", err),
        }
    }
}

impl std::error::Error for HiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HiveError::Spawn(err) => Some(err),
            HiveError::SemaphoreArena(err) => Some(err),
            HiveError::InvalidThreadCount(_) => None,
        }
    }
}

impl From<PoolError> for HiveError {
    fn from(err: PoolError) -> Self {
        HiveError::SemaphoreArena(err)
    }
}
