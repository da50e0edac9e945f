//! Stack pool snapshots - save and restore points for the cursor.
//!
//! Snapshots allow speculative allocation with rollback capability.
//! This is useful for try/fail patterns where you want to undo
//! allocations if an operation fails.

use std::ops::Deref;

use super::pools::StackPool;

/// A saved cursor position of one stack pool.
///
/// Just a couple of words; rewinding to it drops every allocation made
/// after it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSnapshot {
    /// The saved cursor
    offset: usize,
    /// Live allocations at the time
    live: usize,
    /// Identity of the owning pool (its base address)
    pool: usize,
}

impl StackSnapshot {
    pub(crate) fn new(offset: usize, live: usize, pool: usize) -> Self {
        Self { offset, live, pool }
    }

    /// Get the saved cursor offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Get the live allocation count at the time of the snapshot.
    pub fn live_allocations(&self) -> usize {
        self.live
    }

    pub(crate) fn pool_id(&self) -> usize {
        self.pool
    }
}

/// RAII guard for snapshot-based rollback.
///
/// If not explicitly committed, the pool is rewound on drop.
pub struct RewindGuard<'a> {
    pool: &'a StackPool,
    snapshot: StackSnapshot,
    committed: bool,
}

impl<'a> RewindGuard<'a> {
    pub(crate) fn new(pool: &'a StackPool) -> Self {
        Self {
            pool,
            snapshot: pool.snapshot(),
            committed: false,
        }
    }

    /// Keep the allocations, preventing rollback.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Get the snapshot this guard rewinds to.
    pub fn snapshot(&self) -> StackSnapshot {
        self.snapshot
    }
}

impl<'a> Deref for RewindGuard<'a> {
    type Target = StackPool;

    fn deref(&self) -> &StackPool {
        self.pool
    }
}

impl<'a> Drop for RewindGuard<'a> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.rewind(self.snapshot);
        }
    }
}

/// Result of a speculative allocation block.
#[derive(Debug)]
pub enum SpeculativeResult<T, E> {
    /// The operation succeeded, allocations are kept.
    Success(T),
    /// The operation failed, allocations were rolled back.
    RolledBack(E),
}

impl<T, E> SpeculativeResult<T, E> {
    /// Check if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Check if the operation was rolled back.
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Self::RolledBack(_))
    }

    /// Convert to a Result.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(t) => Ok(t),
            Self::RolledBack(e) => Err(e),
        }
    }
}

impl StackPool {
    /// Run `f` against the pool, rolling back its allocations if it fails.
    pub fn speculate<T, E, F>(&self, f: F) -> SpeculativeResult<T, E>
    where
        F: FnOnce(&StackPool) -> Result<T, E>,
    {
        let guard = RewindGuard::new(self);
        match f(self) {
            Ok(value) => {
                guard.commit();
                SpeculativeResult::Success(value)
            }
            Err(err) => {
                drop(guard);
                SpeculativeResult::RolledBack(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::PoolError;

    #[test]
    fn test_guard_rolls_back() {
        let pool = StackPool::system(1024).unwrap();
        let _ = pool.allocate(32, 8).unwrap();
        let before = pool.allocated_bytes();

        {
            let scope = pool.scope();
            let _ = scope.allocate(64, 8).unwrap();
            let _ = scope.allocate(64, 8).unwrap();
            assert!(pool.allocated_bytes() > before);
        }

        assert_eq!(pool.allocated_bytes(), before);
        assert_eq!(pool.allocation_count(), 1);
    }

    #[test]
    fn test_guard_commit_keeps() {
        let pool = StackPool::system(1024).unwrap();

        let scope = pool.scope();
        let _ = scope.allocate(64, 8).unwrap();
        let after = pool.allocated_bytes();
        scope.commit();

        assert_eq!(pool.allocated_bytes(), after);
    }

    #[test]
    fn test_speculate() {
        let pool = StackPool::system(1024).unwrap();

        let ok: SpeculativeResult<(), PoolError> = pool.speculate(|p| p.allocate(16, 8).map(|_| ()));
        assert!(ok.is_success());
        let kept = pool.allocated_bytes();

        let failed = pool.speculate(|p| {
            p.allocate(16, 8)?;
            p.allocate(4096, 8)
        });
        assert!(failed.is_rolled_back());
        assert!(failed.into_result().is_err());
        assert_eq!(pool.allocated_bytes(), kept);
    }
}
