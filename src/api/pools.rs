//! Pool handles.
//!
//! Every pool is a cheap, clonable handle around a shared implementation
//! object. The implementation lives until the last handle is dropped, and two
//! handles compare equal exactly when they share it.

use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::allocators::chain::ChainCore;
use crate::allocators::heap::HeapCore;
use crate::allocators::raw::{system_allocator, SharedRawAllocator};
use crate::allocators::stack::StackArena;
use crate::api::checkpoint::{RewindGuard, StackSnapshot};
use crate::api::config::{ChainPoolConfig, FreeMode, StackPoolConfig, DEFAULT_ALIGNMENT};
use crate::api::error::PoolError;
use crate::api::stats::PoolStats;
use crate::api::wrappers::{PoolBox, PoolSlice};
use crate::diagnostics::{emit, emit_with_context, PH002, PH102, PH103, PH301};

// =============================================================================
// Heap pool
// =============================================================================

/// General purpose pool forwarding every request to its backing allocator.
///
/// Blocks can be freed in any order. Each one carries a small header so
/// that `free` needs nothing but the pointer.
///
/// # Example
///
/// ```rust
/// use poolhive::HeapPool;
///
/// let pool = HeapPool::system();
/// let ptr = pool.allocate(64, 16).unwrap();
/// unsafe { pool.free(ptr).unwrap() };
/// assert_eq!(pool.allocation_count(), 0);
/// ```
#[derive(Clone)]
pub struct HeapPool {
    inner: Arc<HeapCore>,
}

impl HeapPool {
    /// Create a heap pool over `allocator`.
    pub fn new(allocator: SharedRawAllocator) -> Self {
        Self {
            inner: Arc::new(HeapCore::new(allocator)),
        }
    }

    /// Create a heap pool over the system allocator.
    pub fn system() -> Self {
        Self::new(system_allocator())
    }

    /// Allocate `size` bytes aligned to `alignment`.
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        self.inner.allocate(size, alignment)
    }

    /// Allocate uninitialized storage for one `T`.
    pub fn alloc<T>(&self) -> Result<NonNull<T>, PoolError> {
        self.allocate(mem::size_of::<T>(), mem::align_of::<T>())
            .map(NonNull::cast)
    }

    /// Move `value` into the pool. Dropping the box drops the value and frees it.
    pub fn new_instance<T>(&self, value: T) -> Result<PoolBox<T, Self>, PoolError> {
        PoolBox::new_in(value, self.clone())
    }

    /// Build `len` values with `f(index)` in one block.
    pub fn new_array<T, F>(&self, len: usize, f: F) -> Result<PoolSlice<T, Self>, PoolError>
    where
        F: FnMut(usize) -> T,
    {
        PoolSlice::from_fn_in(len, f, self.clone())
    }

    /// Return a block to the pool.
    ///
    /// A block whose header does not carry this pool's signature is refused
    /// with [`PoolError::SignatureMismatch`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on a heap pool and must not be used
    /// after this call.
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> Result<(), PoolError> {
        self.inner.free(ptr)
    }

    /// Live allocations.
    pub fn allocation_count(&self) -> usize {
        self.inner.allocation_count()
    }

    /// Payload bytes currently allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes()
    }

    /// Number of live handles to this pool.
    pub fn users_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Snapshot of the pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated_bytes: self.inner.allocated_bytes(),
            peak_bytes: self.inner.peak_bytes(),
            allocation_count: self.inner.allocation_count(),
            total_allocations: self.inner.total_allocations(),
            failed_allocations: self.inner.failed_allocations(),
            capacity: 0,
        }
    }
}

impl PartialEq for HeapPool {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for HeapPool {}

impl fmt::Debug for HeapPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapPool")
            .field("allocation_count", &self.allocation_count())
            .field("allocated_bytes", &self.allocated_bytes())
            .finish()
    }
}

// =============================================================================
// Stack pool
// =============================================================================

struct StackPoolInner {
    arena: StackArena,
    free_mode: FreeMode,
}

impl Drop for StackPoolInner {
    fn drop(&mut self) {
        let live = self.arena.allocation_count();
        if live != 0 {
            emit_with_context(&PH301, &format!("stack pool, {} live allocation(s)", live));
        }
    }
}

/// Bump pool over one fixed buffer.
///
/// Allocation is a single atomic cursor bump and is safe from any number of
/// threads. Freeing only gives memory back when done in reverse allocation
/// order; otherwise space is recovered by [`reset`](Self::reset) or by
/// rewinding to a [`StackSnapshot`].
///
/// # Example
///
/// ```rust
/// use poolhive::StackPool;
///
/// let pool = StackPool::system(1024).unwrap();
/// let a = pool.allocate(32, 8).unwrap();
/// let b = pool.allocate(32, 8).unwrap();
///
/// unsafe {
///     pool.free(b).unwrap();
///     pool.free(a).unwrap();
/// }
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
#[derive(Clone)]
pub struct StackPool {
    inner: Arc<StackPoolInner>,
}

impl StackPool {
    /// Create a stack pool of `capacity` bytes (rounded up to `alignment`).
    pub fn new(
        allocator: SharedRawAllocator,
        capacity: usize,
        alignment: usize,
    ) -> Result<Self, PoolError> {
        Self::with_config(
            allocator,
            StackPoolConfig::default()
                .with_capacity(capacity)
                .with_alignment(alignment),
        )
    }

    /// Create a stack pool from a full configuration.
    pub fn with_config(
        allocator: SharedRawAllocator,
        config: StackPoolConfig,
    ) -> Result<Self, PoolError> {
        let arena = StackArena::new(allocator, config.capacity, config.alignment)?;
        ph_debug!(
            "stack pool created: {} bytes, alignment {}",
            arena.capacity(),
            arena.alignment()
        );

        Ok(Self {
            inner: Arc::new(StackPoolInner {
                arena,
                free_mode: config.free_mode,
            }),
        })
    }

    /// Create a stack pool over the system allocator with the default alignment.
    pub fn system(capacity: usize) -> Result<Self, PoolError> {
        Self::new(system_allocator(), capacity, DEFAULT_ALIGNMENT)
    }

    /// Allocate `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` exceeds the pool alignment.
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        self.inner.arena.allocate(size, alignment).map_err(|err| {
            if let PoolError::Exhausted { requested, remaining } = err {
                emit_with_context(
                    &PH002,
                    &format!("requested {} bytes, {} remaining", requested, remaining),
                );
            }
            err
        })
    }

    /// Allocate uninitialized storage for one `T`.
    pub fn alloc<T>(&self) -> Result<NonNull<T>, PoolError> {
        self.allocate(mem::size_of::<T>(), mem::align_of::<T>())
            .map(NonNull::cast)
    }

    /// Move `value` into the pool. Dropping the box drops the value and frees it.
    pub fn new_instance<T>(&self, value: T) -> Result<PoolBox<T, Self>, PoolError> {
        PoolBox::new_in(value, self.clone())
    }

    /// Build `len` values with `f(index)` in one block.
    pub fn new_array<T, F>(&self, len: usize, f: F) -> Result<PoolSlice<T, Self>, PoolError>
    where
        F: FnMut(usize) -> T,
    {
        PoolSlice::from_fn_in(len, f, self.clone())
    }

    /// Release a block.
    ///
    /// In [`FreeMode::Lifo`] the cursor moves back when `ptr` is the most
    /// recent allocation; any other block yields
    /// [`PoolError::OutOfOrderFree`] and stays in place until reset. In
    /// [`FreeMode::Ignore`] only the live count changes.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this pool since its last reset and
    /// must not be used after this call.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` lies outside the pool buffer.
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> Result<(), PoolError> {
        match self.inner.free_mode {
            FreeMode::Lifo => self.inner.arena.pop(ptr).map_err(|err| {
                emit(&PH102);
                err
            }),
            FreeMode::Ignore => {
                self.inner.arena.forget(ptr);
                Ok(())
            }
        }
    }

    /// Drop every allocation at once.
    ///
    /// All pointers handed out so far become invalid.
    pub fn reset(&self) {
        self.inner.arena.reset();
        ph_trace!("stack pool reset");
    }

    /// Capture the current cursor.
    pub fn snapshot(&self) -> StackSnapshot {
        let arena = &self.inner.arena;
        StackSnapshot::new(
            arena.top(),
            arena.allocation_count(),
            arena.base().as_ptr() as usize,
        )
    }

    /// Move the cursor back to `snapshot`, dropping everything allocated since.
    ///
    /// # Panics
    ///
    /// Panics if the snapshot came from another pool.
    pub fn rewind(&self, snapshot: StackSnapshot) {
        let arena = &self.inner.arena;
        if snapshot.pool_id() != arena.base().as_ptr() as usize
            || snapshot.offset() > arena.capacity()
        {
            emit(&PH103);
            panic!("[{}] snapshot does not belong to this stack pool", PH103.code);
        }
        arena.rewind(snapshot.offset(), snapshot.live_allocations());
    }

    /// Open a scope that rewinds the pool when dropped.
    pub fn scope(&self) -> RewindGuard<'_> {
        RewindGuard::new(self)
    }

    /// Bytes between the buffer start and the cursor.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.arena.top()
    }

    /// Live allocations.
    pub fn allocation_count(&self) -> usize {
        self.inner.arena.allocation_count()
    }

    /// Buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.arena.capacity()
    }

    /// Bytes left past the cursor.
    pub fn remaining(&self) -> usize {
        self.inner.arena.remaining()
    }

    /// Alignment of every block.
    pub fn alignment(&self) -> usize {
        self.inner.arena.alignment()
    }

    /// Bytes reserved in front of each payload.
    pub fn header_size(&self) -> usize {
        self.inner.arena.header_size()
    }

    /// How `free` treats blocks.
    pub fn free_mode(&self) -> FreeMode {
        self.inner.free_mode
    }

    /// Address of the first byte of the buffer.
    pub fn base_address(&self) -> usize {
        self.inner.arena.base().as_ptr() as usize
    }

    /// Whether `ptr` points into this pool's buffer.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.inner.arena.contains(ptr)
    }

    /// Number of live handles to this pool.
    pub fn users_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Snapshot of the pool statistics.
    pub fn stats(&self) -> PoolStats {
        let arena = &self.inner.arena;
        PoolStats {
            allocated_bytes: arena.top(),
            peak_bytes: arena.peak(),
            allocation_count: arena.allocation_count(),
            total_allocations: arena.total_allocations(),
            failed_allocations: arena.failed_allocations(),
            capacity: arena.capacity(),
        }
    }
}

impl PartialEq for StackPool {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for StackPool {}

impl fmt::Debug for StackPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackPool")
            .field("capacity", &self.capacity())
            .field("allocated_bytes", &self.allocated_bytes())
            .field("allocation_count", &self.allocation_count())
            .field("free_mode", &self.free_mode())
            .finish()
    }
}

// =============================================================================
// Chain pool
// =============================================================================

/// Growing pool made of stack-allocated chunks.
///
/// When the newest chunk is full a larger one is appended according to the
/// configured [`ChunkGrowth`](crate::ChunkGrowth). A chunk is given back to
/// the backing allocator as soon as every block in it has been freed, so
/// blocks may be freed in any order.
#[derive(Clone)]
pub struct ChainPool {
    inner: Arc<ChainCore>,
}

impl ChainPool {
    /// Create an empty chain pool. Fails on an invalid configuration.
    pub fn new(allocator: SharedRawAllocator, config: ChainPoolConfig) -> Result<Self, PoolError> {
        Ok(Self {
            inner: Arc::new(ChainCore::new(allocator, config)?),
        })
    }

    /// Create a chain pool over the system allocator.
    pub fn system(config: ChainPoolConfig) -> Result<Self, PoolError> {
        Self::new(system_allocator(), config)
    }

    /// Allocate `size` bytes, growing the chain if needed.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` exceeds the pool alignment.
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        self.inner.allocate(size, alignment)
    }

    /// Allocate uninitialized storage for one `T`.
    pub fn alloc<T>(&self) -> Result<NonNull<T>, PoolError> {
        self.allocate(mem::size_of::<T>(), mem::align_of::<T>())
            .map(NonNull::cast)
    }

    /// Move `value` into the pool. Dropping the box drops the value and frees it.
    pub fn new_instance<T>(&self, value: T) -> Result<PoolBox<T, Self>, PoolError> {
        PoolBox::new_in(value, self.clone())
    }

    /// Build `len` values with `f(index)` in one block.
    pub fn new_array<T, F>(&self, len: usize, f: F) -> Result<PoolSlice<T, Self>, PoolError>
    where
        F: FnMut(usize) -> T,
    {
        PoolSlice::from_fn_in(len, f, self.clone())
    }

    /// Release a block, dropping its chunk once the chunk is empty.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this pool since its last reset and
    /// must not be used after this call.
    ///
    /// # Panics
    ///
    /// Panics if no chunk of this pool contains `ptr`.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        self.inner.free(ptr)
    }

    /// Release every chunk. All pointers become invalid.
    pub fn reset(&self) {
        self.inner.reset()
    }

    /// Chunks currently held.
    pub fn chunk_count(&self) -> usize {
        self.inner.chunk_count()
    }

    /// Nominal sizes of the held chunks, oldest first.
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.inner.chunk_sizes()
    }

    /// Chunks created over the pool's lifetime.
    pub fn chunks_created(&self) -> u64 {
        self.inner.chunks_created()
    }

    /// Bytes in use across all chunks.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes()
    }

    /// Live allocations.
    pub fn allocation_count(&self) -> usize {
        self.inner.allocation_count()
    }

    /// The pool configuration.
    pub fn config(&self) -> &ChainPoolConfig {
        self.inner.config()
    }

    /// Number of live handles to this pool.
    pub fn users_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Snapshot of the pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated_bytes: self.inner.allocated_bytes(),
            peak_bytes: self.inner.peak_bytes(),
            allocation_count: self.inner.allocation_count(),
            total_allocations: self.inner.total_allocations(),
            failed_allocations: self.inner.failed_allocations(),
            capacity: self.inner.capacity(),
        }
    }
}

impl PartialEq for ChainPool {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ChainPool {}

impl fmt::Debug for ChainPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainPool")
            .field("chunk_sizes", &self.chunk_sizes())
            .field("allocation_count", &self.allocation_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::raw::CountingAllocator;
    use crate::api::config::ChunkGrowth;

    #[test]
    fn test_handle_identity() {
        let a = StackPool::system(256).unwrap();
        let b = a.clone();
        let c = StackPool::system(256).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.users_count(), 2);
        drop(b);
        assert_eq!(a.users_count(), 1);
    }

    #[test]
    fn test_last_handle_releases_buffer() {
        let counting = Arc::new(CountingAllocator::system());
        let pool = StackPool::new(counting.clone(), 512, 16).unwrap();
        let other = pool.clone();
        assert_eq!(counting.live_blocks(), 1);

        drop(pool);
        assert_eq!(counting.live_blocks(), 1);
        drop(other);
        assert_eq!(counting.live_blocks(), 0);
    }

    #[test]
    fn test_stack_lifo() {
        let pool = StackPool::system(1024).unwrap();
        let a = pool.allocate(10, 8).unwrap();
        let b = pool.allocate(20, 8).unwrap();
        assert_eq!(pool.allocation_count(), 2);

        unsafe {
            pool.free(b).unwrap();
            pool.free(a).unwrap();
        }
        assert_eq!(pool.allocated_bytes(), 0);
        assert_eq!(pool.allocation_count(), 0);
    }

    #[test]
    fn test_stack_out_of_order_free() {
        let pool = StackPool::system(1024).unwrap();
        let a = pool.allocate(10, 8).unwrap();
        let _b = pool.allocate(10, 8).unwrap();
        let used = pool.allocated_bytes();

        let result = unsafe { pool.free(a) };
        assert_eq!(result, Err(PoolError::OutOfOrderFree));
        assert_eq!(pool.allocated_bytes(), used);
        pool.reset();
    }

    #[test]
    fn test_stack_ignore_mode() {
        let config = StackPoolConfig::minimal().with_free_mode(FreeMode::Ignore);
        let pool = StackPool::with_config(system_allocator(), config).unwrap();
        let a = pool.allocate(10, 8).unwrap();
        let _b = pool.allocate(10, 8).unwrap();
        let used = pool.allocated_bytes();

        unsafe { pool.free(a).unwrap() };
        assert_eq!(pool.allocated_bytes(), used);
        assert_eq!(pool.allocation_count(), 1);
        pool.reset();
    }

    #[test]
    fn test_stack_exhausted() {
        let pool = StackPool::system(64).unwrap();
        let err = pool.allocate(1024, 8).unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { remaining: 64, .. }));
        assert_eq!(pool.allocated_bytes(), 0);
        assert_eq!(pool.stats().failed_allocations, 1);
    }

    #[test]
    fn test_stack_rewind() {
        let pool = StackPool::system(1024).unwrap();
        let _a = pool.allocate(16, 8).unwrap();
        let mark = pool.snapshot();
        let _b = pool.allocate(64, 8).unwrap();
        let _c = pool.allocate(64, 8).unwrap();

        pool.rewind(mark);
        assert_eq!(pool.allocated_bytes(), mark.offset());
        assert_eq!(pool.allocation_count(), 1);
        pool.reset();
    }

    #[test]
    #[should_panic(expected = "PH103")]
    fn test_rewind_foreign_snapshot() {
        let a = StackPool::system(256).unwrap();
        let b = StackPool::system(256).unwrap();
        a.rewind(b.snapshot());
    }

    #[test]
    fn test_stack_typed_alloc() {
        let pool = StackPool::system(256).unwrap();
        let ptr = pool.alloc::<u64>().unwrap();
        unsafe {
            ptr.as_ptr().write(42);
            assert_eq!(*ptr.as_ptr(), 42);
        }
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
        pool.reset();
    }

    #[test]
    fn test_heap_pool_counts() {
        let pool = HeapPool::system();
        let a = pool.allocate(100, 8).unwrap();
        let b = pool.allocate(50, 64).unwrap();
        assert_eq!(pool.allocation_count(), 2);
        assert_eq!(pool.allocated_bytes(), 150);
        assert_eq!(b.as_ptr() as usize % 64, 0);

        unsafe {
            pool.free(a).unwrap();
            pool.free(b).unwrap();
        }
        assert_eq!(pool.allocation_count(), 0);
        assert_eq!(pool.allocated_bytes(), 0);
        assert_eq!(pool.stats().total_allocations, 2);
    }

    #[test]
    fn test_chain_pool_handle() {
        let config = ChainPoolConfig::default()
            .with_chunk_sizes(256, 4096)
            .with_growth(ChunkGrowth::Multiply(2));
        let pool = ChainPool::system(config).unwrap();
        let clone = pool.clone();

        let ptr = clone.allocate(100, 8).unwrap();
        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(pool.stats().allocation_count, 1);

        unsafe { pool.free(ptr) };
        assert_eq!(pool.chunk_count(), 0);
        assert_eq!(pool, clone);
    }

    #[test]
    fn test_chain_pool_rejects_bad_config() {
        let config = ChainPoolConfig::default().with_growth(ChunkGrowth::Multiply(1));
        assert!(matches!(
            ChainPool::system(config),
            Err(PoolError::InvalidConfig(_))
        ));
    }
}
