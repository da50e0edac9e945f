//! Stack arena - bump allocator with an atomic cursor and in-band size headers.
//!
//! This is the building block for both `StackPool` and the chunks of a
//! `ChainPool`. Every block starts with a header holding the block's total
//! size, so the most recent allocation can be popped without bookkeeping.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::allocators::raw::SharedRawAllocator;
use crate::api::error::PoolError;
use crate::diagnostics::{emit, PH101};
use crate::sync::atomics::{AtomicCounter, AtomicGauge};
use crate::util::layout::{align_up, is_aligned, is_valid_alignment};

/// Bytes of the size field stored in front of every block.
pub(crate) const HEADER_BYTES: usize = std::mem::size_of::<u32>();

/// A fixed buffer carved up by an atomic cursor.
pub(crate) struct StackArena {
    /// Where the buffer came from
    allocator: SharedRawAllocator,

    /// Base pointer of the buffer
    base: NonNull<u8>,

    /// Total capacity in bytes (multiple of `alignment`)
    capacity: usize,

    /// Alignment of every block and payload
    alignment: usize,

    /// Header size rounded up to `alignment`
    header_size: usize,

    /// Cursor, as an offset from `base`
    top: AtomicUsize,

    /// Live allocations
    allocation_count: AtomicUsize,

    /// High-water mark of `top`
    peak: AtomicGauge,

    /// Successful allocations over the arena's lifetime
    total_allocations: AtomicCounter,

    /// Rejected allocations over the arena's lifetime
    failed_allocations: AtomicCounter,
}

// SAFETY: the buffer is only reached through `base`, and the cursor arbitrates
// which thread owns which bytes.
unsafe impl Send for StackArena {}
unsafe impl Sync for StackArena {}

impl StackArena {
    /// Reserve a buffer of `capacity` bytes (rounded up to `alignment`).
    pub fn new(
        allocator: SharedRawAllocator,
        capacity: usize,
        alignment: usize,
    ) -> Result<Self, PoolError> {
        if !is_valid_alignment(alignment) {
            return Err(PoolError::InvalidConfig("alignment must be a non-zero power of two"));
        }
        if capacity == 0 {
            return Err(PoolError::InvalidConfig("capacity must be non-zero"));
        }

        let capacity = align_up(capacity, alignment);
        let base = allocator
            .allocate(capacity, alignment)
            .ok_or(PoolError::OutOfMemory { size: capacity, alignment })?;

        #[cfg(feature = "debug")]
        unsafe {
            crate::debug::poison::poison_pool(base.as_ptr(), capacity);
        }

        Ok(Self {
            allocator,
            base,
            capacity,
            alignment,
            header_size: align_up(HEADER_BYTES, alignment),
            top: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            peak: AtomicGauge::new(0),
            total_allocations: AtomicCounter::new(0),
            failed_allocations: AtomicCounter::new(0),
        })
    }

    /// Bytes a request of `size` consumes, header included.
    pub fn block_size(&self, size: usize) -> Option<usize> {
        let raw = self.header_size.checked_add(size)?;
        raw.checked_add(self.alignment - 1).map(|v| v & !(self.alignment - 1))
    }

    /// Carve a block for `size` payload bytes.
    ///
    /// `alignment` may not exceed the arena alignment. On failure the
    /// cursor is left where it was.
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        assert!(
            alignment <= self.alignment,
            "requested alignment {} exceeds pool alignment {}",
            alignment,
            self.alignment
        );

        let total = match self.block_size(size) {
            Some(total) if total <= self.capacity => total,
            _ => {
                self.failed_allocations.increment();
                return Err(PoolError::Exhausted {
                    requested: size.saturating_add(self.header_size),
                    remaining: self.remaining(),
                });
            }
        };
        assert!(total <= u32::MAX as usize, "allocation too large for a block header");

        let capacity = self.capacity;
        let start = self
            .top
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |top| {
                top.checked_add(total).filter(|&end| end <= capacity)
            })
            .map_err(|top| {
                self.failed_allocations.increment();
                PoolError::Exhausted { requested: total, remaining: capacity - top }
            })?;

        self.peak.update_max(start + total);
        self.total_allocations.increment();
        self.allocation_count.fetch_add(1, Ordering::AcqRel);

        // SAFETY: [start, start + total) lies inside the buffer and the cursor
        // granted it to this call alone.
        unsafe {
            let block = self.base.as_ptr().add(start);

            #[cfg(feature = "debug")]
            crate::debug::poison::poison_pool(block, total);

            std::ptr::write_unaligned(block as *mut u32, total as u32);
            Ok(NonNull::new_unchecked(block.add(self.header_size)))
        }
    }

    /// Offset of the block owning `ptr`, panicking if the arena never handed it out.
    fn block_start(&self, ptr: NonNull<u8>) -> usize {
        let addr = ptr.as_ptr() as usize;
        let base = self.base.as_ptr() as usize;

        let owned = addr >= base + self.header_size
            && addr < base + self.capacity
            && is_aligned(addr - base, self.alignment);
        if !owned {
            emit(&PH101);
            panic!("[{}] pointer {:p} was not allocated by this pool", PH101.code, ptr);
        }

        addr - base - self.header_size
    }

    /// Pop the block at `ptr` if it is the most recent allocation.
    ///
    /// The live count drops either way; an out-of-order block stays
    /// unusable until the next reset or rewind.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this arena and not have been freed
    /// since the last reset.
    pub unsafe fn pop(&self, ptr: NonNull<u8>) -> Result<(), PoolError> {
        let start = self.block_start(ptr);
        let size = std::ptr::read_unaligned(self.base.as_ptr().add(start) as *const u32) as usize;
        debug_assert!(start + size <= self.capacity, "corrupted block header");

        self.allocation_count.fetch_sub(1, Ordering::AcqRel);

        self.top
            .compare_exchange(start + size, start, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| PoolError::OutOfOrderFree)
    }

    /// Drop the live count for `ptr` without touching the cursor.
    pub fn forget(&self, ptr: NonNull<u8>) {
        self.block_start(ptr);
        self.allocation_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Whether `ptr` falls inside this arena's buffer.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let base = self.base.as_ptr() as usize;
        addr >= base && addr < base + self.capacity
    }

    /// Reset the arena, invalidating all allocations.
    pub fn reset(&self) {
        #[cfg(feature = "debug")]
        unsafe {
            crate::debug::poison::poison_pool(self.base.as_ptr(), self.capacity);
        }

        self.top.store(0, Ordering::Release);
        self.allocation_count.store(0, Ordering::Release);
    }

    /// Current cursor.
    pub fn top(&self) -> usize {
        self.top.load(Ordering::Acquire)
    }

    /// Move the cursor back to `top`, keeping at most `live` allocations counted.
    pub fn rewind(&self, top: usize, live: usize) {
        debug_assert!(top <= self.capacity);
        self.top.store(top, Ordering::Release);
        let _ = self
            .allocation_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| Some(count.min(live)));
    }

    /// Get the base pointer.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Get total capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the arena alignment.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Get the aligned header size.
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Get remaining capacity.
    pub fn remaining(&self) -> usize {
        self.capacity - self.top()
    }

    /// Get live allocations.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Acquire)
    }

    /// Get the high-water mark of the cursor.
    pub fn peak(&self) -> usize {
        self.peak.get()
    }

    /// Get successful allocations over the arena's lifetime.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.get()
    }

    /// Get rejected allocations over the arena's lifetime.
    pub fn failed_allocations(&self) -> u64 {
        self.failed_allocations.get()
    }
}

impl Drop for StackArena {
    fn drop(&mut self) {
        // SAFETY: the buffer came from this allocator with this size and alignment
        unsafe {
            #[cfg(feature = "debug")]
            crate::debug::poison::poison_pool(self.base.as_ptr(), self.capacity);

            self.allocator.free(self.base, self.capacity, self.alignment);
        }
    }
}
