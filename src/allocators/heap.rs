//! Heap pool backend - counted, signed blocks straight from the raw allocator.
//!
//! Each block carries a small header in front of the payload so `free` can
//! recover the layout and check that the block belongs to this pool.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::allocators::raw::SharedRawAllocator;
use crate::api::error::PoolError;
use crate::diagnostics::{emit, emit_with_context, PH201, PH301};
use crate::sync::atomics::{AtomicCounter, AtomicGauge};
use crate::util::layout::{align_up, is_valid_alignment};

/// Source of per-pool signatures.
static NEXT_SIGNATURE: AtomicU64 = AtomicU64::new(1);

/// Header stored immediately before every payload.
#[derive(Clone, Copy)]
#[repr(C)]
struct BlockHeader {
    /// Bytes obtained from the raw allocator
    block_size: usize,
    /// Alignment passed to the raw allocator
    alignment: usize,
    /// Payload bytes requested by the caller
    payload: usize,
    /// Owner signature
    signature: u64,
}

const HEADER_BYTES: usize = std::mem::size_of::<BlockHeader>();

/// Wrapper around a raw allocator that counts what passes through it.
pub(crate) struct HeapCore {
    /// Backing allocator
    allocator: SharedRawAllocator,

    /// Stamp written into every header
    signature: u64,

    /// Live allocation count
    allocation_count: AtomicUsize,

    /// Live payload bytes
    allocated_bytes: AtomicGauge,

    /// High-water mark of live payload bytes
    peak_bytes: AtomicGauge,

    /// Successful allocations over the pool's lifetime
    total_allocations: AtomicCounter,

    /// Failed allocations over the pool's lifetime
    failed_allocations: AtomicCounter,
}

impl HeapCore {
    /// Wrap `allocator`.
    pub fn new(allocator: SharedRawAllocator) -> Self {
        let id = NEXT_SIGNATURE.fetch_add(1, Ordering::Relaxed);
        Self {
            allocator,
            signature: id.wrapping_mul(0x5bd1_e995).rotate_left(24),
            allocation_count: AtomicUsize::new(0),
            allocated_bytes: AtomicGauge::new(0),
            peak_bytes: AtomicGauge::new(0),
            total_allocations: AtomicCounter::new(0),
            failed_allocations: AtomicCounter::new(0),
        }
    }

    /// Allocate `size` bytes aligned to `alignment`.
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        assert!(is_valid_alignment(alignment), "alignment must be a non-zero power of two");

        let alignment = alignment.max(std::mem::align_of::<BlockHeader>());
        let header_size = align_up(HEADER_BYTES, alignment);
        let Some(block_size) = header_size.checked_add(size) else {
            self.failed_allocations.increment();
            return Err(PoolError::OutOfMemory { size, alignment });
        };

        let Some(block) = self.allocator.allocate(block_size, alignment) else {
            self.failed_allocations.increment();
            return Err(PoolError::OutOfMemory { size: block_size, alignment });
        };

        // SAFETY: the block holds header_size + size bytes; the header slot ends
        // exactly at the payload and is aligned because header_size and the
        // header are multiples of its alignment.
        let payload = unsafe {
            let payload = block.as_ptr().add(header_size);
            let header = payload.sub(HEADER_BYTES) as *mut BlockHeader;
            header.write(BlockHeader {
                block_size,
                alignment,
                payload: size,
                signature: self.signature,
            });
            NonNull::new_unchecked(payload)
        };

        self.allocation_count.fetch_add(1, Ordering::AcqRel);
        self.peak_bytes.update_max(self.allocated_bytes.add(size));
        self.total_allocations.increment();

        Ok(payload)
    }

    /// Release a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on a heap pool and not have been freed.
    pub unsafe fn free(&self, ptr: NonNull<u8>) -> Result<(), PoolError> {
        let header = (ptr.as_ptr().sub(HEADER_BYTES) as *const BlockHeader).read();

        if header.signature != self.signature {
            emit(&PH201);
            return Err(PoolError::SignatureMismatch);
        }

        let header_size = align_up(HEADER_BYTES, header.alignment);
        let block = NonNull::new_unchecked(ptr.as_ptr().sub(header_size));

        #[cfg(feature = "debug")]
        crate::debug::poison::poison_freed(block.as_ptr(), header.block_size);

        self.allocator.free(block, header.block_size, header.alignment);

        self.allocation_count.fetch_sub(1, Ordering::AcqRel);
        self.allocated_bytes.sub(header.payload);

        Ok(())
    }

    /// Get live allocation count.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Acquire)
    }

    /// Get live payload bytes.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.get()
    }

    /// Get the payload high-water mark.
    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes.get()
    }

    /// Get successful allocations over the pool's lifetime.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.get()
    }

    /// Get failed allocations over the pool's lifetime.
    pub fn failed_allocations(&self) -> u64 {
        self.failed_allocations.get()
    }
}

impl Drop for HeapCore {
    fn drop(&mut self) {
        if self.allocation_count() != 0 {
            emit_with_context(&PH301, "heap pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::raw::system_allocator;
    use crate::util::layout::is_ptr_aligned;

    #[test]
    fn test_heap_allocation() {
        let heap = HeapCore::new(system_allocator());

        let ptr = heap.allocate(std::mem::size_of::<u64>(), 8).unwrap();
        assert_eq!(heap.allocated_bytes(), 8);
        assert_eq!(heap.allocation_count(), 1);

        unsafe {
            (ptr.as_ptr() as *mut u64).write(0xdead_beef);
            heap.free(ptr).unwrap();
        }

        assert_eq!(heap.allocated_bytes(), 0);
        assert_eq!(heap.allocation_count(), 0);
        assert_eq!(heap.peak_bytes(), 8);
    }

    #[test]
    fn test_large_alignment() {
        let heap = HeapCore::new(system_allocator());

        let ptr = heap.allocate(100, 256).unwrap();
        assert!(is_ptr_aligned(ptr.as_ptr(), 256));

        unsafe { heap.free(ptr).unwrap() };
    }

    #[test]
    fn test_cross_pool_free_rejected() {
        let a = HeapCore::new(system_allocator());
        let b = HeapCore::new(system_allocator());

        let ptr = a.allocate(32, 16).unwrap();
        assert_eq!(unsafe { b.free(ptr) }, Err(PoolError::SignatureMismatch));
        assert_eq!(a.allocation_count(), 1);

        unsafe { a.free(ptr).unwrap() };
    }
}
