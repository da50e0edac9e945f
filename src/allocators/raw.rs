//! Aligned raw allocation - the capability every pool draws its memory from.
//!
//! Pools never call the global allocator directly. They hold a
//! [`SharedRawAllocator`], so tests can inject counting or failing backends.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::diagnostics::{emit_with_context, PH001};
use crate::util::layout::{is_ptr_aligned, is_valid_alignment};

/// A backing allocator that hands out aligned blocks.
///
/// `free` receives the same size and alignment that were passed to the
/// `allocate` call which produced the pointer.
pub trait RawAllocator: Send + Sync {
    /// Allocate at least `size` bytes aligned to `alignment`.
    ///
    /// Returns `None` when the request cannot be satisfied. Implementations
    /// must not retry.
    fn allocate(&self, size: usize, alignment: usize) -> Option<NonNull<u8>>;

    /// Release a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with the same
    /// `size` and `alignment`, and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize, alignment: usize);
}

/// Shared handle to a backing allocator.
pub type SharedRawAllocator = Arc<dyn RawAllocator>;

/// The platform allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl RawAllocator for SystemAllocator {
    fn allocate(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        allocate_aligned(size, alignment)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        free_aligned(ptr, size, alignment);
    }
}

/// Create a shared handle to the platform allocator.
pub fn system_allocator() -> SharedRawAllocator {
    Arc::new(SystemAllocator)
}

/// Layout used for both halves of an aligned allocation.
///
/// Alignment is raised to at least pointer size, zero sizes become one byte.
fn raw_layout(size: usize, alignment: usize) -> Option<Layout> {
    assert!(is_valid_alignment(alignment), "alignment must be a non-zero power of two");
    let alignment = alignment.max(std::mem::size_of::<usize>());
    Layout::from_size_align(size.max(1), alignment).ok()
}

/// Allocate `size` bytes aligned to `alignment` from the platform allocator.
///
/// Failure is reported through the `PH001` diagnostic and returned as `None`.
pub fn allocate_aligned(size: usize, alignment: usize) -> Option<NonNull<u8>> {
    let Some(layout) = raw_layout(size, alignment) else {
        emit_with_context(&PH001, "size overflows the address space");
        return None;
    };

    // SAFETY: layout has a non-zero size
    let ptr = unsafe { alloc(layout) };

    match NonNull::new(ptr) {
        Some(ptr) => {
            debug_assert!(is_ptr_aligned(ptr.as_ptr(), alignment));
            Some(ptr)
        }
        None => {
            emit_with_context(&PH001, "platform allocator returned null");
            None
        }
    }
}

/// Release memory obtained from [`allocate_aligned`].
///
/// # Safety
///
/// `ptr` must come from `allocate_aligned(size, alignment)` and must not be
/// used afterwards.
pub unsafe fn free_aligned(ptr: NonNull<u8>, size: usize, alignment: usize) {
    if let Some(layout) = raw_layout(size, alignment) {
        dealloc(ptr.as_ptr(), layout);
    }
}

/// A wrapper that counts live blocks and bytes passing through another allocator.
pub struct CountingAllocator {
    inner: SharedRawAllocator,
    live_blocks: AtomicUsize,
    live_bytes: AtomicUsize,
    total_blocks: AtomicUsize,
}

impl CountingAllocator {
    /// Wrap `inner`.
    pub fn new(inner: SharedRawAllocator) -> Self {
        Self {
            inner,
            live_blocks: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            total_blocks: AtomicUsize::new(0),
        }
    }

    /// Wrap the platform allocator.
    pub fn system() -> Self {
        Self::new(system_allocator())
    }

    /// Blocks currently outstanding.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.load(Ordering::Acquire)
    }

    /// Bytes currently outstanding.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Acquire)
    }

    /// Blocks handed out over the allocator's lifetime.
    pub fn total_blocks(&self) -> usize {
        self.total_blocks.load(Ordering::Relaxed)
    }
}

impl RawAllocator for CountingAllocator {
    fn allocate(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let ptr = self.inner.allocate(size, alignment)?;
        self.live_blocks.fetch_add(1, Ordering::AcqRel);
        self.live_bytes.fetch_add(size, Ordering::AcqRel);
        self.total_blocks.fetch_add(1, Ordering::Relaxed);
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        self.inner.free(ptr, size, alignment);
        self.live_blocks.fetch_sub(1, Ordering::AcqRel);
        self.live_bytes.fetch_sub(size, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_respected() {
        for &align in &[1usize, 8, 16, 64, 256, 4096] {
            let ptr = allocate_aligned(100, align).expect("allocation");
            assert!(is_ptr_aligned(ptr.as_ptr(), align));
            unsafe { free_aligned(ptr, 100, align) };
        }
    }

    #[test]
    fn test_zero_size_is_usable() {
        let ptr = allocate_aligned(0, 16).expect("allocation");
        unsafe { free_aligned(ptr, 0, 16) };
    }

    #[test]
    fn test_oversized_request_fails() {
        assert!(allocate_aligned(usize::MAX - 8, 16).is_none());
    }

    #[test]
    fn test_counting_allocator() {
        let counting = CountingAllocator::system();

        let a = counting.allocate(64, 16).unwrap();
        let b = counting.allocate(32, 8).unwrap();
        assert_eq!(counting.live_blocks(), 2);
        assert_eq!(counting.live_bytes(), 96);

        unsafe {
            counting.free(a, 64, 16);
            counting.free(b, 32, 8);
        }

        assert_eq!(counting.live_blocks(), 0);
        assert_eq!(counting.total_blocks(), 2);
    }
}
