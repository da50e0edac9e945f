//! Typed values constructed in a pool.
//!
//! [`PoolBox`] and [`PoolSlice`] own values living in pool memory. Dropping
//! one runs the destructors in place, then hands the block back to the pool
//! it came from.
//!
//! Resetting or rewinding a stack or chain pool frees every block at once,
//! boxes included; keep such boxes inside the scope they belong to.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use crate::api::error::PoolError;
use crate::api::pools::{ChainPool, HeapPool, StackPool};

/// A pool that can back a [`PoolBox`] or [`PoolSlice`].
pub trait BlockPool: Clone {
    /// Allocate `size` bytes aligned to `alignment`.
    fn allocate_block(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError>;

    /// Give a block back.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate_block` on this pool and must not be
    /// used afterwards.
    unsafe fn release_block(&self, ptr: NonNull<u8>);
}

impl BlockPool for HeapPool {
    fn allocate_block(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate(size, alignment)
    }

    unsafe fn release_block(&self, ptr: NonNull<u8>) {
        // Our own block always carries our signature.
        let _ = self.free(ptr);
    }
}

impl BlockPool for StackPool {
    fn allocate_block(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate(size, alignment)
    }

    unsafe fn release_block(&self, ptr: NonNull<u8>) {
        // Out of order: PH102 is already out and the block waits for reset.
        let _ = self.free(ptr);
    }
}

impl BlockPool for ChainPool {
    fn allocate_block(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate(size, alignment)
    }

    unsafe fn release_block(&self, ptr: NonNull<u8>) {
        self.free(ptr)
    }
}

// =============================================================================
// PoolBox
// =============================================================================

/// A single value living in pool memory.
///
/// # Example
///
/// ```rust
/// use poolhive::HeapPool;
///
/// let pool = HeapPool::system();
/// let mut value = pool.new_instance(vec![1, 2, 3]).unwrap();
/// value.push(4);
/// assert_eq!(value.len(), 4);
///
/// drop(value);
/// assert_eq!(pool.allocation_count(), 0);
/// ```
pub struct PoolBox<T, P: BlockPool> {
    ptr: NonNull<T>,
    pool: P,
    _owns: PhantomData<T>,
}

impl<T, P: BlockPool> PoolBox<T, P> {
    /// Move `value` into a block from `pool`.
    ///
    /// On failure `value` is dropped and the error returned.
    ///
    /// # Panics
    ///
    /// Stack and chain pools panic if `T` is aligned above the pool alignment.
    pub fn new_in(value: T, pool: P) -> Result<Self, PoolError> {
        let ptr = pool
            .allocate_block(mem::size_of::<T>(), mem::align_of::<T>())?
            .cast::<T>();
        // SAFETY: fresh block, sized and aligned for T.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self {
            ptr,
            pool,
            _owns: PhantomData,
        })
    }

    /// Move the value out and free its block.
    pub fn into_inner(self) -> T {
        let this = mem::ManuallyDrop::new(self);
        // SAFETY: the value is initialized and read exactly once; `this`
        // never runs its destructor.
        unsafe {
            let value = ptr::read(this.ptr.as_ptr());
            let pool = ptr::read(&this.pool);
            pool.release_block(this.ptr.cast());
            value
        }
    }

    /// The pool holding the value.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Raw pointer to the value.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }
}

impl<T, P: BlockPool> Deref for PoolBox<T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: initialized in `new_in` and owned by `self`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, P: BlockPool> DerefMut for PoolBox<T, P> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` is unique.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T, P: BlockPool> Drop for PoolBox<T, P> {
    fn drop(&mut self) {
        // SAFETY: the value is initialized and the block is ours.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            self.pool.release_block(self.ptr.cast());
        }
    }
}

impl<T: fmt::Debug, P: BlockPool> fmt::Debug for PoolBox<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// SAFETY: PoolBox owns its T; the pool handle is shared state.
unsafe impl<T: Send, P: BlockPool + Send> Send for PoolBox<T, P> {}
unsafe impl<T: Sync, P: BlockPool + Sync> Sync for PoolBox<T, P> {}

// =============================================================================
// PoolSlice
// =============================================================================

/// A run of values living in one pool block.
pub struct PoolSlice<T, P: BlockPool> {
    ptr: NonNull<T>,
    len: usize,
    pool: P,
    _owns: PhantomData<T>,
}

/// Drops the elements written so far if a constructor panics.
struct PartialSlice<'a, T, P: BlockPool> {
    ptr: NonNull<T>,
    written: usize,
    pool: &'a P,
}

impl<T, P: BlockPool> Drop for PartialSlice<'_, T, P> {
    fn drop(&mut self) {
        // SAFETY: the first `written` elements are initialized.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.written));
            self.pool.release_block(self.ptr.cast());
        }
    }
}

impl<T, P: BlockPool> PoolSlice<T, P> {
    /// Build `len` values with `f(index)` in one block from `pool`.
    ///
    /// # Panics
    ///
    /// Stack and chain pools panic if `T` is aligned above the pool alignment.
    pub fn from_fn_in<F>(len: usize, mut f: F, pool: P) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> T,
    {
        let size = mem::size_of::<T>()
            .checked_mul(len)
            .ok_or(PoolError::InvalidConfig("array size overflows usize"))?;
        let ptr = pool.allocate_block(size, mem::align_of::<T>())?.cast::<T>();

        let mut partial = PartialSlice {
            ptr,
            written: 0,
            pool: &pool,
        };
        while partial.written < len {
            let value = f(partial.written);
            // SAFETY: in bounds of a block sized for `len` elements.
            unsafe { ptr.as_ptr().add(partial.written).write(value) };
            partial.written += 1;
        }
        mem::forget(partial);

        Ok(Self {
            ptr,
            len,
            pool,
            _owns: PhantomData,
        })
    }

    /// The pool holding the values.
    pub fn pool(&self) -> &P {
        &self.pool
    }
}

impl<T, P: BlockPool> Deref for PoolSlice<T, P> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: `len` initialized elements owned by `self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T, P: BlockPool> DerefMut for PoolSlice<T, P> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as above, and `&mut self` is unique.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T, P: BlockPool> Drop for PoolSlice<T, P> {
    fn drop(&mut self) {
        // SAFETY: every element is initialized and the block is ours.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));
            self.pool.release_block(self.ptr.cast());
        }
    }
}

impl<T: fmt::Debug, P: BlockPool> fmt::Debug for PoolSlice<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// SAFETY: PoolSlice owns its elements; the pool handle is shared state.
unsafe impl<T: Send, P: BlockPool + Send> Send for PoolSlice<T, P> {}
unsafe impl<T: Sync, P: BlockPool + Sync> Sync for PoolSlice<T, P> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::ChainPoolConfig;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counted(Rc<Cell<usize>>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_box_drops_value_and_frees() {
        let pool = HeapPool::system();
        let drops = Rc::new(Cell::new(0));

        let boxed = pool.new_instance(Counted(drops.clone())).unwrap();
        assert_eq!(pool.allocation_count(), 1);
        drop(boxed);

        assert_eq!(drops.get(), 1);
        assert_eq!(pool.allocation_count(), 0);
    }

    #[test]
    fn test_into_inner_frees_without_dropping() {
        let pool = StackPool::system(1024).unwrap();
        let drops = Rc::new(Cell::new(0));

        let boxed = pool.new_instance(Counted(drops.clone())).unwrap();
        let value = boxed.into_inner();
        assert_eq!(drops.get(), 0);
        assert_eq!(pool.allocated_bytes(), 0);

        drop(value);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_stack_boxes_in_reverse() {
        let pool = StackPool::system(1024).unwrap();
        let a = pool.new_instance(1u64).unwrap();
        let mut b = pool.new_instance(2u64).unwrap();
        *b += *a;
        assert_eq!(*b, 3);

        drop(b);
        drop(a);
        assert_eq!(pool.allocated_bytes(), 0);
        assert_eq!(pool.allocation_count(), 0);
    }

    #[test]
    fn test_array_from_fn() {
        let pool = ChainPool::system(ChainPoolConfig::fixed(1024)).unwrap();
        let drops = Rc::new(Cell::new(0));

        let items = pool.new_array(5, |_| Counted(drops.clone())).unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(pool.chunk_count(), 1);

        drop(items);
        assert_eq!(drops.get(), 5);
        assert_eq!(pool.chunk_count(), 0);
    }

    #[test]
    fn test_array_values() {
        let pool = HeapPool::system();
        let mut squares = pool.new_array(4, |i| i * i).unwrap();
        assert_eq!(&*squares, &[0, 1, 4, 9]);
        squares[3] = 0;
        assert_eq!(squares.iter().sum::<usize>(), 5);
    }

    #[test]
    fn test_array_overflow_rejected() {
        let pool = HeapPool::system();
        let result = pool.new_array(usize::MAX, |_| 0u64);
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
        assert_eq!(pool.allocation_count(), 0);
    }

    #[test]
    fn test_panicking_constructor_cleans_up() {
        let pool = HeapPool::system();
        let drops = Rc::new(Cell::new(0));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pool.new_array(4, |i| {
                if i == 2 {
                    panic!("constructor failed");
                }
                Counted(drops.clone())
            })
        }));

        assert!(result.is_err());
        assert_eq!(drops.get(), 2);
        assert_eq!(pool.allocation_count(), 0);
    }

    #[test]
    fn test_failed_allocation_drops_value() {
        let pool = StackPool::system(64).unwrap();
        let drops = Rc::new(Cell::new(0));

        let result = pool.new_instance((Counted(drops.clone()), [0u8; 128]));
        assert!(matches!(result, Err(PoolError::Exhausted { .. })));
        assert_eq!(drops.get(), 1);
    }
}
