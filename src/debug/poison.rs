//! Memory poisoning for debugging.
//!
//! Fills pool memory with a known pattern so stale reads stand out.

/// Pattern written over fresh, handed-out and reset pool memory.
pub const POOL_PATTERN: u8 = 0xCC;

/// Pattern written over heap blocks as they are released.
pub const FREED_PATTERN: u8 = 0xCD;

/// Poison a region of memory with the pool pattern.
///
/// # Safety
///
/// The memory region must be valid and writable.
pub unsafe fn poison_pool(ptr: *mut u8, size: usize) {
    std::ptr::write_bytes(ptr, POOL_PATTERN, size);
}

/// Poison a region of memory with the freed pattern.
///
/// # Safety
///
/// The memory region must be valid and writable.
pub unsafe fn poison_freed(ptr: *mut u8, size: usize) {
    std::ptr::write_bytes(ptr, FREED_PATTERN, size);
}

/// Check if a region is entirely filled with `pattern`.
///
/// # Safety
///
/// The memory region must be valid and readable.
pub unsafe fn is_poisoned(ptr: *const u8, size: usize, pattern: u8) -> bool {
    std::slice::from_raw_parts(ptr, size).iter().all(|&b| b == pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poison_roundtrip() {
        let mut buf = [0u8; 32];
        unsafe {
            poison_pool(buf.as_mut_ptr(), buf.len());
            assert!(is_poisoned(buf.as_ptr(), buf.len(), POOL_PATTERN));

            poison_freed(buf.as_mut_ptr(), 8);
            assert!(is_poisoned(buf.as_ptr(), 8, FREED_PATTERN));
            assert!(!is_poisoned(buf.as_ptr(), 9, FREED_PATTERN));
        }
    }
}
