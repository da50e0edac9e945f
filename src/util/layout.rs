//! Layout utilities.

/// Align a size up to the given alignment.
///
/// `align` must be a power of two.
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// Check whether an address is a multiple of `align`.
#[inline]
pub fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}

/// Check whether a pointer satisfies `align`.
#[inline]
pub fn is_ptr_aligned(ptr: *const u8, align: usize) -> bool {
    is_aligned(ptr as usize, align)
}

/// Check that an alignment is usable: non-zero and a power of two.
#[inline]
pub const fn is_valid_alignment(align: usize) -> bool {
    align != 0 && align.is_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(4, 64), 64);
    }

    #[test]
    fn test_alignment_checks() {
        assert!(is_valid_alignment(1));
        assert!(is_valid_alignment(16));
        assert!(!is_valid_alignment(0));
        assert!(!is_valid_alignment(24));

        assert!(is_aligned(32, 16));
        assert!(!is_aligned(40, 16));
    }
}
