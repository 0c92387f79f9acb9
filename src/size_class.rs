//! Size classes shared by the TLAB caches and the heap pool.
//!
//! Requests are rounded up to 16-byte steps up to 256 bytes, then to the next
//! power of two up to 32 KiB. Anything larger, or aligned beyond
//! [`CLASS_ALIGN`], bypasses the classes and goes straight to the system.

use core::alloc::Layout;

/// Number of defined size classes (index 0 is the "no class" sentinel).
pub const NUM_SIZE_CLASSES: usize = 24;

/// Largest request served from a size class.
pub const MAX_SMALL_SIZE: usize = 32 * 1024;

/// Alignment every class block is allocated with.
pub const CLASS_ALIGN: usize = 16;

const STEP_SHIFT: u32 = 4;
const STEP_LIMIT: usize = 256;
const STEP_CLASSES: usize = STEP_LIMIT >> STEP_SHIFT;

/// Map a request size to its class. Returns 0 if the size is too large.
#[inline]
pub const fn size_to_class(size: usize) -> usize {
    if size <= STEP_LIMIT {
        if size == 0 {
            return 1;
        }
        return (size + (1 << STEP_SHIFT) - 1) >> STEP_SHIFT;
    }
    if size <= MAX_SMALL_SIZE {
        let shift = usize::BITS - (size - 1).leading_zeros();
        return STEP_CLASSES + (shift as usize - STEP_LIMIT.trailing_zeros() as usize);
    }
    0
}

/// Get the block size of a class.
#[inline]
pub const fn class_to_size(cls: usize) -> usize {
    if cls <= STEP_CLASSES {
        cls << STEP_SHIFT
    } else {
        STEP_LIMIT << (cls - STEP_CLASSES)
    }
}

/// Class serving `layout`, or `None` for large or over-aligned requests.
#[inline]
pub const fn class_for(layout: Layout) -> Option<usize> {
    if layout.align() > CLASS_ALIGN {
        return None;
    }
    match size_to_class(layout.size()) {
        0 => None,
        cls => Some(cls),
    }
}

/// Layout every block of class `cls` is backed by.
#[inline]
pub fn class_layout(cls: usize) -> Layout {
    debug_assert!(cls > 0 && cls < NUM_SIZE_CLASSES);
    // SAFETY: class sizes are non-zero multiples of CLASS_ALIGN, far below isize::MAX.
    unsafe { Layout::from_size_align_unchecked(class_to_size(cls), CLASS_ALIGN) }
}
