//! C-ABI allocation entry points for callers outside Rust.
//!
//! Gated behind `features = ["ffi"]` and exported from the `cdylib`.

use core::alloc::{GlobalAlloc, Layout};

use crate::allocator::Rsttlab;

static ALLOC: Rsttlab = Rsttlab;

/// # Safety
/// `size` and `align` must form a valid [`Layout`].
#[unsafe(export_name = "rsttlab_alloc")]
pub unsafe extern "C" fn rsttlab_alloc(size: usize, align: usize) -> *mut u8 {
    let layout = unsafe { Layout::from_size_align_unchecked(size, align) };
    unsafe { ALLOC.alloc(layout) }
}

/// # Safety
/// `ptr` must come from [`rsttlab_alloc`] or [`rsttlab_realloc`] with the same
/// `size` and `align`.
#[unsafe(export_name = "rsttlab_dealloc")]
pub unsafe extern "C" fn rsttlab_dealloc(ptr: *mut u8, size: usize, align: usize) {
    let layout = unsafe { Layout::from_size_align_unchecked(size, align) };
    unsafe { ALLOC.dealloc(ptr, layout) }
}

/// # Safety
/// Same as [`rsttlab_dealloc`] for the old block, and `new_size` rounded up
/// to `align` must not overflow `isize`.
#[unsafe(export_name = "rsttlab_realloc")]
pub unsafe extern "C" fn rsttlab_realloc(
    ptr: *mut u8,
    size: usize,
    align: usize,
    new_size: usize,
) -> *mut u8 {
    let layout = unsafe { Layout::from_size_align_unchecked(size, align) };
    unsafe { ALLOC.realloc(ptr, layout, new_size) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_realloc_dealloc() {
        unsafe {
            let ptr = rsttlab_alloc(24, 8);
            assert!(!ptr.is_null());
            ptr.write_bytes(0xAB, 24);

            let ptr = rsttlab_realloc(ptr, 24, 8, 500);
            assert!(!ptr.is_null());
            for i in 0..24 {
                assert_eq!(*ptr.add(i), 0xAB);
            }

            rsttlab_dealloc(ptr, 500, 8);
        }
    }
}
