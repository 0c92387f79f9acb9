//! `GlobalAlloc` front end over the calling thread's TLAB.
//!
//! `Rsttlab` is zero-sized; all state lives in the thread slots and the main
//! heap. A thread that cannot build a TLAB allocates from the main heap
//! directly, so allocation keeps working while a thread is being torn down.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use crate::lifecycle;
use crate::main_heap;
use crate::size_class;

/// Allocator that serves every thread from its own TLAB.
///
/// Register as the global allocator with:
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: rsttlab::Rsttlab = rsttlab::Rsttlab;
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Rsttlab;

unsafe impl GlobalAlloc for Rsttlab {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.size() == 0 {
            return ptr::without_provenance_mut(layout.align());
        }

        let block = match lifecycle::tlab() {
            // SAFETY: the TLAB belongs to this thread and no other borrow is live.
            Ok(mut tlab) => unsafe { tlab.as_mut() }.allocate(layout),
            Err(_) => main_heap::get().allocate(layout),
        };
        block.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        let Some(block) = NonNull::new(ptr) else {
            return;
        };

        match lifecycle::tlab() {
            // SAFETY: the caller hands back a block this allocator produced for `layout`.
            Ok(mut tlab) => unsafe { tlab.as_mut().free(block, layout) },
            Err(_) => unsafe { main_heap::get().free(block, layout) },
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.alloc(layout) };
        if !ptr.is_null() && layout.size() > 0 {
            unsafe { ptr::write_bytes(ptr, 0, layout.size()) };
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: the caller guarantees `new_size` rounded to `layout.align()` fits isize.
        let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };

        if ptr.is_null() || layout.size() == 0 {
            return unsafe { self.alloc(new_layout) };
        }

        if new_size == 0 {
            unsafe { self.dealloc(ptr, layout) };
            return ptr::without_provenance_mut(layout.align());
        }

        // Fast path: the block's size class already covers the new size.
        if let (Some(old_class), Some(new_class)) = (
            size_class::class_for(layout),
            size_class::class_for(new_layout),
        ) {
            if old_class == new_class {
                return ptr;
            }
        }

        let new_ptr = unsafe { self.alloc(new_layout) };
        if !new_ptr.is_null() {
            let copy_size = layout.size().min(new_size);
            unsafe { ptr::copy_nonoverlapping(ptr, new_ptr, copy_size) };
            unsafe { self.dealloc(ptr, layout) };
        }
        new_ptr
    }
}
