//! Thread-local allocation buffer: the per-thread heap type.
//!
//! A TLAB keeps per-class free lists of blocks the thread has released, so
//! the common allocate/free pair never touches the main heap. Misses go to
//! the main heap the TLAB is bound to, and [`Tlab::flush`] hands every cached
//! block back so other threads can use it.
//!
//! `Tlab` has no `Drop` impl. It lives in storage whose teardown is driven by
//! the thread lifecycle (see `slot`), and flushing is always explicit.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::error::Result;
use crate::free_list::FreeList;
use crate::main_heap::MainHeap;
use crate::size_class::{self, NUM_SIZE_CLASSES};

/// Maximum total bytes a TLAB holds before returning blocks to the main heap.
const MAX_CACHED_BYTES: usize = 1024 * 1024; // 1 MiB

/// Maximum blocks a single class list holds before half of them go back.
const MAX_CLASS_LENGTH: u32 = 256;

/// Per-thread heap bound to a [`MainHeap`].
pub struct Tlab {
    heap: &'static dyn MainHeap,
    lists: [FreeList; NUM_SIZE_CLASSES],
    /// Total bytes cached across all size classes.
    cached_bytes: usize,
    /// A TLAB belongs to the thread that built it.
    _not_send: PhantomData<*mut ()>,
}

impl Tlab {
    pub fn new(heap: &'static dyn MainHeap) -> Self {
        Self {
            heap,
            lists: [const { FreeList::new() }; NUM_SIZE_CLASSES],
            cached_bytes: 0,
            _not_send: PhantomData,
        }
    }

    /// The main heap this TLAB is bound to.
    pub fn heap(&self) -> &'static dyn MainHeap {
        self.heap
    }

    /// Bytes currently cached by this TLAB.
    pub fn cached_bytes(&self) -> usize {
        self.cached_bytes
    }

    /// Allocate a block for `layout`, from the cache when possible.
    #[inline]
    pub fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>> {
        let Some(cls) = size_class::class_for(layout) else {
            return self.heap.allocate(layout);
        };
        if let Some(block) = self.lists[cls].pop() {
            self.cached_bytes -= size_class::class_to_size(cls);
            return Ok(block);
        }
        // Slow path: fetch from the main heap
        self.heap.allocate(size_class::class_layout(cls))
    }

    /// Release a block obtained from [`Tlab::allocate`] on any TLAB bound to
    /// the same main heap.
    ///
    /// # Safety
    /// `ptr` must have been allocated with `layout` and must not be used afterwards.
    #[inline]
    pub unsafe fn free(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let Some(cls) = size_class::class_for(layout) else {
            unsafe { self.heap.free(ptr, layout) };
            return;
        };
        let list = &mut self.lists[cls];
        unsafe { list.push(ptr) };
        self.cached_bytes += size_class::class_to_size(cls);

        if list.len() > MAX_CLASS_LENGTH {
            self.release_class(cls);
        }
        if self.cached_bytes > MAX_CACHED_BYTES {
            self.scavenge();
        }
    }

    /// Return every cached block to the main heap.
    pub fn flush(&mut self) {
        for cls in 1..NUM_SIZE_CLASSES {
            let blocks = self.lists[cls].detach();
            self.give_back(cls, blocks);
        }
        self.cached_bytes = 0;
    }

    /// Release half of one class list back to the main heap.
    fn release_class(&mut self, cls: usize) {
        let half = self.lists[cls].len() / 2;
        let (count, blocks) = self.lists[cls].pop_batch(half);
        self.cached_bytes -= count as usize * size_class::class_to_size(cls);
        self.give_back(cls, blocks);
    }

    /// Bring the cache down to half its ceiling.
    #[cold]
    fn scavenge(&mut self) {
        let target = MAX_CACHED_BYTES / 2;

        for cls in (1..NUM_SIZE_CLASSES).rev() {
            if self.cached_bytes <= target {
                break;
            }
            if !self.lists[cls].is_empty() {
                let (count, blocks) = self.lists[cls].pop_batch(u32::MAX);
                self.cached_bytes -= count as usize * size_class::class_to_size(cls);
                self.give_back(cls, blocks);
            }
        }
    }

    fn give_back(&self, cls: usize, blocks: FreeList) {
        let layout = size_class::class_layout(cls);
        for block in blocks {
            // SAFETY: cached blocks were allocated from `heap` with their class layout.
            unsafe { self.heap.free(block, layout) };
        }
    }
}

impl fmt::Debug for Tlab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tlab")
            .field("heap", &self.heap)
            .field("cached_bytes", &self.cached_bytes)
            .finish_non_exhaustive()
    }
}
