//! Default main heap: a bounded pool of underlying heaps.
//!
//! Each underlying heap is a spin-locked set of per-class free lists refilled
//! from the system allocator. Threads are bound to heaps through
//! [`MainHeap::acquire_heap`]. A bound thread owns its heap until it calls
//! [`MainHeap::release_heap`]; once every heap is owned, further threads
//! share a heap picked by hashing their identity. Only owned bindings count
//! as outstanding, so the number of outstanding assignments never exceeds
//! the pool capacity no matter how many threads the process has created.

use core::alloc::{GlobalAlloc, Layout};
use core::cell::Cell;
use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::alloc::System;

use crate::config::MAX_HEAPS;
use crate::error::{Error, Result};
use crate::free_list::FreeList;
use crate::main_heap::MainHeap;
use crate::size_class::{self, NUM_SIZE_CLASSES};
use crate::sync::SpinMutex;

/// Blocks a heap keeps per class before handing frees back to the system.
const HEAP_CLASS_LIMIT: u32 = 4096;

struct Heap {
    in_use: AtomicBool,
    lists: SpinMutex<[FreeList; NUM_SIZE_CLASSES]>,
}

impl Heap {
    const fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            lists: SpinMutex::new([const { FreeList::new() }; NUM_SIZE_CLASSES]),
        }
    }
}

#[derive(Clone, Copy)]
struct Binding {
    pool: *const HeapPool,
    index: usize,
    owned: bool,
}

thread_local! {
    static BINDING: Cell<Option<Binding>> = const { Cell::new(None) };
}

/// Snapshot of a pool's assignment counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of underlying heaps threads can own.
    pub capacity: usize,
    /// Heaps currently owned by a thread.
    pub outstanding: usize,
    /// Highest value `outstanding` has reached.
    pub peak_outstanding: usize,
    /// Bindings handed out, owned or shared.
    pub acquires: u64,
    /// Bindings returned, owned or shared.
    pub releases: u64,
}

/// A bounded pool of heaps implementing [`MainHeap`].
pub struct HeapPool {
    capacity: usize,
    heaps: [Heap; MAX_HEAPS],
    outstanding: AtomicUsize,
    peak_outstanding: AtomicUsize,
    acquires: AtomicU64,
    releases: AtomicU64,
}

impl HeapPool {
    /// A pool of `capacity` heaps, clamped to `1..=MAX_HEAPS`.
    pub const fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            1
        } else if capacity > MAX_HEAPS {
            MAX_HEAPS
        } else {
            capacity
        };
        Self {
            capacity,
            heaps: [const { Heap::new() }; MAX_HEAPS],
            outstanding: AtomicUsize::new(0),
            peak_outstanding: AtomicUsize::new(0),
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            outstanding: self.outstanding.load(Ordering::Acquire),
            peak_outstanding: self.peak_outstanding.load(Ordering::Acquire),
            acquires: self.acquires.load(Ordering::Acquire),
            releases: self.releases.load(Ordering::Acquire),
        }
    }

    /// Whether the calling thread currently holds a binding to this pool.
    pub fn is_bound(&self) -> bool {
        self.binding().is_some()
    }

    /// Whether the calling thread owns (rather than shares) its heap.
    pub fn owns_heap(&self) -> bool {
        self.binding().is_some_and(|binding| binding.owned)
    }

    fn binding(&self) -> Option<Binding> {
        BINDING
            .get()
            .filter(|binding| ptr::eq(binding.pool, self))
    }

    /// Heap a thread falls back to when it owns none.
    fn home_index(&self) -> usize {
        let id = BINDING.with(|cell| ptr::from_ref(cell).addr()) as u64;
        let hash = id.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        (hash % self.capacity as u64) as usize
    }

    fn current_heap(&self) -> &Heap {
        let index = match self.binding() {
            Some(binding) => binding.index,
            None => self.home_index(),
        };
        &self.heaps[index]
    }
}

impl MainHeap for HeapPool {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        let Some(cls) = size_class::class_for(layout) else {
            return system_alloc(system_layout(layout));
        };
        if let Some(block) = self.current_heap().lists.lock()[cls].pop() {
            return Ok(block);
        }
        system_alloc(size_class::class_layout(cls))
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        let Some(cls) = size_class::class_for(layout) else {
            unsafe { System.dealloc(ptr.as_ptr(), system_layout(layout)) };
            return;
        };
        {
            let mut lists = self.current_heap().lists.lock();
            let list = &mut lists[cls];
            if list.len() < HEAP_CLASS_LIMIT {
                // SAFETY: the caller gave up the block; class blocks fit a FreeObject.
                unsafe { list.push(ptr) };
                return;
            }
        }
        unsafe { System.dealloc(ptr.as_ptr(), size_class::class_layout(cls)) };
    }

    fn acquire_heap(&self) {
        debug_assert!(
            !self.is_bound(),
            "acquire_heap called twice without a release"
        );
        self.acquires.fetch_add(1, Ordering::AcqRel);

        let start = self.home_index();
        for offset in 0..self.capacity {
            let index = (start + offset) % self.capacity;
            let heap = &self.heaps[index];
            if heap
                .in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let now = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
                self.peak_outstanding.fetch_max(now, Ordering::AcqRel);
                BINDING.set(Some(Binding {
                    pool: self,
                    index,
                    owned: true,
                }));
                return;
            }
        }

        // Every heap is owned: share the home heap.
        BINDING.set(Some(Binding {
            pool: self,
            index: start,
            owned: false,
        }));
    }

    fn release_heap(&self) {
        let Some(binding) = self.binding() else {
            return;
        };
        BINDING.set(None);
        if binding.owned {
            // Drop the count before freeing the heap so it never exceeds capacity.
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            self.heaps[binding.index]
                .in_use
                .store(false, Ordering::Release);
        }
        self.releases.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for HeapPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn system_layout(layout: Layout) -> Layout {
    // SAFETY: the alignment came from a valid layout and padding a zero size to one
    // byte cannot overflow.
    unsafe { Layout::from_size_align_unchecked(layout.size().max(1), layout.align()) }
}

fn system_alloc(layout: Layout) -> Result<NonNull<u8>> {
    // SAFETY: `layout` has a non-zero size.
    let ptr = unsafe { System.alloc(layout) };
    NonNull::new(ptr).ok_or_else(|| Error::out_of_memory(layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pool(capacity: usize) -> &'static HeapPool {
        Box::leak(Box::new(HeapPool::with_capacity(capacity)))
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(HeapPool::with_capacity(0).capacity(), 1);
        assert_eq!(HeapPool::with_capacity(4).capacity(), 4);
        assert_eq!(HeapPool::with_capacity(10_000).capacity(), MAX_HEAPS);
    }

    #[test]
    fn test_home_index_within_capacity() {
        for capacity in [1, 3, 7, 64, MAX_HEAPS] {
            let pool = HeapPool::with_capacity(capacity);
            let index = pool.home_index();
            assert!(index < capacity);
            assert_eq!(pool.home_index(), index);
        }
    }

    #[test]
    fn test_acquire_release_round_trip() {
        let pool = make_pool(4);

        pool.acquire_heap();
        assert!(pool.owns_heap());
        assert_eq!(pool.stats().outstanding, 1);

        pool.release_heap();
        assert!(!pool.is_bound());
        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.acquires, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn test_release_without_binding_is_noop() {
        let pool = make_pool(2);

        pool.release_heap();
        pool.acquire_heap();
        pool.release_heap();
        pool.release_heap();

        let stats = pool.stats();
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.outstanding, 0);
    }

    #[test]
    fn test_exhausted_pool_shares_heaps() {
        let pool = make_pool(2);

        let handles: Vec<_> = (0..6)
            .map(|_| {
                std::thread::spawn(move || {
                    pool.acquire_heap();
                    let owned = pool.owns_heap();
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    pool.release_heap();
                    owned
                })
            })
            .collect();

        let owners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|owned| *owned)
            .count();

        assert!((1..=2).contains(&owners));
        let stats = pool.stats();
        assert!(stats.peak_outstanding <= 2);
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.acquires, 6);
        assert_eq!(stats.releases, 6);
    }

    #[test]
    fn test_freed_block_is_reused() {
        let pool = make_pool(1);
        let layout = Layout::from_size_align(40, 8).unwrap();

        let first = pool.allocate(layout).unwrap();
        unsafe { pool.free(first, layout) };
        let second = pool.allocate(layout).unwrap();

        assert_eq!(first, second);
        unsafe { pool.free(second, layout) };
    }

    #[test]
    fn test_large_and_over_aligned_blocks() {
        let pool = make_pool(1);

        for layout in [
            Layout::from_size_align(1 << 20, 8).unwrap(),
            Layout::from_size_align(64, 256).unwrap(),
            Layout::from_size_align(0, 64).unwrap(),
        ] {
            let block = pool.allocate(layout).unwrap();
            assert_eq!(block.as_ptr() as usize % layout.align(), 0);
            unsafe { pool.free(block, layout) };
        }
    }
}
