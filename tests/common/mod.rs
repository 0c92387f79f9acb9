//! Shared helpers for the lifecycle integration tests.

#![allow(dead_code)]

use std::alloc::Layout;
use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

use rsttlab::{HeapPool, MainHeap, StartRoutine};

/// A main heap that counts the lifecycle calls it receives.
#[derive(Debug)]
pub struct CountingHeap {
    pub pool: HeapPool,
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
}

impl CountingHeap {
    /// Leak a fresh counting heap and install it as the main heap.
    pub fn install(capacity: usize) -> &'static Self {
        let heap: &'static Self = Box::leak(Box::new(Self {
            pool: HeapPool::with_capacity(capacity),
            acquires: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }));
        rsttlab::main_heap::install(heap).unwrap();
        heap
    }

    pub fn release_calls(&self) -> usize {
        self.releases.load(Ordering::Acquire)
    }
}

impl MainHeap for CountingHeap {
    fn allocate(&self, layout: Layout) -> rsttlab::Result<NonNull<u8>> {
        self.pool.allocate(layout)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.pool.free(ptr, layout) }
    }

    fn acquire_heap(&self) {
        self.acquires.fetch_add(1, Ordering::AcqRel);
        self.pool.acquire_heap();
    }

    fn release_heap(&self) {
        self.releases.fetch_add(1, Ordering::AcqRel);
        self.pool.release_heap();
    }
}

/// Start a thread through the create shim.
#[cfg(not(target_vendor = "apple"))]
pub fn spawn(start: StartRoutine, arg: *mut c_void) -> libc::pthread_t {
    let mut thread = MaybeUninit::uninit();
    let rc = unsafe { rsttlab::shim::pthread_create(thread.as_mut_ptr(), ptr::null(), start, arg) };
    assert_eq!(rc, 0, "pthread_create failed");
    unsafe { thread.assume_init() }
}

/// Wait for a thread and return its result.
pub fn join(thread: libc::pthread_t) -> *mut c_void {
    let mut result = ptr::null_mut();
    let rc = unsafe { libc::pthread_join(thread, &mut result) };
    assert_eq!(rc, 0, "pthread_join failed");
    result
}
