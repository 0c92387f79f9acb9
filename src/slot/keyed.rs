//! TLAB storage under a pthread key.
//!
//! The TLAB lives in a block obtained from the main heap. Its address is
//! stored under one process-wide key, created exactly once, whose destructor
//! flushes and frees the TLAB and releases the heap slot when a thread ends
//! while still holding a value.
//!
//! The exit routine is the primary teardown path. It clears the key before
//! tearing the TLAB down, so the platform destructor never sees that TLAB.
//! The destructor only fires for threads that never ran the exit routine, or
//! that built a fresh TLAB after it; the heap slot has already been returned
//! in the second case, and releasing it again does nothing.

use core::alloc::Layout;
use core::cell::Cell;
use core::ffi::c_void;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::main_heap;
use crate::slot::ThreadSlot;
use crate::tlab::Tlab;

const TLAB_LAYOUT: Layout = Layout::new::<Tlab>();

static HEAP_KEY: OnceLock<core::result::Result<libc::pthread_key_t, i32>> = OnceLock::new();
static KEY_CREATIONS: AtomicUsize = AtomicUsize::new(0);
static CONSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CONSTRUCTING: Cell<bool> = const { Cell::new(false) };
}

/// TLAB kept in a main-heap block registered under a pthread key.
#[derive(Debug)]
pub struct KeyedSlot;

impl KeyedSlot {
    /// How many times the process-wide key has been created. At most one.
    pub fn key_creations() -> usize {
        KEY_CREATIONS.load(Ordering::Acquire)
    }

    /// How many TLABs this slot has constructed across all threads.
    pub fn constructions() -> usize {
        CONSTRUCTIONS.load(Ordering::Acquire)
    }
}

impl ThreadSlot for KeyedSlot {
    #[inline]
    fn get() -> Result<NonNull<Tlab>> {
        let key = heap_key()?;
        // SAFETY: `key` was returned by a successful pthread_key_create.
        let current = unsafe { libc::pthread_getspecific(key) }.cast::<Tlab>();
        match NonNull::new(current) {
            Some(tlab) => Ok(tlab),
            None => initialize(key),
        }
    }

    fn exit() {
        let tlab = match Self::get() {
            Ok(tlab) => tlab,
            Err(_) => {
                main_heap::get().release_heap();
                return;
            }
        };
        if let Ok(key) = heap_key() {
            // SAFETY: `key` is valid; clearing it keeps the destructor away from this TLAB.
            unsafe { libc::pthread_setspecific(key, ptr::null()) };
        }
        // SAFETY: the TLAB is unreachable through the key now and nobody else holds it.
        unsafe { retire(tlab) };
    }
}

/// The process-wide key, created by whichever thread first needs a TLAB
/// rather than at load time. Racing first callers all observe the one key.
fn heap_key() -> Result<libc::pthread_key_t> {
    match *HEAP_KEY.get_or_init(create_key) {
        Ok(key) => Ok(key),
        Err(code) => Err(Error::KeyCreation { code }),
    }
}

fn create_key() -> core::result::Result<libc::pthread_key_t, i32> {
    KEY_CREATIONS.fetch_add(1, Ordering::AcqRel);
    let mut key: libc::pthread_key_t = 0;
    // SAFETY: `key` is a valid out-pointer and the destructor has the C signature.
    let rc = unsafe { libc::pthread_key_create(&mut key, Some(destroy_tlab)) };
    if rc == 0 { Ok(key) } else { Err(rc) }
}

#[cold]
#[inline(never)]
fn initialize(key: libc::pthread_key_t) -> Result<NonNull<Tlab>> {
    assert!(
        !CONSTRUCTING.replace(true),
        "TLAB construction re-entered on the same thread"
    );
    let result = construct(key);
    CONSTRUCTING.set(false);
    result
}

fn construct(key: libc::pthread_key_t) -> Result<NonNull<Tlab>> {
    // SAFETY: `key` is valid.
    debug_assert!(unsafe { libc::pthread_getspecific(key) }.is_null());

    let heap = main_heap::get();
    let block = heap.allocate(TLAB_LAYOUT)?.cast::<Tlab>();
    // SAFETY: the block is fresh, sized and aligned for a Tlab.
    unsafe { block.as_ptr().write(Tlab::new(heap)) };

    // SAFETY: `key` is valid and the value outlives the thread's use of it.
    let rc = unsafe { libc::pthread_setspecific(key, block.as_ptr().cast::<c_void>()) };
    if rc != 0 {
        // SAFETY: the block came from `heap` with TLAB_LAYOUT and was never published.
        unsafe { heap.free(block.cast(), TLAB_LAYOUT) };
        return Err(Error::out_of_memory(TLAB_LAYOUT));
    }

    CONSTRUCTIONS.fetch_add(1, Ordering::AcqRel);
    Ok(block)
}

/// Flush the TLAB, free its block and release the thread's heap slot.
///
/// # Safety
/// `tlab` must be a TLAB built by [`construct`] that nothing references any more.
unsafe fn retire(tlab: NonNull<Tlab>) {
    let tlab = tlab.as_ptr();
    let heap = unsafe { (*tlab).heap() };
    unsafe {
        (*tlab).flush();
        ptr::drop_in_place(tlab);
        heap.free(NonNull::new_unchecked(tlab).cast(), TLAB_LAYOUT);
    }
    heap.release_heap();
}

unsafe extern "C" fn destroy_tlab(value: *mut c_void) {
    if let Some(tlab) = NonNull::new(value.cast::<Tlab>()) {
        // SAFETY: the platform clears the key before calling us, so the value is orphaned.
        unsafe { retire(tlab) };
    }
}
