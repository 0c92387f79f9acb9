//! TLAB storage in compiler thread-local storage.
//!
//! A thread-local buffer sized exactly for one [`Tlab`] plus a thread-local
//! pointer that stays null until the TLAB has been placed into the buffer.
//! Neither needs drop glue, so access never goes through a lazy
//! registration path and stays valid while the thread is being torn down.

use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use cfg_if::cfg_if;

use crate::error::Result;
use crate::main_heap;
use crate::slot::ThreadSlot;
use crate::tlab::Tlab;

cfg_if! {
    if #[cfg(feature = "nightly")] {
        // Direct TLS access; build with `-Z tls-model=initial-exec` for the
        // fastest model at the cost of `dlopen` support.
        #[thread_local]
        static mut TLAB_BUFFER: MaybeUninit<Tlab> = MaybeUninit::uninit();
        #[thread_local]
        static mut TLAB: *mut Tlab = ptr::null_mut();

        #[inline(always)]
        fn buffer() -> *mut MaybeUninit<Tlab> {
            &raw mut TLAB_BUFFER
        }

        #[inline(always)]
        fn current() -> *mut Tlab {
            // SAFETY: thread-local, only this thread reads or writes it.
            unsafe { TLAB }
        }

        #[inline(always)]
        fn set_current(tlab: *mut Tlab) {
            // SAFETY: thread-local, only this thread reads or writes it.
            unsafe { TLAB = tlab };
        }
    } else {
        use core::cell::{Cell, UnsafeCell};

        thread_local! {
            static TLAB_BUFFER: UnsafeCell<MaybeUninit<Tlab>> =
                const { UnsafeCell::new(MaybeUninit::uninit()) };
            static TLAB: Cell<*mut Tlab> = const { Cell::new(ptr::null_mut()) };
        }

        #[inline(always)]
        fn buffer() -> *mut MaybeUninit<Tlab> {
            TLAB_BUFFER.with(UnsafeCell::get)
        }

        #[inline(always)]
        fn current() -> *mut Tlab {
            TLAB.get()
        }

        #[inline(always)]
        fn set_current(tlab: *mut Tlab) {
            TLAB.set(tlab);
        }
    }
}

/// TLAB kept in compiler thread-local storage.
#[derive(Debug)]
pub struct NativeSlot;

impl ThreadSlot for NativeSlot {
    #[inline]
    fn get() -> Result<NonNull<Tlab>> {
        match NonNull::new(current()) {
            Some(tlab) => Ok(tlab),
            None => Ok(initialize()),
        }
    }

    fn exit() {
        let Ok(mut tlab) = Self::get() else {
            return;
        };
        // SAFETY: the TLAB belongs to this thread and nothing else borrows it here.
        let tlab = unsafe { tlab.as_mut() };
        tlab.flush();
        tlab.heap().release_heap();
    }
}

/// Place a TLAB into this thread's buffer. Runs once per thread.
#[cold]
#[inline(never)]
fn initialize() -> NonNull<Tlab> {
    debug_assert!(current().is_null());
    let buffer = buffer();
    // SAFETY: the buffer is this thread's and has never been initialized, since
    // `current()` is still null.
    let tlab = unsafe { (*buffer).write(Tlab::new(main_heap::get())) };
    let tlab = NonNull::from(tlab);
    set_current(tlab.as_ptr());
    tlab
}
